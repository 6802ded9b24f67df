// lakestore-config - Runtime configuration for lakestore tools
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file from --config, LAKESTORE_CONFIG or ./lakestore.toml
// 3. Built-in defaults (local backend under ./data)

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use lakestore_core::{
    AdlsBackend, AdlsConfig, BackendKind, DbfsBackend, DbfsConfig, LocalBackend, LocalConfig,
    StorageBackend,
};
use serde::{Deserialize, Serialize};

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};
pub use sources::{load_config, load_config_with_env, StdEnvSource, DEFAULT_CONFIG_FILE};

/// Main runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub read: ReadConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Which backend to use and the settings for each kind.
///
/// Only the section for the selected `backend` is required; the others may
/// be present and are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adls: Option<AdlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbfs: Option<DbfsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            adls: None,
            dbfs: None,
            local: Some(LocalConfig::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConfig {
    /// Upper bound on rows per streamed batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    64 * 1024
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `lakestore_core=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config(None)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Replace every section with the one from a parsed config file.
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.storage = other.storage;
        self.read = other.read;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build the adapter for the selected backend.
    ///
    /// Remote backends verify access with the configured credentials, so this
    /// fails fast on a bad service principal or token.
    pub async fn build_backend(&self) -> Result<Arc<dyn StorageBackend>> {
        self.validate()?;

        let backend: Arc<dyn StorageBackend> = match self.storage.backend {
            BackendKind::Adls => {
                let adls = self
                    .storage
                    .adls
                    .clone()
                    .context("storage.adls section is required for the adls backend")?;
                Arc::new(AdlsBackend::connect(adls).await?)
            }
            BackendKind::Dbfs => {
                let dbfs = self
                    .storage
                    .dbfs
                    .clone()
                    .context("storage.dbfs section is required for the dbfs backend")?;
                Arc::new(DbfsBackend::connect(dbfs).await?)
            }
            BackendKind::Local => {
                let local = self.storage.local.clone().unwrap_or_default();
                Arc::new(LocalBackend::new(local)?)
            }
        };

        tracing::debug!(backend = %backend.kind(), "Storage backend ready");
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.storage.backend, BackendKind::Local);
        assert_eq!(
            config.storage.local,
            Some(LocalConfig {
                root: PathBuf::from("./data")
            })
        );
        assert_eq!(config.read.batch_size, 65_536);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [storage]
            backend = "adls"

            [storage.adls]
            tenant_id = "tenant"
            client_id = "client"
            client_secret = "secret"
            account_name = "acct"
            container = "raw"

            [read]
            batch_size = 1000

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, BackendKind::Adls);
        assert_eq!(config.storage.adls.as_ref().unwrap().container, "raw");
        assert!(config.storage.local.is_none());
        assert_eq!(config.read.batch_size, 1000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[tokio::test]
    async fn test_build_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.storage.local = Some(LocalConfig {
            root: dir.path().join("lake"),
        });

        let backend = config.build_backend().await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Local);
        assert!(dir.path().join("lake").is_dir());
    }

    #[tokio::test]
    async fn test_build_backend_requires_selected_section() {
        let mut config = RuntimeConfig::default();
        config.storage.backend = BackendKind::Dbfs;
        assert!(config.build_backend().await.is_err());
    }
}
