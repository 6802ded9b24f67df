use std::path::PathBuf;

use anyhow::{Context, Result};
use lakestore_core::{AdlsConfig, BackendKind, DbfsConfig, LocalConfig};

use crate::{LogFormat, RuntimeConfig};

pub const ENV_PREFIX: &str = "LAKESTORE_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Get a variable by its name without the `LAKESTORE_` prefix.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND")? {
        config.storage.backend = backend
            .parse::<BackendKind>()
            .context("Invalid LAKESTORE_STORAGE_BACKEND value")?;
    }

    // ADLS service principal
    if let Some(tenant_id) = get_env_string(env, "ADLS_TENANT_ID")? {
        ensure_adls(config).tenant_id = tenant_id;
    }
    if let Some(client_id) = get_env_string(env, "ADLS_CLIENT_ID")? {
        ensure_adls(config).client_id = client_id;
    }
    if let Some(client_secret) = get_env_string(env, "ADLS_CLIENT_SECRET")? {
        ensure_adls(config).client_secret = client_secret;
    }
    if let Some(account_name) = get_env_string(env, "ADLS_ACCOUNT_NAME")? {
        ensure_adls(config).account_name = account_name;
    }
    if let Some(container) = get_env_string(env, "ADLS_CONTAINER")? {
        ensure_adls(config).container = container;
    }

    // DBFS workspace
    if let Some(instance) = get_env_string(env, "DBFS_INSTANCE")? {
        ensure_dbfs(config).instance = instance;
    }
    if let Some(token) = get_env_string(env, "DBFS_TOKEN")? {
        ensure_dbfs(config).token = token;
    }

    // Local filesystem
    if let Some(root) = get_env_string(env, "LOCAL_ROOT")? {
        ensure_local(config).root = PathBuf::from(root);
    }

    // Reads
    if let Some(batch_size) = get_env_usize(env, "READ_BATCH_SIZE")? {
        config.read.batch_size = batch_size;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.logging.format = format
            .parse::<LogFormat>()
            .context("Invalid LAKESTORE_LOG_FORMAT value")?;
    }

    Ok(())
}

fn ensure_adls(config: &mut RuntimeConfig) -> &mut AdlsConfig {
    config.storage.adls.get_or_insert_with(AdlsConfig::default)
}

fn ensure_dbfs(config: &mut RuntimeConfig) -> &mut DbfsConfig {
    config.storage.dbfs.get_or_insert_with(DbfsConfig::default)
}

fn ensure_local(config: &mut RuntimeConfig) -> &mut LocalConfig {
    config.storage.local.get_or_insert_with(LocalConfig::default)
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key).filter(|v| !v.is_empty()))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{}{} must be a positive integer", ENV_PREFIX, key))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(crate) struct MapEnv(pub HashMap<String, String>);

    impl MapEnv {
        pub(crate) fn with(mut self, key: &str, value: &str) -> Self {
            self.0.insert(key.to_string(), value.to_string());
            self
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[test]
    fn adls_overrides_build_the_section() {
        let env = MapEnv::default()
            .with("STORAGE_BACKEND", "adls")
            .with("ADLS_TENANT_ID", "tenant")
            .with("ADLS_CLIENT_ID", "client")
            .with("ADLS_CLIENT_SECRET", "secret")
            .with("ADLS_ACCOUNT_NAME", "acct")
            .with("ADLS_CONTAINER", "raw");

        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.storage.backend, BackendKind::Adls);
        let adls = config.storage.adls.as_ref().unwrap();
        assert_eq!(adls.tenant_id, "tenant");
        assert_eq!(adls.client_secret, "secret");
        assert_eq!(adls.container, "raw");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_single_fields_of_file_sections() {
        let mut config: RuntimeConfig = toml::from_str(
            r#"
            [storage]
            backend = "dbfs"

            [storage.dbfs]
            instance = "adb-1.azuredatabricks.net"
            token = "from-file"
            "#,
        )
        .unwrap();

        let env = MapEnv::default().with("DBFS_TOKEN", "from-env");
        apply_env_overrides(&mut config, &env).unwrap();

        let dbfs = config.storage.dbfs.as_ref().unwrap();
        assert_eq!(dbfs.instance, "adb-1.azuredatabricks.net");
        assert_eq!(dbfs.token, "from-env");
    }

    #[test]
    fn read_and_logging_overrides() {
        let env = MapEnv::default()
            .with("LOCAL_ROOT", "/srv/lake")
            .with("READ_BATCH_SIZE", "4096")
            .with("LOG_LEVEL", "debug")
            .with("LOG_FORMAT", "json");

        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(
            config.storage.local.as_ref().unwrap().root,
            PathBuf::from("/srv/lake")
        );
        assert_eq!(config.read.batch_size, 4096);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_errors() {
        let mut config = RuntimeConfig::default();

        let env = MapEnv::default().with("READ_BATCH_SIZE", "many");
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(format!("{:#}", err).contains("LAKESTORE_READ_BATCH_SIZE"));

        let env = MapEnv::default().with("STORAGE_BACKEND", "s3");
        assert!(apply_env_overrides(&mut config, &env).is_err());
    }

    #[test]
    fn empty_values_are_ignored() {
        let env = MapEnv::default().with("LOG_LEVEL", "");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
