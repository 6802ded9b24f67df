// Configuration validation
//
// Validates that the selected backend is fully configured and values are sensible

use crate::{LogConfig, ReadConfig, RuntimeConfig, StorageConfig};
use anyhow::{bail, Context, Result};
use lakestore_core::BackendKind;
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_storage_config(&config.storage)?;
    validate_read_config(&config.read)?;
    validate_log_config(&config.logging)?;
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        BackendKind::Adls => {
            let Some(adls) = &config.adls else {
                bail!("storage.adls section is required when backend is 'adls'");
            };
            adls.validate().context("Invalid storage.adls section")?;

            if adls.container.contains('/') {
                bail!("storage.adls.container must be a container name, not a path");
            }
        }
        BackendKind::Dbfs => {
            let Some(dbfs) = &config.dbfs else {
                bail!("storage.dbfs section is required when backend is 'dbfs'");
            };
            dbfs.validate().context("Invalid storage.dbfs section")?;
        }
        BackendKind::Local => {
            if let Some(local) = &config.local {
                if local.root.as_os_str().is_empty() {
                    bail!("storage.local.root cannot be empty");
                }
            }
        }
    }

    Ok(())
}

fn validate_read_config(config: &ReadConfig) -> Result<()> {
    if config.batch_size == 0 {
        bail!("read.batch_size must be greater than 0");
    }

    // Warn about very large batch sizes
    if config.batch_size > 10_000_000 {
        warn!(
            batch_size = config.batch_size,
            "read.batch_size is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_log_config(config: &LogConfig) -> Result<()> {
    if config.level.trim().is_empty() {
        bail!("logging.level cannot be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakestore_core::{AdlsConfig, DbfsConfig};

    fn adls() -> AdlsConfig {
        AdlsConfig {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            account_name: "acct".to_string(),
            container: "raw".to_string(),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = RuntimeConfig::default();
        config.read.batch_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("read.batch_size"));
    }

    #[test]
    fn test_selected_backend_section_required() {
        let mut config = RuntimeConfig::default();
        config.storage.backend = BackendKind::Adls;
        assert!(validate_config(&config).is_err());

        config.storage.adls = Some(adls());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_incomplete_credentials_rejected() {
        let mut config = RuntimeConfig::default();
        config.storage.backend = BackendKind::Adls;
        config.storage.adls = Some(AdlsConfig {
            client_secret: String::new(),
            ..adls()
        });
        let err = format!("{:#}", validate_config(&config).unwrap_err());
        assert!(err.contains("storage.adls"));
        assert!(err.contains("'client_secret'"));

        config.storage.backend = BackendKind::Dbfs;
        config.storage.dbfs = Some(DbfsConfig {
            instance: "adb-1.azuredatabricks.net".to_string(),
            token: "  ".to_string(),
        });
        let err = format!("{:#}", validate_config(&config).unwrap_err());
        assert!(err.contains("storage.dbfs"));
        assert!(err.contains("'token'"));
    }

    #[test]
    fn test_credential_rules_match_backend_construction() {
        // Whatever the file validator accepts or rejects, building the
        // backend agrees, including whitespace-only values.
        let blank = AdlsConfig {
            account_name: "   ".to_string(),
            ..adls()
        };
        let mut config = RuntimeConfig::default();
        config.storage.backend = BackendKind::Adls;
        config.storage.adls = Some(blank.clone());
        let from_file = validate_config(&config).unwrap_err();
        let from_core = blank.validate().unwrap_err();
        assert!(format!("{:#}", from_file).contains(&from_core.to_string()));

        config.storage.adls = Some(AdlsConfig {
            container: "raw/nested".to_string(),
            ..adls()
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("container name"));
    }

    #[test]
    fn test_unselected_sections_ignored() {
        let mut config = RuntimeConfig::default();
        config.storage.dbfs = Some(DbfsConfig::default());
        assert!(validate_config(&config).is_ok());
    }
}
