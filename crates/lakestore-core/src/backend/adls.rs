//! Azure Data Lake Storage Gen2 adapter.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{build_operator, require, verify_access, BackendKind, StorageBackend};
use crate::error::{redact_secret, Result};
use crate::path::normalize;

/// Service-principal credentials and location of an ADLS Gen2 container.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdlsConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub account_name: String,
    pub container: String,
}

impl fmt::Debug for AdlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdlsConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact_secret(&self.client_secret))
            .field("account_name", &self.account_name)
            .field("container", &self.container)
            .finish()
    }
}

impl AdlsConfig {
    /// Check that every credential field is set.
    pub fn validate(&self) -> Result<()> {
        require("adls", "tenant_id", &self.tenant_id)?;
        require("adls", "client_id", &self.client_id)?;
        require("adls", "client_secret", &self.client_secret)?;
        require("adls", "account_name", &self.account_name)?;
        require("adls", "container", &self.container)
    }

    fn endpoint(&self) -> String {
        format!("https://{}.dfs.core.windows.net", self.account_name)
    }
}

/// Adapter for one ADLS Gen2 container.
pub struct AdlsBackend {
    config: AdlsConfig,
    operator: opendal::Operator,
}

impl fmt::Debug for AdlsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdlsBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AdlsBackend {
    /// Validate the configuration, build the filesystem handle and check that
    /// the service principal is accepted.
    pub async fn connect(config: AdlsConfig) -> Result<Self> {
        let backend = Self::build(config)?;
        verify_access(BackendKind::Adls, &backend.operator).await?;
        tracing::info!(
            account = %backend.config.account_name,
            container = %backend.config.container,
            "Connected ADLS backend"
        );
        Ok(backend)
    }

    fn build(config: AdlsConfig) -> Result<Self> {
        config.validate()?;

        let builder = opendal::services::Azdls::default()
            .filesystem(&config.container)
            .endpoint(&config.endpoint())
            .account_name(&config.account_name)
            .tenant_id(&config.tenant_id)
            .client_id(&config.client_id)
            .client_secret(&config.client_secret);
        let operator = build_operator(BackendKind::Adls, builder)?;

        Ok(Self { config, operator })
    }

    pub fn config(&self) -> &AdlsConfig {
        &self.config
    }
}

impl StorageBackend for AdlsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Adls
    }

    fn filesystem(&self) -> &opendal::Operator {
        &self.operator
    }

    fn base_path(&self, logical_path: &str) -> Result<String> {
        normalize(logical_path)
    }

    fn table_uri(&self, logical_path: &str) -> Result<String> {
        Ok(format!(
            "abfss://{}@{}.dfs.core.windows.net/{}",
            self.config.container,
            self.config.account_name,
            normalize(logical_path)?
        ))
    }

    fn storage_options(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([
            (
                "azure_storage_account_name".to_string(),
                self.config.account_name.clone(),
            ),
            (
                "azure_storage_tenant_id".to_string(),
                self.config.tenant_id.clone(),
            ),
            (
                "azure_storage_client_id".to_string(),
                self.config.client_id.clone(),
            ),
            (
                "azure_storage_client_secret".to_string(),
                self.config.client_secret.clone(),
            ),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    fn config() -> AdlsConfig {
        AdlsConfig {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "super-secret-value".to_string(),
            account_name: "lakeaccount".to_string(),
            container: "raw".to_string(),
        }
    }

    #[test]
    fn derives_addresses_from_logical_path() {
        let backend = AdlsBackend::build(config()).unwrap();
        assert_eq!(backend.base_path("/write/part/").unwrap(), "write/part");
        assert_eq!(
            backend.table_uri("write/part").unwrap(),
            "abfss://raw@lakeaccount.dfs.core.windows.net/write/part"
        );
        assert_eq!(
            backend.table_uri("//write//part").unwrap(),
            backend.table_uri("write/part").unwrap()
        );
    }

    #[test]
    fn storage_options_carry_service_principal() {
        let backend = AdlsBackend::build(config()).unwrap();
        let options = backend.storage_options().unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options["azure_storage_account_name"], "lakeaccount");
        assert_eq!(options["azure_storage_client_secret"], "super-secret-value");
    }

    #[test]
    fn missing_fields_are_config_errors() {
        let mut cfg = config();
        cfg.container = String::new();
        assert!(matches!(
            AdlsBackend::build(cfg),
            Err(StorageError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("supe****"));
    }
}
