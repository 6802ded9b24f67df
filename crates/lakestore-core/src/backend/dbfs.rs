//! Databricks File System adapter.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{build_operator, require, verify_access, BackendKind, StorageBackend};
use crate::error::{redact_secret, Result, StorageError};
use crate::path::normalize;

/// Workspace instance and personal access token.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbfsConfig {
    /// Workspace host, e.g. `adb-1234567890123456.7.azuredatabricks.net`.
    pub instance: String,
    pub token: String,
}

impl fmt::Debug for DbfsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbfsConfig")
            .field("instance", &self.instance)
            .field("token", &redact_secret(&self.token))
            .finish()
    }
}

impl DbfsConfig {
    /// Check that the instance and token are set.
    pub fn validate(&self) -> Result<()> {
        require("dbfs", "instance", &self.instance)?;
        require("dbfs", "token", &self.token)
    }

    fn endpoint(&self) -> String {
        let instance = self.instance.trim().trim_end_matches('/');
        if instance.starts_with("https://") || instance.starts_with("http://") {
            instance.to_string()
        } else {
            format!("https://{}", instance)
        }
    }
}

pub struct DbfsBackend {
    config: DbfsConfig,
    operator: opendal::Operator,
}

impl fmt::Debug for DbfsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbfsBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DbfsBackend {
    pub async fn connect(config: DbfsConfig) -> Result<Self> {
        let backend = Self::build(config)?;
        verify_access(BackendKind::Dbfs, &backend.operator).await?;
        tracing::info!(instance = %backend.config.instance, "Connected DBFS backend");
        Ok(backend)
    }

    fn build(config: DbfsConfig) -> Result<Self> {
        config.validate()?;

        let builder = opendal::services::Dbfs::default()
            .root("/")
            .endpoint(&config.endpoint())
            .token(&config.token);
        let operator = build_operator(BackendKind::Dbfs, builder)?;

        Ok(Self { config, operator })
    }

    pub fn config(&self) -> &DbfsConfig {
        &self.config
    }
}

impl StorageBackend for DbfsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dbfs
    }

    fn filesystem(&self) -> &opendal::Operator {
        &self.operator
    }

    fn base_path(&self, logical_path: &str) -> Result<String> {
        normalize(logical_path)
    }

    fn table_uri(&self, logical_path: &str) -> Result<String> {
        normalize(logical_path)
    }

    /// The Delta engine has no DBFS object store, so there is nothing it
    /// could be configured with.
    fn storage_options(&self) -> Result<HashMap<String, String>> {
        Err(StorageError::unsupported(
            "Delta Lake tables are not supported on the dbfs backend",
        ))
    }
}
