//! Backend adapters.
//!
//! Each adapter owns one long-lived `opendal` operator and knows how to turn
//! a normalized logical path into the two addressing forms the engines need:
//! a path relative to that operator for Parquet datasets, and a URI plus
//! connection options for Delta Lake tables.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

mod adls;
mod dbfs;
mod local;

pub use adls::{AdlsBackend, AdlsConfig};
pub use dbfs::{DbfsBackend, DbfsConfig};
pub use local::{LocalBackend, LocalConfig};

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Adls,
    Dbfs,
    #[default]
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Adls => write!(f, "adls"),
            BackendKind::Dbfs => write!(f, "dbfs"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "adls" | "azure" => Ok(BackendKind::Adls),
            "dbfs" | "databricks" => Ok(BackendKind::Dbfs),
            "local" | "fs" => Ok(BackendKind::Local),
            _ => Err(StorageError::invalid_config(format!(
                "Unsupported storage backend: {}. Supported: adls, dbfs, local",
                s
            ))),
        }
    }
}

/// Capabilities the storage facade needs from a backend.
///
/// Implementations are immutable after construction and may be shared across
/// threads. `logical_path` arguments are caller input and are normalized by
/// the adapter.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Filesystem handle the Parquet engine reads and writes through.
    fn filesystem(&self) -> &opendal::Operator;

    /// Path of a dataset relative to [`StorageBackend::filesystem`].
    fn base_path(&self, logical_path: &str) -> Result<String>;

    /// Location of a Delta table as understood by the Delta engine.
    fn table_uri(&self, logical_path: &str) -> Result<String>;

    /// Connection options handed to the Delta engine.
    fn storage_options(&self) -> Result<HashMap<String, String>>;
}

pub(crate) fn require(backend: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StorageError::invalid_config(format!(
            "{} backend requires a non-empty '{}'",
            backend, field
        )));
    }
    Ok(())
}

/// Build an operator from a service builder, mapping failures to configuration errors.
pub(crate) fn build_operator<B: opendal::Builder>(
    backend: BackendKind,
    builder: B,
) -> Result<opendal::Operator> {
    opendal::Operator::new(builder)
        .map(|op| op.finish())
        .map_err(|e| {
            StorageError::invalid_config(format!(
                "Failed to create {} operator: {}",
                backend, e
            ))
        })
}

/// Issue one cheap request so rejected credentials surface at construction.
pub(crate) async fn verify_access(backend: BackendKind, op: &opendal::Operator) -> Result<()> {
    match op.check().await {
        Ok(()) => {
            tracing::debug!(backend = %backend, "Storage backend credentials accepted");
            Ok(())
        }
        Err(e) => Err(StorageError::authentication(backend.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("ADLS".parse::<BackendKind>().unwrap(), BackendKind::Adls);
        assert_eq!("dbfs".parse::<BackendKind>().unwrap(), BackendKind::Dbfs);
        assert_eq!("fs".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert!("s3".parse::<BackendKind>().is_err());
    }

    #[test]
    fn require_rejects_blank_values() {
        assert!(require("adls", "tenant_id", "  ").is_err());
        assert!(require("adls", "tenant_id", "t").is_ok());
    }
}
