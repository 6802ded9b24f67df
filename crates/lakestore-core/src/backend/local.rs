//! Local filesystem adapter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{build_operator, BackendKind, StorageBackend};
use crate::error::{Result, StorageError};
use crate::path::normalize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory all logical paths are resolved under.
    pub root: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
    operator: opendal::Operator,
}

impl LocalBackend {
    /// Create the adapter, creating `root` if it does not exist yet.
    pub fn new(config: LocalConfig) -> Result<Self> {
        Self::new_at(config.root)
    }

    pub fn new_at(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(StorageError::invalid_config(
                "local backend requires a non-empty 'root'",
            ));
        }

        std::fs::create_dir_all(root).map_err(|e| {
            StorageError::invalid_config(format!(
                "Failed to create local root '{}': {}",
                root.display(),
                e
            ))
        })?;
        let root = std::path::absolute(root).map_err(|e| {
            StorageError::invalid_config(format!(
                "Failed to resolve local root '{}': {}",
                root.display(),
                e
            ))
        })?;

        let root_str = root.to_str().ok_or_else(|| {
            StorageError::invalid_config(format!(
                "local root '{}' is not valid UTF-8",
                root.display()
            ))
        })?;
        let builder = opendal::services::Fs::default().root(root_str);
        let operator = build_operator(BackendKind::Local, builder)?;

        tracing::debug!(root = %root.display(), "Local backend initialized");
        Ok(Self { root, operator })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn filesystem(&self) -> &opendal::Operator {
        &self.operator
    }

    fn base_path(&self, logical_path: &str) -> Result<String> {
        normalize(logical_path)
    }

    fn table_uri(&self, logical_path: &str) -> Result<String> {
        let normalized = normalize(logical_path)?;
        let full = self.root.join(normalized);
        full.to_str().map(str::to_string).ok_or_else(|| {
            StorageError::invalid_config(format!("path '{}' is not valid UTF-8", full.display()))
        })
    }

    fn storage_options(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}
