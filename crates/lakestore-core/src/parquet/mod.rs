//! Parquet dataset layout on top of an `opendal` operator.

use opendal::{EntryMode, ErrorKind, Operator};

use crate::error::{Result, StorageError};
use crate::path::{as_dir, join};

pub mod encoding;
pub(crate) mod reader;
pub(crate) mod writer;

pub use encoding::writer_properties;

/// A data file found under a dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscoveredFile {
    /// Path relative to the operator root.
    pub path: String,
    /// Path relative to the dataset root.
    pub relative: String,
}

/// Segments starting with `_` or `.` hold metadata (`_delta_log`,
/// `_SUCCESS`, `.crc` files) and are never read as data.
fn is_hidden(relative: &str) -> bool {
    relative
        .split('/')
        .any(|segment| segment.starts_with('_') || segment.starts_with('.'))
}

/// List every data file under `base_path`, sorted by path.
///
/// `base_path` may also name a single file.
pub(crate) async fn discover(op: &Operator, base_path: &str) -> Result<Vec<DiscoveredFile>> {
    let meta = match op.stat(base_path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StorageError::not_found(base_path))
        }
        Err(e) => {
            return Err(StorageError::filesystem(
                format!("Failed to stat '{}'", base_path),
                e,
            ))
        }
    };

    if meta.mode() == EntryMode::FILE {
        let name = base_path.rsplit('/').next().unwrap_or(base_path).to_string();
        return Ok(vec![DiscoveredFile {
            path: base_path.to_string(),
            relative: name,
        }]);
    }

    let mut files = list_files(op, base_path).await?;
    files.retain(|f| !is_hidden(&f.relative));
    if files.is_empty() {
        return Err(StorageError::not_found(base_path));
    }

    tracing::debug!(path = %base_path, files = files.len(), "Discovered dataset files");
    Ok(files)
}

/// Every file below `dir`, hidden or not. A missing directory has none.
pub(crate) async fn list_files(op: &Operator, dir: &str) -> Result<Vec<DiscoveredFile>> {
    let prefix = as_dir(dir);
    let entries = match op.list_with(&prefix).recursive(true).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StorageError::filesystem(
                format!("Failed to list '{}'", prefix),
                e,
            ))
        }
    };

    let mut files: Vec<DiscoveredFile> = entries
        .into_iter()
        .filter(|entry| entry.metadata().mode() == EntryMode::FILE)
        .filter_map(|entry| {
            let path = entry.path().trim_start_matches('/').to_string();
            let relative = path.strip_prefix(&prefix)?.to_string();
            Some(DiscoveredFile { path, relative })
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

pub(crate) fn file_path(base_path: &str, dir: &str, name: &str) -> String {
    join(&join(base_path, dir), name)
}
