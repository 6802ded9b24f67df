//! Logical path normalization.
//!
//! Every backend receives paths in one canonical form: relative, `/`
//! separated, no empty or `.` segments. The same string is used as the
//! Parquet root path and as the suffix of a Delta table URI.

use crate::error::{Result, StorageError};

/// Normalize a caller-supplied logical path.
///
/// Leading, trailing and repeated separators are removed and `\` is treated
/// like `/`. Empty input, input that reduces to nothing (`"/"`) and `..`
/// segments are rejected.
pub fn normalize(logical_path: &str) -> Result<String> {
    if logical_path.trim().is_empty() {
        return Err(StorageError::invalid_config("path must not be empty"));
    }

    let mut segments = Vec::new();
    for segment in logical_path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StorageError::invalid_config(format!(
                    "path '{}' must not contain '..' segments",
                    logical_path
                )))
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(StorageError::invalid_config(format!(
            "path '{}' does not name anything below the backend root",
            logical_path
        )));
    }

    Ok(segments.join("/"))
}

/// Join a normalized base path with a relative child path.
pub(crate) fn join(base: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), child)
    }
}

/// Directory form expected by filesystem listings (`a/b/`).
pub(crate) fn as_dir(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_redundant_separators() {
        assert_eq!(normalize("/write/parquet/").unwrap(), "write/parquet");
        assert_eq!(normalize("write//parquet").unwrap(), "write/parquet");
        assert_eq!(normalize("./write/./parquet").unwrap(), "write/parquet");
        assert_eq!(normalize("write\\parquet").unwrap(), "write/parquet");
    }

    #[test]
    fn is_idempotent() {
        for p in [
            "a",
            "/a/b/",
            "//a//b//c",
            "a/./b",
            " spaced name /x",
            "Pregnancies=0/part-0.parquet",
        ] {
            let once = normalize(p).unwrap();
            assert_eq!(normalize(&once).unwrap(), once, "input {:?}", p);
        }
    }

    #[test]
    fn equivalent_spellings_agree() {
        let canonical = normalize("data/nopart").unwrap();
        for p in ["/data/nopart", "data/nopart/", "//data///nopart//"] {
            assert_eq!(normalize(p).unwrap(), canonical);
        }
    }

    #[test]
    fn rejects_empty_and_escaping_paths() {
        assert!(matches!(
            normalize(""),
            Err(StorageError::InvalidConfig { .. })
        ));
        assert!(normalize("   ").is_err());
        assert!(normalize("/").is_err());
        assert!(normalize("//").is_err());
        assert!(normalize("a/../b").is_err());
    }

    #[test]
    fn join_and_dir_forms() {
        assert_eq!(join("a/b", "c.parquet"), "a/b/c.parquet");
        assert_eq!(join("", "c"), "c");
        assert_eq!(join("a", ""), "a");
        assert_eq!(as_dir("a/b"), "a/b/");
        assert_eq!(as_dir("a/b/"), "a/b/");
    }
}
