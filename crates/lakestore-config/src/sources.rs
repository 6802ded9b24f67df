// Configuration source loading.
//
// Priority order:
// 1. Environment variables (LAKESTORE_* prefix)
// 2. Config file from --config, then LAKESTORE_CONFIG, then ./lakestore.toml
// 3. Built-in defaults

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;

pub const DEFAULT_CONFIG_FILE: &str = "./lakestore.toml";

/// Load configuration using the process environment.
///
/// `explicit` is the `--config` path; a missing explicit file is an error,
/// a missing default file is not.
pub fn load_config(explicit: Option<&Path>) -> Result<RuntimeConfig> {
    load_config_with_env(explicit, &StdEnvSource)
}

/// Load configuration with overrides from a custom source.
pub fn load_config_with_env<E: EnvSource>(
    explicit: Option<&Path>,
    env: &E,
) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file(explicit, env)? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(
    explicit: Option<&Path>,
    env: &E,
) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = explicit {
        return read_config_file(path).map(Some);
    }

    if let Some(path) = env.get("CONFIG").filter(|p| !p.is_empty()) {
        return read_config_file(Path::new(&path)).map(Some);
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return read_config_file(&default_path).map(Some);
    }

    Ok(None)
}

fn read_config_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Reads `LAKESTORE_*` variables from the process environment.
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}
