// Configuration management module
// TOML settings under the semindex home directory

pub mod settings;


use std::path::{Path, PathBuf};

pub use settings::{Config, ConfigError, HOME_ENV_VAR, OllamaConfig, StorageConfig};

/// Get the configuration directory path, honouring an explicit override
#[inline]
pub fn get_config_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    Config::resolve_dir(explicit)
}
