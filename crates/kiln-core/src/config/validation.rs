//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_cache(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config.cache.file.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "cache.file".to_string(),
            message: "cache file cannot be empty".to_string(),
        });
    }

    if config.cache.file.is_dir() {
        return Err(ConfigError::InvalidValue {
            field: "cache.file".to_string(),
            message: format!("{} is a directory", config.cache.file.display()),
        });
    }

    Ok(())
}
