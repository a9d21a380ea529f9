//! Error types for Kiln

use thiserror::Error;

/// Result type alias using ConfigError
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigError::InvalidValue {
            field: "cache.file".to_string(),
            message: "cannot be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: cache.file - cannot be empty"
        );
    }

    #[test]
    fn test_toml_error_converts() {
        let parse = toml::from_str::<toml::Value>("[cache").unwrap_err();
        let err: ConfigError = parse.into();
        assert!(err.to_string().starts_with("TOML parsing error"));
    }
}
