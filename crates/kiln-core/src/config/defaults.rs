//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "kiln.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "kiln.yaml";

/// Default fingerprint cache file
pub const DEFAULT_CACHE_FILE: &str = ".kiln";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_is_searched_first() {
        let names = config_file_names();
        assert_eq!(names[0], DEFAULT_CONFIG_TOML);
        assert!(names.contains(&DEFAULT_CONFIG_YAML));
        assert_eq!(names.len(), 4);
    }
}
