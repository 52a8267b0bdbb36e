//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::LoggingConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration shape: {0}")]
    Shape(String),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
    #[error("Failed to open appender '{name}': {source}")]
    Appender {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Recursively merge `overlay` into `base`.
///
/// Tables merge key by key; any other overlay value (arrays included)
/// replaces the base value.
pub fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Deep-merge a user document over the embedded default document.
pub fn merge_with_defaults(user: toml::Table) -> Result<LoggingConfig, ConfigLoadError> {
    let mut merged = toml::Value::try_from(LoggingConfig::default())
        .map_err(|e| ConfigLoadError::Shape(e.to_string()))?;
    deep_merge(&mut merged, toml::Value::Table(user));
    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigLoadError::Shape(e.to_string()))
}

/// Parse, merge and validate a configuration document.
pub fn parse_config(content: &str) -> Result<LoggingConfig, ConfigLoadError> {
    let user: toml::Table = toml::from_str(content)?;
    let config = merge_with_defaults(user)?;

    validate_config(&config).map_err(ConfigLoadError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<LoggingConfig, ConfigLoadError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AppenderConfig, LayoutConfig, DEFAULT_CATEGORY};
    use crate::observability::level::Level;

    #[test]
    fn test_deep_merge_precedence() {
        let mut base: toml::Value = toml::from_str("a = 1\n[b]\nc = 2\nd = 3\n").unwrap();
        let overlay: toml::Value = toml::from_str("[b]\nc = 9\n").unwrap();
        deep_merge(&mut base, overlay);

        let expected: toml::Value = toml::from_str("a = 1\n[b]\nc = 9\nd = 3\n").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let mut base: toml::Value = toml::from_str("list = [1, 2, 3]").unwrap();
        deep_merge(&mut base, toml::from_str("list = [4]").unwrap());
        assert_eq!(base["list"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_user_category_keeps_default_category() {
        let config = parse_config(
            r#"
            [categories.routing]
            level = "debug"
            appenders = ["consoleAppender"]
            "#,
        )
        .unwrap();

        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.categories["routing"].level, Level::Debug);
        assert_eq!(config.categories[DEFAULT_CATEGORY].level, Level::Info);
    }

    #[test]
    fn test_nested_leaf_override() {
        let config = parse_config(
            r#"
            [appenders.consoleAppender.layout]
            placeholder = "none"
            "#,
        )
        .unwrap();

        match &config.appenders["consoleAppender"] {
            AppenderConfig::Console {
                layout: LayoutConfig::Pattern { pattern, placeholder },
            } => {
                assert_eq!(placeholder, "none");
                assert!(pattern.contains("%x{requestId}"));
            }
            other => panic!("unexpected appender {:?}", other),
        }
    }

    #[test]
    fn test_http_client_partial_override() {
        let config = parse_config(
            r#"
            [httpClient.request]
            logIt = true
            "#,
        )
        .unwrap();

        assert_eq!(config.http_client.request.log_it, Some(true));
        assert_eq!(config.http_client.request.url, Some(true));
        assert_eq!(config.http_client.response.level4xx, Some(Level::Error));
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        assert!(matches!(
            parse_config("[categories").unwrap_err(),
            ConfigLoadError::Parse(_)
        ));
    }

    #[test]
    fn test_bad_level_is_shape_error() {
        let err = parse_config(
            r#"
            [categories.default]
            level = "loud"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Shape(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Io { .. }));
    }
}
