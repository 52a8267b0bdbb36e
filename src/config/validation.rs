//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (categories reference existing appenders)
//! - Compile layouts and the `nolog` pattern up front
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LoggingConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, so applying a
//!   validated snapshot cannot fail on structure

use crate::config::schema::{AppenderConfig, LoggingConfig, DEFAULT_CATEGORY};
use crate::http::middleware::access_log::AccessLogFormat;
use crate::observability::layout::{Layout, LayoutError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing 'default' category")]
    MissingDefaultCategory,
    #[error("category '{category}' has no appenders")]
    NoAppenders { category: String },
    #[error("category '{category}' references unknown appender '{appender}'")]
    UnknownAppender { category: String, appender: String },
    #[error("appender '{appender}' has an invalid layout: {source}")]
    InvalidLayout {
        appender: String,
        #[source]
        source: LayoutError,
    },
    #[error("appender '{appender}' has an empty filename")]
    EmptyFilename { appender: String },
    #[error("appender '{appender}' has zero capacity")]
    ZeroCapacity { appender: String },
    #[error("invalid nolog pattern '{pattern}': {reason}")]
    InvalidNolog { pattern: String, reason: String },
    #[error("invalid access log format: {0}")]
    InvalidAccessFormat(String),
}

/// Validate a merged configuration document.
pub fn validate_config(config: &LoggingConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.categories.contains_key(DEFAULT_CATEGORY) {
        errors.push(ValidationError::MissingDefaultCategory);
    }

    for (category, settings) in &config.categories {
        if settings.appenders.is_empty() {
            errors.push(ValidationError::NoAppenders {
                category: category.clone(),
            });
        }
        for appender in &settings.appenders {
            if !config.appenders.contains_key(appender) {
                errors.push(ValidationError::UnknownAppender {
                    category: category.clone(),
                    appender: appender.clone(),
                });
            }
        }
    }

    for (name, appender) in &config.appenders {
        if let Err(source) = Layout::from_config(appender.layout()) {
            errors.push(ValidationError::InvalidLayout {
                appender: name.clone(),
                source,
            });
        }
        match appender {
            AppenderConfig::File { filename, .. } if filename.as_os_str().is_empty() => {
                errors.push(ValidationError::EmptyFilename {
                    appender: name.clone(),
                });
            }
            AppenderConfig::Recording { capacity: 0, .. } => {
                errors.push(ValidationError::ZeroCapacity {
                    appender: name.clone(),
                });
            }
            _ => {}
        }
    }

    let access = &config.express_middleware_options;
    if let Some(pattern) = &access.nolog {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::InvalidNolog {
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }
    if let Err(e) = AccessLogFormat::parse(&access.format) {
        errors.push(ValidationError::InvalidAccessFormat(e));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CategoryConfig, LayoutConfig};
    use crate::observability::level::Level;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = LoggingConfig::default();
        config.categories.remove(DEFAULT_CATEGORY);
        config.categories.insert(
            "routing".to_string(),
            CategoryConfig {
                level: Level::Debug,
                appenders: vec!["missing".to_string()],
                enable_call_stack: false,
            },
        );
        config.appenders.insert(
            "broken".to_string(),
            AppenderConfig::Console {
                layout: LayoutConfig::Pattern {
                    pattern: "%z".to_string(),
                    placeholder: "-".to_string(),
                },
            },
        );
        config.express_middleware_options.nolog = Some("(".to_string());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MissingDefaultCategory));
        assert!(errors.contains(&ValidationError::UnknownAppender {
            category: "routing".to_string(),
            appender: "missing".to_string(),
        }));
    }

    #[test]
    fn test_empty_appender_list_rejected() {
        let mut config = LoggingConfig::default();
        config.categories.insert(
            "quiet".to_string(),
            CategoryConfig {
                level: Level::Off,
                appenders: Vec::new(),
                enable_call_stack: false,
            },
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::NoAppenders {
                category: "quiet".to_string()
            }]
        );
    }
}
