//! Configuration schema definitions.
//!
//! This module defines the complete logging configuration document.
//! Keys are camelCase in the TOML file. All types derive Serde traits;
//! the `Default` impls form the embedded default document that user
//! files are deep-merged over.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::observability::layout::{DEFAULT_PATTERN, DEFAULT_PLACEHOLDER};
use crate::observability::level::{Level, LevelSetting};

/// Name of the category every unmatched category falls back to.
pub const DEFAULT_CATEGORY: &str = "default";

/// Root of the logging configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Sink definitions by name.
    pub appenders: BTreeMap<String, AppenderConfig>,

    /// Category name → threshold and sinks.
    pub categories: BTreeMap<String, CategoryConfig>,

    /// Access log settings for inbound requests.
    pub express_middleware_options: AccessLogConfig,

    /// Outbound HTTP traffic policy document.
    pub http_client: HttpClientDocument,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut appenders = BTreeMap::new();
        appenders.insert(
            "consoleAppender".to_string(),
            AppenderConfig::Console {
                layout: LayoutConfig::default(),
            },
        );

        let mut categories = BTreeMap::new();
        categories.insert(
            DEFAULT_CATEGORY.to_string(),
            CategoryConfig {
                level: Level::Info,
                appenders: vec!["consoleAppender".to_string()],
                enable_call_stack: false,
            },
        );

        Self {
            appenders,
            categories,
            express_middleware_options: AccessLogConfig::default(),
            http_client: HttpClientDocument::default(),
        }
    }
}

/// Sink definition, tagged by `type`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppenderConfig {
    /// Standard output.
    Console {
        #[serde(default)]
        layout: LayoutConfig,
    },
    /// Standard error.
    Stderr {
        #[serde(default)]
        layout: LayoutConfig,
    },
    /// Append-mode file, parent directories created on open.
    File {
        filename: PathBuf,
        #[serde(default)]
        layout: LayoutConfig,
    },
    /// In-memory ring buffer, readable through the pipeline.
    Recording {
        #[serde(default)]
        layout: LayoutConfig,
        #[serde(default = "default_recording_capacity")]
        capacity: usize,
    },
}

impl AppenderConfig {
    pub fn layout(&self) -> &LayoutConfig {
        match self {
            AppenderConfig::Console { layout }
            | AppenderConfig::Stderr { layout }
            | AppenderConfig::File { layout, .. }
            | AppenderConfig::Recording { layout, .. } => layout,
        }
    }
}

fn default_recording_capacity() -> usize {
    1024
}

/// Line layout, tagged by `type`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LayoutConfig {
    Pattern {
        pattern: String,
        /// Rendered by `%x{..}` tokens when no context is active.
        #[serde(default = "default_placeholder")]
        placeholder: String,
    },
    Basic,
    Colored,
    Json,
    MessagePassThrough,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig::Pattern {
            pattern: DEFAULT_PATTERN.to_string(),
            placeholder: default_placeholder(),
        }
    }
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

/// Threshold and sinks for one category.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConfig {
    pub level: Level,

    #[serde(default)]
    pub appenders: Vec<String>,

    /// Record file and line for events in this category.
    #[serde(default)]
    pub enable_call_stack: bool,
}

/// Access log configuration (`expressMiddlewareOptions`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Line format with `:token` placeholders.
    pub format: String,

    /// Static level or `auto` (by status code).
    pub level: LevelSetting,

    /// Regex of request paths that are never access-logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nolog: Option<String>,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            format: "| server[:hostname] | client:[:remote-addr] | :method :url".to_string(),
            level: LevelSetting::Auto,
            nolog: Some("service/version|service/health".to_string()),
        }
    }
}

/// HTTP traffic policy document (`httpClient`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpClientDocument {
    pub request: RequestPolicyDocument,
    pub response: ResponsePolicyDocument,
}

impl Default for HttpClientDocument {
    fn default() -> Self {
        Self {
            request: RequestPolicyDocument {
                log_it: Some(false),
                level: Some(LevelSetting::Static(Level::Info)),
                method: Some(true),
                url: Some(true),
                body: Some(false),
                headers: Some(HeaderSetting::Name("all".to_string())),
            },
            response: ResponsePolicyDocument {
                log_it: Some(true),
                level: Some(LevelSetting::Auto),
                level2xx: Some(Level::Info),
                level3xx: Some(Level::Info),
                level4xx: Some(Level::Error),
                level5xx: Some(Level::Error),
                method_and_path: Some(false),
                status_code: Some(true),
                body: Some(false),
                headers: Some(HeaderSetting::Name("all".to_string())),
            },
        }
    }
}

/// Partial request policy; unset fields fall back to the built-in policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestPolicyDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_it: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSetting>,
}

/// Partial response policy; unset fields fall back to the built-in policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponsePolicyDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_it: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level2xx: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level3xx: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level4xx: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level5xx: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_and_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSetting>,
}

/// `headers` setting: `false`, `true`, `"all"`, a name, or a list of names.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum HeaderSetting {
    Flag(bool),
    Name(String),
    Names(Vec<String>),
}
