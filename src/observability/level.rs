//! Severity levels.
//!
//! Levels double as thresholds: `all` lets everything through, `off`
//! silences a category. Names parse case-insensitively.

use std::fmt;
use std::str::FromStr;

use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    All,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Off,
}

impl Level {
    /// Upper-case name as rendered in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::All => "ALL",
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Off => "OFF",
        }
    }

    /// Whether an event at this level passes `threshold`.
    ///
    /// `All` and `Off` are thresholds only; events never carry them.
    pub fn passes(self, threshold: Level) -> bool {
        !matches!(self, Level::All | Level::Off) && self >= threshold
    }

    /// Wrap `text` in this level's terminal colour.
    pub fn colorize(&self, text: &str) -> ColoredString {
        match self {
            Level::Trace => text.blue(),
            Level::Debug => text.cyan(),
            Level::Info => text.green(),
            Level::Warn => text.yellow(),
            Level::Error => text.red(),
            Level::Fatal => text.magenta(),
            Level::All | Level::Off => text.normal(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognised level names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Level::All),
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            "off" => Ok(Level::Off),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, ParseLevelError> {
        value.parse()
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_ascii_lowercase()
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// A configured level: either fixed or derived from a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LevelSetting {
    Auto,
    Static(Level),
}

impl TryFrom<String> for LevelSetting {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("auto") {
            Ok(LevelSetting::Auto)
        } else {
            value.parse().map(LevelSetting::Static)
        }
    }
}

impl From<LevelSetting> for String {
    fn from(setting: LevelSetting) -> Self {
        match setting {
            LevelSetting::Auto => "auto".to_owned(),
            LevelSetting::Static(level) => level.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_ordering() {
        assert!(Level::Info.passes(Level::Info));
        assert!(Level::Error.passes(Level::Info));
        assert!(!Level::Debug.passes(Level::Info));
        assert!(Level::Trace.passes(Level::All));
        assert!(!Level::Fatal.passes(Level::Off));
        assert!(!Level::Off.passes(Level::All));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("INFO".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("Warning".parse::<Level>().unwrap(), Level::Warn);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_setting() {
        assert_eq!(LevelSetting::try_from("AUTO".to_string()).unwrap(), LevelSetting::Auto);
        assert_eq!(
            LevelSetting::try_from("error".to_string()).unwrap(),
            LevelSetting::Static(Level::Error)
        );
        assert_eq!(String::from(LevelSetting::Static(Level::Warn)), "warn");
    }

    #[test]
    fn test_level_from_string() {
        assert_eq!(Level::try_from("error".to_string()).unwrap(), Level::Error);
        assert!(Level::try_from("loud".to_string()).is_err());

        #[derive(serde::Deserialize)]
        struct Doc {
            level: Level,
        }
        let doc: Doc = toml::from_str("level = \"fatal\"").unwrap();
        assert_eq!(doc.level, Level::Fatal);
    }
}
