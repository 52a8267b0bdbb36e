//! Line layouts.
//!
//! # Pattern tokens
//! - `%d` / `%d{fmt}`: timestamp (`ISO8601`, `ISO8601_WITH_TZ_OFFSET`,
//!   `ABSOLUTE`, `DATE` or a strftime string)
//! - `%c`: category, `%f`: file, `%l`: line, `%p`: level, `%m`: message
//! - `%[` ... `%]`: wrap the enclosed text in the level's colour
//! - `%x{field}`: context field (`requestId` or an extra field), or the
//!   layout's placeholder when no context is active
//! - `%n`: newline, `%%`: literal percent

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};

use crate::config::schema::LayoutConfig;
use crate::observability::event::LogEvent;

pub const DEFAULT_PATTERN: &str = "%d | [%x{requestId}] | [%c:%l] [%[%p%]]: %m";
pub const DEFAULT_PLACEHOLDER: &str = "no-ctx";

const ISO8601: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("unknown pattern token '%{0}'")]
    UnknownToken(char),
    #[error("pattern ends with a dangling '%'")]
    DanglingPercent,
    #[error("unterminated argument for '%{0}'")]
    UnterminatedArgument(char),
    #[error("'%x' needs a field name, e.g. %x{{requestId}}")]
    MissingContextField,
    #[error("invalid date format '{0}'")]
    InvalidDateFormat(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Date(String),
    Category,
    File,
    Line,
    Level,
    ColorStart,
    ColorEnd,
    Message,
    Newline,
    Context(String),
}

/// A compiled `pattern` layout.
#[derive(Debug, Clone)]
pub struct PatternLayout {
    tokens: Vec<Token>,
    placeholder: String,
}

impl PatternLayout {
    /// Compile `pattern`. Fails on unknown tokens or bad date formats.
    pub fn compile(pattern: &str, placeholder: impl Into<String>) -> Result<Self, LayoutError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let directive = chars.next().ok_or(LayoutError::DanglingPercent)?;
            let argument = if matches!(directive, 'd' | 'x') && chars.peek() == Some(&'{') {
                chars.next();
                let mut arg = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => arg.push(ch),
                        None => return Err(LayoutError::UnterminatedArgument(directive)),
                    }
                }
                Some(arg)
            } else {
                None
            };

            let token = match directive {
                '%' => {
                    literal.push('%');
                    continue;
                }
                'd' => Token::Date(date_format(argument.as_deref())?),
                'c' => Token::Category,
                'f' => Token::File,
                'l' => Token::Line,
                'p' => Token::Level,
                '[' => Token::ColorStart,
                ']' => Token::ColorEnd,
                'm' => Token::Message,
                'n' => Token::Newline,
                'x' => Token::Context(
                    argument
                        .filter(|a| !a.is_empty())
                        .ok_or(LayoutError::MissingContextField)?,
                ),
                other => return Err(LayoutError::UnknownToken(other)),
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(token);
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            tokens,
            placeholder: placeholder.into(),
        })
    }

    pub fn render(&self, event: &LogEvent) -> String {
        let mut out = String::with_capacity(128);
        let mut colored: Option<String> = None;

        for token in &self.tokens {
            match token {
                Token::ColorStart => {
                    colored = Some(String::new());
                    continue;
                }
                Token::ColorEnd => {
                    if let Some(buf) = colored.take() {
                        let _ = write!(out, "{}", event.level.colorize(&buf));
                    }
                    continue;
                }
                _ => {}
            }

            let target = match colored.as_mut() {
                Some(buf) => buf,
                None => &mut out,
            };
            match token {
                Token::Literal(text) => target.push_str(text),
                Token::Date(fmt) => {
                    let _ = write!(target, "{}", event.timestamp.format(fmt));
                }
                Token::Category => target.push_str(&event.category),
                Token::File => {
                    if let Some(location) = &event.location {
                        target.push_str(&location.file);
                    }
                }
                Token::Line => {
                    if let Some(location) = &event.location {
                        let _ = write!(target, "{}", location.line);
                    }
                }
                Token::Level => target.push_str(event.level.as_str()),
                Token::Message => target.push_str(&event.message),
                Token::Newline => target.push('\n'),
                Token::Context(field) => {
                    let value = event
                        .context
                        .as_deref()
                        .and_then(|ctx| ctx.field(field))
                        .unwrap_or(&self.placeholder);
                    target.push_str(value);
                }
                Token::ColorStart | Token::ColorEnd => {}
            }
        }

        // Unterminated colour block renders plain.
        if let Some(buf) = colored {
            out.push_str(&buf);
        }
        out
    }
}

fn date_format(argument: Option<&str>) -> Result<String, LayoutError> {
    let format = match argument {
        None | Some("ISO8601") => ISO8601.to_owned(),
        Some("ISO8601_WITH_TZ_OFFSET") => format!("{ISO8601}%:z"),
        Some("ABSOLUTE") => "%H:%M:%S%.3f".to_owned(),
        Some("DATE") => "%d %m %Y %H:%M:%S%.3f".to_owned(),
        Some(custom) => {
            if StrftimeItems::new(custom).any(|item| matches!(item, Item::Error)) {
                return Err(LayoutError::InvalidDateFormat(custom.to_owned()));
            }
            custom.to_owned()
        }
    };
    Ok(format)
}

/// How an appender turns an event into a line.
#[derive(Debug, Clone)]
pub enum Layout {
    Pattern(PatternLayout),
    Basic,
    Colored,
    Json,
    MessagePassThrough,
}

impl Layout {
    pub fn from_config(config: &LayoutConfig) -> Result<Self, LayoutError> {
        Ok(match config {
            LayoutConfig::Pattern { pattern, placeholder } => {
                Layout::Pattern(PatternLayout::compile(pattern, placeholder.clone())?)
            }
            LayoutConfig::Basic => Layout::Basic,
            LayoutConfig::Colored => Layout::Colored,
            LayoutConfig::Json => Layout::Json,
            LayoutConfig::MessagePassThrough => Layout::MessagePassThrough,
        })
    }

    pub fn render(&self, event: &LogEvent) -> String {
        match self {
            Layout::Pattern(pattern) => pattern.render(event),
            Layout::Basic => format!(
                "[{}] [{}] {} - {}",
                event.timestamp.format(ISO8601),
                event.level,
                event.category,
                event.message
            ),
            Layout::Colored => {
                let prefix = format!(
                    "[{}] [{}] {} -",
                    event.timestamp.format(ISO8601),
                    event.level,
                    event.category
                );
                format!("{} {}", event.level.colorize(&prefix), event.message)
            }
            Layout::Json => {
                let mut value = serde_json::json!({
                    "startTime": event.timestamp.to_rfc3339(),
                    "categoryName": &*event.category,
                    "level": event.level.as_str(),
                    "data": event.message,
                    "requestId": event.request_id(),
                });
                if let Some(ctx) = event.context.as_deref() {
                    if !ctx.fields().is_empty() {
                        value["context"] = serde_json::json!(ctx.fields());
                    }
                }
                if let Some(location) = &event.location {
                    value["fileName"] = serde_json::json!(location.file);
                    value["lineNumber"] = serde_json::json!(location.line);
                }
                value.to_string()
            }
            Layout::MessagePassThrough => event.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::observability::event::CallSite;
    use crate::observability::level::Level;
    use chrono::{Local, TimeZone};
    use std::sync::Arc;

    fn event(context: Option<ExecutionContext>) -> LogEvent {
        LogEvent {
            timestamp: Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
            level: Level::Warn,
            category: Arc::from("http.traffic"),
            message: "hello".to_string(),
            context: context.map(Arc::new),
            location: Some(CallSite {
                file: "src/http/traffic.rs".to_string(),
                line: 42,
            }),
        }
    }

    #[test]
    fn test_pattern_tokens() {
        let layout = PatternLayout::compile("[%x{requestId}] %c:%l %p %m%%", "no-ctx").unwrap();
        let line = layout.render(&event(Some(ExecutionContext::new("req-9"))));
        assert_eq!(line, "[req-9] http.traffic:42 WARN hello%");
    }

    #[test]
    fn test_placeholder_without_context() {
        let layout = PatternLayout::compile("%x{requestId} %x{tenant}", "no-ctx").unwrap();
        assert_eq!(layout.render(&event(None)), "no-ctx no-ctx");

        let ctx = ExecutionContext::new("r").with_field("tenant", "acme");
        assert_eq!(layout.render(&event(Some(ctx))), "r acme");
    }

    #[test]
    fn test_date_formats() {
        let layout = PatternLayout::compile("%d|%d{ABSOLUTE}|%d{%Y}", "-").unwrap();
        assert_eq!(
            layout.render(&event(None)),
            "2024-03-01T12:30:45.000|12:30:45.000|2024"
        );
    }

    #[test]
    fn test_color_block_keeps_text() {
        let layout = PatternLayout::compile("[%[%p%]]", "-").unwrap();
        assert!(layout.render(&event(None)).contains("WARN"));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            PatternLayout::compile("%q", "-").unwrap_err(),
            LayoutError::UnknownToken('q')
        );
        assert_eq!(
            PatternLayout::compile("abc %", "-").unwrap_err(),
            LayoutError::DanglingPercent
        );
        assert_eq!(
            PatternLayout::compile("%x", "-").unwrap_err(),
            LayoutError::MissingContextField
        );
        assert_eq!(
            PatternLayout::compile("%x{requestId", "-").unwrap_err(),
            LayoutError::UnterminatedArgument('x')
        );
        assert!(matches!(
            PatternLayout::compile("%d{%Q}", "-").unwrap_err(),
            LayoutError::InvalidDateFormat(_)
        ));
    }

    #[test]
    fn test_json_layout_includes_request_id() {
        let line = Layout::Json.render(&event(Some(ExecutionContext::new("req-j"))));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["requestId"], "req-j");
        assert_eq!(value["categoryName"], "http.traffic");
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["lineNumber"], 42);
    }

    #[test]
    fn test_basic_layout() {
        let line = Layout::Basic.render(&event(None));
        assert_eq!(line, "[2024-03-01T12:30:45.000] [WARN] http.traffic - hello");
    }
}
