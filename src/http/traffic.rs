//! HTTP traffic logging.
//!
//! # Responsibilities
//! - Evaluate the effective policy against one request or response
//! - Render the log line for it
//! - Hand messages back untouched, whatever happens while logging
//!
//! # Data Flow
//! ```text
//! HttpMessage
//!     → resolve_level (static / auto by status / callback)
//!     → include_body (flag, non-empty body, predicate)
//!     → select_headers (none / all / subset / callback)
//!     → render → Evaluation { should_log, level, line }
//! ```

use std::fmt::Write;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::http::message::{HttpMessage, InboundResponse, OutboundRequest};
use crate::http::policy::{
    BodyRule, HeaderRule, HeaderSelector, HttpClientPolicy, LevelRule, StatusLevels,
};
use crate::observability::level::Level;
use crate::observability::logger::LoggerHandle;
use crate::observability::pipeline::LogPipeline;

/// Category of traffic log lines.
pub const TRAFFIC_CATEGORY: &str = "http.traffic";

/// Category of the engine's own render failures. Kept outside
/// `http.traffic` so silencing traffic does not hide them.
pub const ENGINE_CATEGORY: &str = "scopelog.traffic";

/// Rendered in place of a selected header the message does not carry.
const MISSING_HEADER: &str = "-";

#[derive(Debug, thiserror::Error)]
pub enum TrafficLogRenderError {
    #[error("response has no request line to render method and path")]
    MissingRequestLine,
    #[error("policy callback failed: {0}")]
    Callback(String),
    #[error("body could not be serialized: {0}")]
    Body(#[from] serde_json::Error),
}

/// Outcome of evaluating a policy against a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub should_log: bool,
    pub level: Level,
    pub line: String,
}

impl Evaluation {
    fn skip() -> Self {
        Self {
            should_log: false,
            level: Level::Off,
            line: String::new(),
        }
    }
}

/// Headers chosen for a log line.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderSelection {
    None,
    All(HeaderMap),
    /// Name and value, in the order requested. `None` when absent.
    Subset(Vec<(String, Option<String>)>),
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<String> = headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn callback_error(e: Box<dyn std::error::Error + Send + Sync>) -> TrafficLogRenderError {
    TrafficLogRenderError::Callback(e.to_string())
}

/// Level for `message` under `rule`.
///
/// `Auto` buckets responses by status class and resolves to `info` for
/// requests.
pub fn resolve_level(
    message: &HttpMessage<'_>,
    rule: &LevelRule,
    status_levels: &StatusLevels,
) -> Result<Level, TrafficLogRenderError> {
    match rule {
        LevelRule::Static(level) => Ok(*level),
        LevelRule::Auto => Ok(match message.status() {
            Some(status) => status_levels.for_status(status),
            None => Level::Info,
        }),
        LevelRule::Callback(callback) => callback(message).map_err(callback_error),
    }
}

/// Whether the body goes into the line.
pub fn include_body(message: &HttpMessage<'_>, rule: &BodyRule) -> Result<bool, TrafficLogRenderError> {
    if !message.has_body() {
        return Ok(false);
    }
    match rule {
        BodyRule::Off => Ok(false),
        BodyRule::On => Ok(true),
        BodyRule::Predicate(predicate) => predicate(message).map_err(callback_error),
    }
}

/// Headers that go into the line.
pub fn select_headers(
    message: &HttpMessage<'_>,
    rule: &HeaderRule,
) -> Result<HeaderSelection, TrafficLogRenderError> {
    let selector = match rule {
        HeaderRule::Select(selector) => selector.clone(),
        HeaderRule::Callback(callback) => callback(message).map_err(callback_error)?,
    };

    Ok(match selector {
        HeaderSelector::None => HeaderSelection::None,
        HeaderSelector::All => HeaderSelection::All(message.headers()),
        HeaderSelector::Names(names) => {
            let headers = message.headers();
            HeaderSelection::Subset(
                names
                    .into_iter()
                    .map(|name| {
                        let value = header_value(&headers, &name);
                        (name, value)
                    })
                    .collect(),
            )
        }
    })
}

fn render_body(body: &Value) -> Result<String, TrafficLogRenderError> {
    match body {
        Value::String(text) => Ok(text.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

fn render_headers(selection: &HeaderSelection) -> Result<Option<String>, TrafficLogRenderError> {
    match selection {
        HeaderSelection::None => Ok(None),
        HeaderSelection::All(headers) => {
            let mut object = Map::new();
            for name in headers.keys() {
                if let Some(value) = header_value(headers, name.as_str()) {
                    object.insert(name.as_str().to_owned(), Value::String(value));
                }
            }
            Ok(Some(format!(
                "headers: {}",
                serde_json::to_string(&Value::Object(object))?
            )))
        }
        HeaderSelection::Subset(pairs) => {
            let rendered: Vec<String> = pairs
                .iter()
                .map(|(name, value)| {
                    format!("{}: {}", name, value.as_deref().unwrap_or(MISSING_HEADER))
                })
                .collect();
            Ok(Some(rendered.join(", ")))
        }
    }
}

/// Body and header segments shared by both message types.
fn trailing_segments(
    message: &HttpMessage<'_>,
    body: &BodyRule,
    headers: &HeaderRule,
) -> Result<Vec<String>, TrafficLogRenderError> {
    let mut segments = Vec::new();
    if include_body(message, body)? {
        if let Some(value) = message.body() {
            segments.push(render_body(value)?);
        }
    }
    if let Some(rendered) = render_headers(&select_headers(message, headers)?)? {
        segments.push(rendered);
    }
    Ok(segments)
}

fn evaluate_request(
    request: &OutboundRequest,
    policy: &HttpClientPolicy,
) -> Result<Evaluation, TrafficLogRenderError> {
    let rules = &policy.request;
    if !rules.log_it {
        return Ok(Evaluation::skip());
    }
    let message = HttpMessage::Request(request);
    let level = resolve_level(&message, &rules.level, &policy.response.status_levels)?;

    let mut segments = Vec::new();
    if rules.method {
        segments.push(request.method.as_str().to_owned());
    }
    if rules.url {
        segments.push(request.url.clone());
    }
    segments.extend(trailing_segments(&message, &rules.body, &rules.headers)?);

    let line = format!("Requesting {}", segments.join(" | "));
    Ok(Evaluation {
        should_log: true,
        level,
        line: line.trim_end().to_owned(),
    })
}

fn evaluate_response(
    response: &InboundResponse,
    policy: &HttpClientPolicy,
) -> Result<Evaluation, TrafficLogRenderError> {
    let rules = &policy.response;
    if !rules.log_it {
        return Ok(Evaluation::skip());
    }
    let message = HttpMessage::Response(response);
    let level = resolve_level(&message, &rules.level, &rules.status_levels)?;

    let mut line = String::new();
    if rules.method_and_path {
        let request = response
            .request
            .as_ref()
            .ok_or(TrafficLogRenderError::MissingRequestLine)?;
        let _ = write!(line, "For {} {} | ", request.method, request.path);
    }
    line.push_str("Response");
    if rules.status_code {
        let code = format!("{} {}", response.status, response.status_text);
        let _ = write!(line, " code:[{}]", code.trim_end());
    }
    for segment in trailing_segments(&message, &rules.body, &rules.headers)? {
        line.push_str(" | ");
        line.push_str(&segment);
    }

    Ok(Evaluation {
        should_log: true,
        level,
        line: line.trim_end().to_owned(),
    })
}

/// Evaluate `policy` against `message`.
pub fn evaluate(
    message: &HttpMessage<'_>,
    policy: &HttpClientPolicy,
) -> Result<Evaluation, TrafficLogRenderError> {
    match message {
        HttpMessage::Request(request) => evaluate_request(request, policy),
        HttpMessage::Response(response) => evaluate_response(response, policy),
    }
}

/// Logs outbound requests and inbound responses with the pipeline's
/// current traffic policy.
#[derive(Debug, Clone)]
pub struct HttpTrafficLogger {
    pipeline: Arc<LogPipeline>,
    logger: LoggerHandle,
    failures: LoggerHandle,
}

impl HttpTrafficLogger {
    pub fn new(pipeline: Arc<LogPipeline>) -> Self {
        let logger = pipeline.category_logger(TRAFFIC_CATEGORY);
        let failures = pipeline.category_logger(ENGINE_CATEGORY);
        Self {
            pipeline,
            logger,
            failures,
        }
    }

    /// Traffic logger on the global pipeline.
    pub fn global() -> Self {
        Self::new(LogPipeline::global())
    }

    /// Log `request` and return it unmodified.
    pub fn log_request(&self, request: OutboundRequest) -> OutboundRequest {
        self.log(HttpMessage::Request(&request));
        request
    }

    /// Log `response` and return it unmodified.
    pub fn log_response(&self, response: InboundResponse) -> InboundResponse {
        self.log(HttpMessage::Response(&response));
        response
    }

    /// Log `message`. Failures are logged once at error level.
    pub fn log(&self, message: HttpMessage<'_>) {
        let policy = self.pipeline.http_policy();
        match evaluate(&message, &policy) {
            Ok(evaluation) if evaluation.should_log => {
                self.logger.log(evaluation.level, evaluation.line);
            }
            Ok(_) => {}
            Err(e) => {
                self.failures.error(format_args!(
                    "Failed to log http {}: {}",
                    message.message_type().as_str(),
                    e
                ));
            }
        }
    }
}
