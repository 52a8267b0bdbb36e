//! Access log middleware.
//!
//! One line per inbound request, rendered from `expressMiddlewareOptions`:
//! - `format` with `:token` placeholders (`:req[header]`, `:res[header]`
//!   for headers); unknown tokens are kept as written
//! - `level`, static or `auto` (≥400 error, ≥300 warn, else info)
//! - `nolog`, a regex over path and query; matching requests are skipped

use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, Request, Version},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::loader::ConfigLoadError;
use crate::config::schema::AccessLogConfig;
use crate::observability::level::{Level, LevelSetting};
use crate::observability::logger::LoggerHandle;
use crate::observability::pipeline::LogPipeline;

/// Category of access log lines.
pub const ACCESS_CATEGORY: &str = "http.access";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Method,
    Url,
    Status,
    ResponseTime,
    RemoteAddr,
    Hostname,
    HttpVersion,
    UserAgent,
    Referrer,
    ContentLength,
    Date,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "method" => Field::Method,
            "url" => Field::Url,
            "status" => Field::Status,
            "response-time" => Field::ResponseTime,
            "remote-addr" => Field::RemoteAddr,
            "hostname" => Field::Hostname,
            "http-version" => Field::HttpVersion,
            "user-agent" => Field::UserAgent,
            "referrer" | "referer" => Field::Referrer,
            "content-length" => Field::ContentLength,
            "date" => Field::Date,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field(Field),
    RequestHeader(String),
    ResponseHeader(String),
}

/// A parsed access log format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessLogFormat {
    tokens: Vec<Token>,
}

impl AccessLogFormat {
    pub fn parse(format: &str) -> Result<Self, String> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = format.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != ':' {
                literal.push(c);
                continue;
            }

            let mut name = String::new();
            while let Some(&(_, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '-' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }

            let token = if (name == "req" || name == "res") && matches!(chars.peek(), Some((_, '['))) {
                chars.next();
                let mut header = String::new();
                loop {
                    match chars.next() {
                        Some((_, ']')) => break,
                        Some((_, ch)) => header.push(ch),
                        None => return Err(format!("unterminated ':{}[' in '{}'", name, format)),
                    }
                }
                if header.is_empty() {
                    return Err(format!("empty header name in ':{}[]'", name));
                }
                let header = header.to_ascii_lowercase();
                if name == "req" {
                    Token::RequestHeader(header)
                } else {
                    Token::ResponseHeader(header)
                }
            } else if let Some(field) = Field::from_name(&name) {
                Token::Field(field)
            } else {
                literal.push(':');
                literal.push_str(&name);
                continue;
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(token);
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(Self { tokens })
    }

    pub fn render(&self, record: &AccessLogRecord) -> String {
        let mut out = String::with_capacity(96);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Field(field) => record.write_field(*field, &mut out),
                Token::RequestHeader(name) => {
                    out.push_str(header_or_dash(&record.request_headers, name))
                }
                Token::ResponseHeader(name) => {
                    out.push_str(header_or_dash(&record.response_headers, name))
                }
            }
        }
        out
    }
}

fn header_or_dash<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// What the access log knows about one finished request.
#[derive(Debug, Clone)]
pub struct AccessLogRecord {
    pub method: Method,
    /// Path and query as received.
    pub url: String,
    pub status: u16,
    pub response_time: Duration,
    pub remote_addr: Option<SocketAddr>,
    pub version: Version,
    pub request_headers: HeaderMap,
    pub response_headers: HeaderMap,
    pub date: DateTime<Utc>,
}

impl AccessLogRecord {
    /// Host the request was addressed to, without the port.
    fn hostname(&self) -> Option<&str> {
        let host = self.request_headers.get(header::HOST)?.to_str().ok()?;
        Some(match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        })
    }

    fn write_field(&self, field: Field, out: &mut String) {
        let _ = match field {
            Field::Method => write!(out, "{}", self.method),
            Field::Url => write!(out, "{}", self.url),
            Field::Status => write!(out, "{}", self.status),
            Field::ResponseTime => write!(out, "{:.3}", self.response_time.as_secs_f64() * 1000.0),
            Field::RemoteAddr => match self.remote_addr {
                Some(addr) => write!(out, "{}", addr.ip()),
                None => write!(out, "-"),
            },
            Field::Hostname => write!(out, "{}", self.hostname().unwrap_or("-")),
            Field::HttpVersion => {
                let version = format!("{:?}", self.version);
                write!(out, "{}", version.trim_start_matches("HTTP/"))
            }
            Field::UserAgent => write!(
                out,
                "{}",
                header_or_dash(&self.request_headers, header::USER_AGENT.as_str())
            ),
            Field::Referrer => write!(
                out,
                "{}",
                header_or_dash(&self.request_headers, header::REFERER.as_str())
            ),
            Field::ContentLength => write!(
                out,
                "{}",
                header_or_dash(&self.response_headers, header::CONTENT_LENGTH.as_str())
            ),
            Field::Date => write!(out, "{}", self.date.format("%a, %d %b %Y %H:%M:%S GMT")),
        };
    }
}

/// Compiled access log options.
#[derive(Debug, Clone)]
pub struct AccessLogPolicy {
    format: AccessLogFormat,
    level: LevelSetting,
    nolog: Option<Regex>,
}

impl AccessLogPolicy {
    pub fn from_config(config: &AccessLogConfig) -> Result<Self, ConfigLoadError> {
        let format = AccessLogFormat::parse(&config.format).map_err(ConfigLoadError::Shape)?;
        let nolog = config
            .nolog
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigLoadError::Shape(e.to_string()))?;

        Ok(Self {
            format,
            level: config.level,
            nolog,
        })
    }

    /// Whether a request for `url` (path and query) is logged at all.
    pub fn should_log(&self, url: &str) -> bool {
        !self.nolog.as_ref().is_some_and(|re| re.is_match(url))
    }

    pub fn level_for(&self, status: u16) -> Level {
        match self.level {
            LevelSetting::Static(level) => level,
            LevelSetting::Auto if status >= 400 => Level::Error,
            LevelSetting::Auto if status >= 300 => Level::Warn,
            LevelSetting::Auto => Level::Info,
        }
    }

    pub fn render(&self, record: &AccessLogRecord) -> String {
        self.format.render(record)
    }
}

impl Default for AccessLogPolicy {
    fn default() -> Self {
        let config = AccessLogConfig::default();
        Self {
            format: AccessLogFormat::parse(&config.format).unwrap_or_default(),
            level: config.level,
            nolog: config.nolog.as_deref().and_then(|re| Regex::new(re).ok()),
        }
    }
}

/// State for [`access_log_middleware`].
#[derive(Debug, Clone)]
pub struct AccessLogState {
    pipeline: Arc<LogPipeline>,
    logger: LoggerHandle,
}

impl AccessLogState {
    pub fn new(pipeline: Arc<LogPipeline>) -> Self {
        let logger = pipeline.category_logger(ACCESS_CATEGORY);
        Self { pipeline, logger }
    }

    pub fn global() -> Self {
        Self::new(LogPipeline::global())
    }
}

/// Log one line per request with the pipeline's current access log policy.
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(from_fn_with_state(AccessLogState::global(), access_log_middleware))
///     .layer(RequestContextLayer::new());
/// ```
pub async fn access_log_middleware(
    State(state): State<AccessLogState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let version = req.version();
    let request_headers = req.headers().clone();
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let response = next.run(req).await;

    let policy = state.pipeline.access_log();
    if !policy.should_log(&url) {
        return response;
    }

    let status = response.status().as_u16();
    let level = policy.level_for(status);
    if !state.logger.is_enabled(level) {
        return response;
    }

    let record = AccessLogRecord {
        method,
        url,
        status,
        response_time: started.elapsed(),
        remote_addr,
        version,
        request_headers,
        response_headers: response.headers().clone(),
        date: Utc::now(),
    };
    state.logger.log(level, policy.render(&record));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn record() -> AccessLogRecord {
        let mut request_headers = HeaderMap::new();
        request_headers.insert(header::HOST, HeaderValue::from_static("api.local:8080"));
        request_headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));
        let mut response_headers = HeaderMap::new();
        response_headers.insert("x-request-id", HeaderValue::from_static("r-1"));

        AccessLogRecord {
            method: Method::GET,
            url: "/orders?page=2".to_string(),
            status: 200,
            response_time: Duration::from_micros(1500),
            remote_addr: Some("10.0.0.5:5123".parse().unwrap()),
            version: Version::HTTP_11,
            request_headers,
            response_headers,
            date: Utc::now(),
        }
    }

    #[test]
    fn test_default_format() {
        let policy = AccessLogPolicy::default();
        assert_eq!(
            policy.render(&record()),
            "| server[api.local] | client:[10.0.0.5] | GET /orders?page=2"
        );
    }

    #[test]
    fn test_header_tokens_and_unknown_tokens() {
        let format = AccessLogFormat::parse(
            ":status :req[User-Agent] :res[x-request-id] :res[x-none] :bogus :http-version :response-time",
        )
        .unwrap();
        assert_eq!(
            format.render(&record()),
            "200 curl/8 r-1 - :bogus 1.1 1.500"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(AccessLogFormat::parse(":req[host").is_err());
        assert!(AccessLogFormat::parse(":res[]").is_err());
    }

    #[test]
    fn test_nolog_and_auto_level() {
        let policy = AccessLogPolicy::default();
        assert!(!policy.should_log("/service/health"));
        assert!(!policy.should_log("/api/service/version?x=1"));
        assert!(policy.should_log("/orders"));

        assert_eq!(policy.level_for(200), Level::Info);
        assert_eq!(policy.level_for(302), Level::Warn);
        assert_eq!(policy.level_for(404), Level::Error);
        assert_eq!(policy.level_for(503), Level::Error);
    }

    #[test]
    fn test_static_level() {
        let config = AccessLogConfig {
            level: LevelSetting::Static(Level::Debug),
            nolog: None,
            ..AccessLogConfig::default()
        };
        let policy = AccessLogPolicy::from_config(&config).unwrap();
        assert_eq!(policy.level_for(500), Level::Debug);
        assert!(policy.should_log("/service/health"));
    }
}
