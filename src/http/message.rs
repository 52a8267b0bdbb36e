//! HTTP messages as seen by the traffic logger.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, Method};
use serde_json::Value;

/// Header names stripped from merged outbound request headers.
///
/// The per-method names mirror the header-defaults layout of common HTTP
/// client libraries; `authorization` keeps credentials out of log lines.
pub const OMITTED_REQUEST_HEADERS: [&str; 8] = [
    "common",
    "get",
    "post",
    "head",
    "put",
    "patch",
    "delete",
    "authorization",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Request,
    Response,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
        }
    }
}

/// Outbound request headers, layered like client defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestHeaders {
    /// Sent with every request.
    pub common: HeaderMap,
    /// Sent with requests of one method.
    pub per_method: HashMap<Method, HeaderMap>,
    /// Set on this request.
    pub request: HeaderMap,
}

impl RequestHeaders {
    pub fn from_request(headers: HeaderMap) -> Self {
        Self {
            request: headers,
            ..Self::default()
        }
    }

    /// Headers sent for `method`: common, then method-specific, then the
    /// request's own, later layers replacing earlier values.
    pub fn effective(&self, method: &Method) -> HeaderMap {
        let mut merged = self.common.clone();
        if let Some(specific) = self.per_method.get(method) {
            merged.extend(specific.clone());
        }
        merged.extend(self.request.clone());
        merged
    }

    /// [`effective`](Self::effective) headers without the
    /// [`OMITTED_REQUEST_HEADERS`], as they appear in log lines.
    pub fn merged(&self, method: &Method) -> HeaderMap {
        let mut merged = self.effective(method);
        for name in OMITTED_REQUEST_HEADERS {
            merged.remove(HeaderName::from_static(name));
        }
        merged
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: RequestHeaders,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: RequestHeaders::default(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: axum::http::HeaderValue) -> Self {
        self.headers.request.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Method and path of the request a response answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub request: Option<RequestLine>,
}

impl InboundResponse {
    pub fn new(status: u16) -> Self {
        let status_text = axum::http::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            headers: HeaderMap::new(),
            body: None,
            request: None,
        }
    }

    pub fn with_request(mut self, method: Method, path: impl Into<String>) -> Self {
        self.request = Some(RequestLine {
            method,
            path: path.into(),
        });
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A message handed to the policy engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpMessage<'a> {
    Request(&'a OutboundRequest),
    Response(&'a InboundResponse),
}

impl<'a> HttpMessage<'a> {
    pub fn message_type(&self) -> MessageType {
        match self {
            HttpMessage::Request(_) => MessageType::Request,
            HttpMessage::Response(_) => MessageType::Response,
        }
    }

    pub fn body(&self) -> Option<&'a Value> {
        match self {
            HttpMessage::Request(request) => request.body.as_ref(),
            HttpMessage::Response(response) => response.body.as_ref(),
        }
    }

    /// Whether the message carries a body worth logging.
    ///
    /// `null`, `""`, `false` and `0` count as no body.
    pub fn has_body(&self) -> bool {
        match self.body() {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(n)) => n.as_f64() != Some(0.0),
            Some(_) => true,
        }
    }

    /// Headers as logged: merged and filtered for requests, as received
    /// for responses.
    pub fn headers(&self) -> HeaderMap {
        match self {
            HttpMessage::Request(request) => request.headers.merged(&request.method),
            HttpMessage::Response(response) => response.headers.clone(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpMessage::Request(_) => None,
            HttpMessage::Response(response) => Some(response.status),
        }
    }
}

impl<'a> From<&'a OutboundRequest> for HttpMessage<'a> {
    fn from(request: &'a OutboundRequest) -> Self {
        HttpMessage::Request(request)
    }
}

impl<'a> From<&'a InboundResponse> for HttpMessage<'a> {
    fn from(response: &'a InboundResponse) -> Self {
        HttpMessage::Response(response)
    }
}
