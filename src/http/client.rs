//! Outbound HTTP client with traffic logging.
//!
//! Every request is handed to the traffic logger before it is sent, and
//! every response after it is read. Logging never changes what is sent or
//! what the caller gets back.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::message::{InboundResponse, OutboundRequest, RequestHeaders, RequestLine};
use crate::http::traffic::HttpTrafficLogger;

/// Error type for outbound calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}")]
    Status { status: u16, response: Box<InboundResponse> },
    #[error("response body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// `reqwest` client whose traffic goes through an [`HttpTrafficLogger`].
#[derive(Debug, Clone)]
pub struct TrafficLoggingClient {
    client: reqwest::Client,
    traffic: HttpTrafficLogger,
    defaults: RequestHeaders,
}

impl TrafficLoggingClient {
    pub fn new(client: reqwest::Client, traffic: HttpTrafficLogger) -> Self {
        Self {
            client,
            traffic,
            defaults: RequestHeaders::default(),
        }
    }

    /// Client on the global pipeline.
    pub fn global() -> Self {
        Self::new(reqwest::Client::new(), HttpTrafficLogger::global())
    }

    /// Header sent with every request.
    pub fn with_common_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.defaults.common.insert(name, value);
        self
    }

    /// Header sent with every request of `method`.
    pub fn with_method_header(mut self, method: Method, name: HeaderName, value: HeaderValue) -> Self {
        self.defaults
            .per_method
            .entry(method)
            .or_default()
            .insert(name, value);
        self
    }

    /// Send `request` and read the whole response.
    pub async fn execute(&self, mut request: OutboundRequest) -> Result<InboundResponse, ClientError> {
        self.apply_defaults(&mut request.headers);
        let request = self.traffic.log_request(request);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.effective(&request.method));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let path = request_path(response.url());
        let bytes = response.bytes().await?;

        let inbound = InboundResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            body: decode_body(&headers, &bytes),
            headers,
            request: Some(RequestLine {
                method: request.method,
                path,
            }),
        };
        Ok(self.traffic.log_response(inbound))
    }

    /// Send `request` and decode a successful JSON response.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: OutboundRequest) -> Result<T, ClientError> {
        let response = self.execute(request).await?;
        if response.status >= 400 {
            return Err(ClientError::Status {
                status: response.status,
                response: Box::new(response),
            });
        }
        let body = response.body.unwrap_or(Value::Null);
        Ok(serde_json::from_value(body)?)
    }

    fn apply_defaults(&self, headers: &mut RequestHeaders) {
        let mut common = self.defaults.common.clone();
        common.extend(std::mem::take(&mut headers.common));
        headers.common = common;

        for (method, defaults) in &self.defaults.per_method {
            let entry = headers.per_method.entry(method.clone()).or_default();
            let mut merged = defaults.clone();
            merged.extend(std::mem::take(entry));
            *entry = merged;
        }
    }
}

/// Path and query of `url`, as logged in response lines.
fn request_path(url: &url::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    }
}

/// JSON when it parses, text otherwise, `None` when empty.
fn decode_body(headers: &HeaderMap, bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    let is_json = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    if is_json {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return Some(value);
        }
    }
    Some(Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_path_keeps_query() {
        let url = url::Url::parse("http://localhost:8080/orders/7?expand=items").unwrap();
        assert_eq!(request_path(&url), "/orders/7?expand=items");
    }

    #[test]
    fn test_decode_body() {
        let mut headers = HeaderMap::new();
        assert_eq!(decode_body(&headers, b""), None);
        assert_eq!(decode_body(&headers, b"{\"a\":1}"), Some(json!("{\"a\":1}")));

        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert_eq!(decode_body(&headers, b"{\"a\":1}"), Some(json!({"a": 1})));
        assert_eq!(decode_body(&headers, b"oops"), Some(json!("oops")));
    }

    #[test]
    fn test_defaults_yield_to_request_headers() {
        let client = TrafficLoggingClient::global()
            .with_common_header(
                HeaderName::from_static("x-client"),
                HeaderValue::from_static("default"),
            )
            .with_method_header(
                Method::POST,
                HeaderName::from_static("x-post"),
                HeaderValue::from_static("yes"),
            );

        let mut headers = RequestHeaders::default();
        headers
            .common
            .insert("x-client", HeaderValue::from_static("mine"));
        client.apply_defaults(&mut headers);

        let effective = headers.effective(&Method::POST);
        assert_eq!(effective["x-client"], "mine");
        assert_eq!(effective["x-post"], "yes");
    }
}
