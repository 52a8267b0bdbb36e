//! HTTP traffic subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     request.rs (RequestContextLayer: request ID, context scope)
//!     → middleware/access_log.rs (one line per request)
//!     → application handlers
//!
//! Outbound:
//!     client.rs (TrafficLoggingClient)
//!     → traffic.rs (evaluate policy.rs against message.rs types)
//!     → reqwest
//! ```

pub mod client;
pub mod message;
pub mod middleware;
pub mod policy;
pub mod request;
pub mod traffic;

pub use client::{ClientError, TrafficLoggingClient};
pub use message::{HttpMessage, InboundResponse, MessageType, OutboundRequest, RequestHeaders};
pub use policy::{HttpClientPolicy, HttpPolicyHooks};
pub use request::{RequestContextLayer, RequestId, RequestIdExt, X_REQUEST_ID};
pub use traffic::{evaluate, Evaluation, HttpTrafficLogger, TrafficLogRenderError};
