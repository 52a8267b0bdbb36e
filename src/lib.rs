//! Request-scoped context propagation and a hot-reloadable, category-based
//! logging pipeline with declarative HTTP traffic logging.
//!
//! # Architecture Overview
//!
//! ```text
//!   inbound request
//!        │
//!        ▼
//!   http::request (RequestContextLayer) ──▶ context::scope ──▶ context::spawn ...
//!        │                                         │
//!        ▼                                         ▼ context::current()
//!   http::middleware::access_log ──┐     observability (LoggerHandle, tracing bridge)
//!   http::client ──▶ http::traffic ┼──▶  pipeline state (ArcSwap) ──▶ appenders
//!                                  │            ▲
//!                                  │            │ apply(snapshot)
//!                                  └── config (source, loader, watcher)
//! ```
//!
//! # Getting started
//!
//! ```ignore
//! let subscription = scopelog::init()?;
//! let log = scopelog::logger!();
//! log.info("service started");
//! ```

pub mod config;
pub mod context;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::{ConfigSnapshot, ConfigSource, LoggingConfig};
pub use context::ExecutionContext;
pub use http::{HttpTrafficLogger, RequestContextLayer, TrafficLoggingClient};
pub use lifecycle::Shutdown;
pub use observability::{get_logger, init, Level, LogPipeline, LoggerHandle};
