//! Structured logging subsystem.
//!
//! # Data Flow
//! ```text
//! get_logger(file!())
//!     → category.rs (source path → dotted category)
//!     → logger.rs (LoggerHandle bound to the category)
//!
//! LoggerHandle::info(..) / tracing::info!(..) via bridge.rs
//!     → pipeline.rs (resolve category against the state in effect)
//!     → threshold check (level.rs)
//!     → event.rs (enrich with context::current())
//!     → appender.rs (render through layout.rs, write)
//! ```
//!
//! # Design Decisions
//! - Category resolution happens per call; handles never cache config
//! - Reload swaps the whole pipeline state at once
//! - Log output never fails the caller

pub mod appender;
pub mod bridge;
pub mod category;
pub mod event;
pub mod layout;
pub mod level;
pub mod logger;
pub mod pipeline;

use std::sync::Arc;

use crate::config::loader::ConfigLoadError;
use crate::config::source::ConfigSource;
use crate::config::watcher::Subscription;
use crate::lifecycle::{close_on_exit, Shutdown};

pub use category::CategoryNamer;
pub use level::{Level, LevelSetting};
pub use logger::LoggerHandle;
pub use pipeline::LogPipeline;

/// Logger for a source location on the global pipeline.
pub fn get_logger(location: &str) -> LoggerHandle {
    LogPipeline::global().logger(location)
}

/// Load the configuration named by the environment into the global
/// pipeline and start watching it.
///
/// The watch is closed on panics and, when called inside a Tokio runtime,
/// on SIGINT, SIGTERM, SIGUSR1 and SIGUSR2. A failed first load is
/// returned. A watch that cannot be started is logged and leaves the
/// pipeline on the loaded snapshot.
pub fn init() -> Result<Option<Arc<Subscription>>, ConfigLoadError> {
    let pipeline = LogPipeline::global();
    let source = Arc::new(ConfigSource::from_env());
    pipeline.configure(source)?;

    match pipeline.watch() {
        Ok(Some(subscription)) => {
            let subscription = Arc::new(subscription);
            close_on_exit(subscription.clone(), Shutdown::new());
            Ok(Some(subscription))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            tracing::warn!("Config watcher unavailable: {}. Hot reload disabled.", e);
            Ok(None)
        }
    }
}

/// Logger for the calling file on the global pipeline.
#[macro_export]
macro_rules! logger {
    () => {
        $crate::observability::get_logger(file!())
    };
}
