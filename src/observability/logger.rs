//! Named logger handles.

use std::fmt::{self, Display};
use std::panic::Location;
use std::sync::Arc;

use crate::observability::event::CallSite;
use crate::observability::level::Level;
use crate::observability::pipeline::LogPipeline;

/// A logger bound to one category.
///
/// Handles are cheap to clone and never cache configuration: threshold and
/// appenders are looked up against the pipeline's current state on every
/// call, so a reload applies to existing handles immediately.
#[derive(Clone)]
pub struct LoggerHandle {
    category: Arc<str>,
    pipeline: Arc<LogPipeline>,
}

impl LoggerHandle {
    pub(crate) fn new(category: String, pipeline: Arc<LogPipeline>) -> Self {
        Self {
            category: Arc::from(category),
            pipeline,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.pipeline.is_enabled(&self.category, level)
    }

    #[track_caller]
    pub fn log(&self, level: Level, message: impl Display) {
        let location = Location::caller();
        self.pipeline
            .emit(&self.category, level, Some(CallSite::from(location)), || {
                message.to_string()
            });
    }

    /// Like [`log`](Self::log), but `producer` only runs if `level` passes.
    #[track_caller]
    pub fn log_lazy<F>(&self, level: Level, producer: F)
    where
        F: FnOnce() -> String,
    {
        let location = Location::caller();
        self.pipeline
            .emit(&self.category, level, Some(CallSite::from(location)), producer);
    }

    #[track_caller]
    pub fn trace(&self, message: impl Display) {
        self.log(Level::Trace, message);
    }

    #[track_caller]
    pub fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: impl Display) {
        self.log(Level::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Display) {
        self.log(Level::Warn, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl Display) {
        self.log(Level::Error, message);
    }

    #[track_caller]
    pub fn fatal(&self, message: impl Display) {
        self.log(Level::Fatal, message);
    }
}

impl fmt::Debug for LoggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerHandle")
            .field("category", &self.category)
            .finish()
    }
}
