//! Log events handed to appenders.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::context::ExecutionContext;
use crate::observability::level::Level;

/// Where a log call was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
}

impl From<&'static std::panic::Location<'static>> for CallSite {
    fn from(location: &'static std::panic::Location<'static>) -> Self {
        Self {
            file: location.file().to_owned(),
            line: location.line(),
        }
    }
}

/// One enriched log event.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub category: Arc<str>,
    pub message: String,
    /// Context of the unit that emitted the event.
    pub context: Option<Arc<ExecutionContext>>,
    /// Only recorded when the category enables call stacks.
    pub location: Option<CallSite>,
}

impl LogEvent {
    pub fn request_id(&self) -> Option<&str> {
        self.context.as_deref().map(ExecutionContext::request_id)
    }
}
