//! Bridge from `tracing` events into the pipeline.
//!
//! # Responsibilities
//! - Route `tracing` events through category thresholds and appenders
//! - Derive categories from the event's source file, falling back to the
//!   module target (`a::b` becomes `a.b`)
//!
//! # Design Decisions
//! - Callsites register as `sometimes`; filtering is decided per event
//!   against the pipeline state in effect
//! - An `EnvFilter` from `RUST_LOG` may be stacked in front as a coarse gate

use std::fmt::{self, Write};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::callsite::Identifier;
use tracing::field::{Field, Visit};
use tracing::subscriber::Interest;
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::observability::event::CallSite;
use crate::observability::level::Level;
use crate::observability::pipeline::LogPipeline;

/// `tracing_subscriber` layer writing events to a [`LogPipeline`].
pub struct PipelineLayer {
    pipeline: Arc<LogPipeline>,
    categories: DashMap<Identifier, Arc<str>>,
}

impl PipelineLayer {
    pub fn new(pipeline: Arc<LogPipeline>) -> Self {
        Self {
            pipeline,
            categories: DashMap::new(),
        }
    }

    fn category(&self, metadata: &'static Metadata<'static>) -> Arc<str> {
        let id = metadata.callsite();
        if let Some(hit) = self.categories.get(&id) {
            return hit.clone();
        }

        let namer = self.pipeline.namer();
        let category: Arc<str> = match metadata.file() {
            Some(file) if namer.is_under_root(file) => Arc::from(namer.category_for(file)),
            _ => Arc::from(metadata.target().replace("::", ".")),
        };
        self.categories.insert(id, category.clone());
        category
    }
}

impl fmt::Debug for PipelineLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLayer")
            .field("callsites", &self.categories.len())
            .finish()
    }
}

impl<S: Subscriber> Layer<S> for PipelineLayer {
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let category = self.category(metadata);
        let level = Level::from(metadata.level());
        if !self.pipeline.is_enabled(&category, level) {
            return;
        }

        let location = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => Some(CallSite {
                file: file.to_owned(),
                line,
            }),
            _ => None,
        };
        self.pipeline.emit(&category, level, location, || {
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            visitor.finish()
        });
    }
}

/// Collects the `message` field followed by `key=value` pairs.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn separator(&mut self) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.separator();
            let _ = write!(self.fields, "{}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.separator();
            let _ = write!(self.fields, "{}={:?}", field.name(), value);
        }
    }
}

/// Install the pipeline as the global `tracing` subscriber.
///
/// `RUST_LOG`, when set, is applied as an additional filter.
pub fn install(pipeline: Arc<LogPipeline>) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().ok();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(PipelineLayer::new(pipeline))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use crate::config::source::ConfigSnapshot;

    fn pipeline() -> Arc<LogPipeline> {
        let pipeline = Arc::new(LogPipeline::with_defaults());
        let config = parse_config(
            r#"
            [appenders.memory]
            type = "recording"
            layout = { type = "pattern", pattern = "%c %p %m" }

            [categories.default]
            level = "info"
            appenders = ["memory"]

            [categories.observability]
            level = "warn"
            appenders = ["memory"]
            "#,
        )
        .unwrap();
        pipeline
            .apply(ConfigSnapshot {
                version: 1,
                origin: None,
                config,
            })
            .unwrap();
        pipeline
    }

    #[test]
    fn test_events_routed_by_file_category() {
        let pipeline = pipeline();
        let subscriber = tracing_subscriber::registry().with(PipelineLayer::new(pipeline.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("dropped by threshold");
            tracing::warn!(attempt = 3, "kept");
        });

        let lines = pipeline.recording("memory").unwrap().lines();
        assert_eq!(lines, vec!["observability.bridge WARN kept attempt=3"]);
    }

    #[test]
    fn test_visitor_without_message() {
        let mut visitor = MessageVisitor::default();
        visitor.message.clear();
        visitor.fields.push_str("a=1");
        assert_eq!(visitor.finish(), "a=1");
    }
}
