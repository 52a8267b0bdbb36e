//! Log sinks.
//!
//! # Responsibilities
//! - Render events through the appender's layout
//! - Write rendered lines to stdout, stderr, a file or memory
//!
//! # Design Decisions
//! - Write failures are swallowed; logging never fails the caller
//! - `close` only flushes, the handle is released when the last
//!   `Arc` to the appender drops

use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::loader::ConfigLoadError;
use crate::config::schema::AppenderConfig;
use crate::observability::event::LogEvent;
use crate::observability::layout::Layout;
use crate::observability::level::Level;

/// A configured sink.
pub trait Appender: Send + Sync + fmt::Debug {
    fn append(&self, event: &LogEvent);

    fn flush(&self) {}

    /// Called once after the appender has been replaced by a reload.
    fn close(&self) {
        self.flush();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes to standard output.
#[derive(Debug)]
pub struct ConsoleAppender {
    layout: Layout,
}

impl ConsoleAppender {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }
}

impl Appender for ConsoleAppender {
    fn append(&self, event: &LogEvent) {
        let line = self.layout.render(event);
        let _ = writeln!(io::stdout().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Writes to standard error.
#[derive(Debug)]
pub struct StderrAppender {
    layout: Layout,
}

impl StderrAppender {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }
}

impl Appender for StderrAppender {
    fn append(&self, event: &LogEvent) {
        let line = self.layout.render(event);
        let _ = writeln!(io::stderr().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Appends to a file, creating parent directories on open.
#[derive(Debug)]
pub struct FileAppender {
    path: PathBuf,
    layout: Layout,
    writer: Mutex<BufWriter<File>>,
}

impl FileAppender {
    pub fn open(path: &Path, layout: Layout) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Appender for FileAppender {
    fn append(&self, event: &LogEvent) {
        let line = self.layout.render(event);
        let _ = writeln!(lock(&self.writer), "{}", line);
    }

    fn flush(&self) {
        let _ = lock(&self.writer).flush();
    }
}

/// An event captured by a [`RecordingAppender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub level: Level,
    pub category: String,
    pub message: String,
    pub request_id: Option<String>,
    /// The rendered line.
    pub line: String,
}

/// Keeps the most recent events in memory.
#[derive(Debug)]
pub struct RecordingAppender {
    layout: Layout,
    capacity: usize,
    events: Mutex<VecDeque<RecordedEvent>>,
}

impl RecordingAppender {
    pub fn new(layout: Layout, capacity: usize) -> Self {
        Self {
            layout,
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Recorded events, oldest first.
    pub fn replay(&self) -> Vec<RecordedEvent> {
        lock(&self.events).iter().cloned().collect()
    }

    /// Rendered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.line.clone()).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl Appender for RecordingAppender {
    fn append(&self, event: &LogEvent) {
        let recorded = RecordedEvent {
            level: event.level,
            category: event.category.to_string(),
            message: event.message.clone(),
            request_id: event.request_id().map(str::to_owned),
            line: self.layout.render(event),
        };

        let mut events = lock(&self.events);
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(recorded);
    }
}

/// A freshly built appender, with the recording handle kept separately
/// so the pipeline can expose it by name.
pub struct BuiltAppender {
    pub appender: Arc<dyn Appender>,
    pub recording: Option<Arc<RecordingAppender>>,
}

/// Build the appender described by `config`.
pub fn build_appender(name: &str, config: &AppenderConfig) -> Result<BuiltAppender, ConfigLoadError> {
    let layout = Layout::from_config(config.layout())
        .map_err(|e| ConfigLoadError::Shape(format!("appender '{}': {}", name, e)))?;

    let built = match config {
        AppenderConfig::Console { .. } => BuiltAppender {
            appender: Arc::new(ConsoleAppender::new(layout)),
            recording: None,
        },
        AppenderConfig::Stderr { .. } => BuiltAppender {
            appender: Arc::new(StderrAppender::new(layout)),
            recording: None,
        },
        AppenderConfig::File { filename, .. } => {
            let file = FileAppender::open(filename, layout).map_err(|source| {
                ConfigLoadError::Appender {
                    name: name.to_owned(),
                    source,
                }
            })?;
            BuiltAppender {
                appender: Arc::new(file),
                recording: None,
            }
        }
        AppenderConfig::Recording { capacity, .. } => {
            let recording = Arc::new(RecordingAppender::new(layout, *capacity));
            BuiltAppender {
                appender: recording.clone(),
                recording: Some(recording),
            }
        }
    };
    Ok(built)
}
