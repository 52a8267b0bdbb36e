//! Configuration file watcher for hot reload.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::ConfigLoadError;
use crate::config::source::{ConfigSnapshot, ConfigSource};

/// Error type for file watch setup.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("config path {0} has no file name")]
    NoFileName(PathBuf),
    #[error("watch failed: {0}")]
    Notify(#[from] notify::Error),
}

/// A watcher that monitors the configuration file for changes.
///
/// The containing directory is watched rather than the file itself, so
/// editors that save by renaming a temp file over the original keep
/// triggering reloads.
pub struct ConfigWatcher {
    source: Arc<ConfigSource>,
}

impl ConfigWatcher {
    pub fn new(source: Arc<ConfigSource>) -> Self {
        Self { source }
    }

    /// Start watching. `on_reload` receives the outcome of every reload
    /// and runs on the watcher's thread.
    pub fn run<F>(self, on_reload: F) -> Result<Subscription, WatchError>
    where
        F: Fn(Result<ConfigSnapshot, ConfigLoadError>) + Send + 'static,
    {
        let path = self.source.path().to_path_buf();
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| WatchError::NoFileName(path.clone()))?
            .to_os_string();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let source = self.source.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if touches_file && (event.kind.is_modify() || event.kind.is_create()) {
                        tracing::info!(path = ?source.path(), "Config file change detected, reloading...");
                        on_reload(source.load());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(Subscription {
            path,
            watcher: Mutex::new(Some(watcher)),
        })
    }
}

/// Handle to a running watch. Closing it stops the watch.
pub struct Subscription {
    path: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Subscription {
    /// Stop watching. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let watcher = match self.watcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match watcher {
            Some(watcher) => {
                drop(watcher);
                tracing::info!(path = ?self.path, "Config watcher closed");
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.watcher.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logging.toml");
        std::fs::write(&path, "").unwrap();

        let source = Arc::new(ConfigSource::new(&path));
        let subscription = source.watch(|_: ConfigSnapshot| {}).unwrap();

        assert!(!subscription.is_closed());
        assert!(subscription.close());
        assert!(!subscription.close());
        assert!(subscription.is_closed());
    }

    #[test]
    fn test_path_without_file_name_is_rejected() {
        let source = Arc::new(ConfigSource::new("/"));
        assert!(matches!(source.watch(|_: ConfigSnapshot| {}), Err(WatchError::NoFileName(_))));
    }
}
