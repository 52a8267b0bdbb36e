//! Configuration source and versioned snapshots.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::loader::{load_config, ConfigLoadError};
use crate::config::schema::LoggingConfig;
use crate::config::watcher::{ConfigWatcher, Subscription, WatchError};

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV_VAR: &str = "SCOPELOG_CONFIG";

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/logging.toml";

/// An immutable, fully-resolved configuration in effect at a point in time.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Strictly increasing per source; 0 is the embedded default.
    pub version: u64,

    /// File the snapshot was loaded from.
    pub origin: Option<PathBuf>,

    pub config: LoggingConfig,
}

impl ConfigSnapshot {
    /// Snapshot of the embedded default document.
    pub fn defaults() -> Self {
        Self {
            version: 0,
            origin: None,
            config: LoggingConfig::default(),
        }
    }
}

/// A configuration file that can be loaded and watched.
#[derive(Debug)]
pub struct ConfigSource {
    path: PathBuf,
    version: AtomicU64,
}

impl ConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: AtomicU64::new(0),
        }
    }

    /// Source at `$SCOPELOG_CONFIG`, or `config/logging.toml` under the
    /// working directory.
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::new(path),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                Self::new(cwd.join(DEFAULT_CONFIG_PATH))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, merge and validate the document into a new snapshot.
    pub fn load(&self) -> Result<ConfigSnapshot, ConfigLoadError> {
        let config = load_config(&self.path)?;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(ConfigSnapshot {
            version,
            origin: Some(self.path.clone()),
            config,
        })
    }

    /// Watch the file and hand every successfully reloaded snapshot to
    /// `on_change`. Failed reloads are logged and skipped.
    pub fn watch<F>(self: &Arc<Self>, on_change: F) -> Result<Subscription, WatchError>
    where
        F: Fn(ConfigSnapshot) + Send + 'static,
    {
        self.watch_results(move |result| match result {
            Ok(snapshot) => on_change(snapshot),
            Err(e) => tracing::error!(
                "Failed to reload config: {}. Keeping current configuration.",
                e
            ),
        })
    }

    /// Like [`watch`](Self::watch), but failed reloads are handed to the
    /// callback as well.
    pub fn watch_results<F>(self: &Arc<Self>, on_reload: F) -> Result<Subscription, WatchError>
    where
        F: Fn(Result<ConfigSnapshot, ConfigLoadError>) + Send + 'static,
    {
        ConfigWatcher::new(self.clone()).run(on_reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_versions_increase() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[categories.default]\nlevel = \"warn\"\nappenders = [\"consoleAppender\"]").unwrap();

        let source = ConfigSource::new(file.path());
        let first = source.load().unwrap();
        let second = source.load().unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.origin.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_failed_load_does_not_bump_version() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not = [valid").unwrap();

        let source = ConfigSource::new(file.path());
        assert!(source.load().is_err());
        assert_eq!(source.version.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_defaults_snapshot() {
        let snapshot = ConfigSnapshot::defaults();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.origin.is_none());
    }
}
