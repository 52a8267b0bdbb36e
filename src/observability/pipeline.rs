//! The logging pipeline: category resolution, appenders and hot reload.
//!
//! # Responsibilities
//! - Hold the state built from the snapshot in effect
//! - Resolve a category to its threshold and appenders per call
//! - Swap in a new snapshot without losing or duplicating output
//!
//! # Design Decisions
//! - The whole state lives behind one `ArcSwap`; a reload publishes it with
//!   a single store, so readers see either the old or the new state
//! - Resolutions are cached inside the state they came from and die with it
//! - A failed reload keeps the state in effect and is recorded

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use arc_swap::ArcSwap;
use chrono::Local;
use dashmap::DashMap;

use crate::config::loader::ConfigLoadError;
use crate::config::schema::DEFAULT_CATEGORY;
use crate::config::source::{ConfigSnapshot, ConfigSource};
use crate::config::watcher::{Subscription, WatchError};
use crate::context;
use crate::http::middleware::access_log::AccessLogPolicy;
use crate::http::policy::{HttpClientPolicy, HttpPolicyHooks};
use crate::observability::appender::{build_appender, Appender, RecordingAppender};
use crate::observability::category::{CategoryNamer, CATEGORY_SEPARATOR};
use crate::observability::event::{CallSite, LogEvent};
use crate::observability::level::Level;
use crate::observability::logger::LoggerHandle;

/// Category the pipeline reports its own reload failures under.
pub const LOADER_CATEGORY: &str = "config.loader";

/// Threshold and sinks a category resolved to.
#[derive(Debug)]
pub struct ResolvedCategory {
    /// The configured category that matched.
    pub matched: String,
    pub level: Level,
    pub appenders: Vec<Arc<dyn Appender>>,
    pub enable_call_stack: bool,
}

impl ResolvedCategory {
    fn silent() -> Self {
        Self {
            matched: DEFAULT_CATEGORY.to_string(),
            level: Level::Off,
            appenders: Vec::new(),
            enable_call_stack: false,
        }
    }
}

/// Everything derived from one snapshot.
pub struct PipelineState {
    snapshot: Arc<ConfigSnapshot>,
    appenders: BTreeMap<String, Arc<dyn Appender>>,
    recordings: BTreeMap<String, Arc<RecordingAppender>>,
    http_policy: Arc<HttpClientPolicy>,
    access_log: Arc<AccessLogPolicy>,
    resolved: DashMap<String, Arc<ResolvedCategory>>,
}

impl PipelineState {
    /// Open every appender and resolve the policies for `snapshot`.
    pub fn build(snapshot: ConfigSnapshot, hooks: &HttpPolicyHooks) -> Result<Self, ConfigLoadError> {
        let mut appenders = BTreeMap::new();
        let mut recordings = BTreeMap::new();
        for (name, config) in &snapshot.config.appenders {
            let built = build_appender(name, config)?;
            if let Some(recording) = built.recording {
                recordings.insert(name.clone(), recording);
            }
            appenders.insert(name.clone(), built.appender);
        }

        let http_policy = HttpClientPolicy::resolve(&snapshot.config.http_client, hooks);
        let access_log = AccessLogPolicy::from_config(&snapshot.config.express_middleware_options)?;

        Ok(Self {
            snapshot: Arc::new(snapshot),
            appenders,
            recordings,
            http_policy: Arc::new(http_policy),
            access_log: Arc::new(access_log),
            resolved: DashMap::new(),
        })
    }

    /// Same snapshot and appenders, policy rebuilt with `hooks`.
    fn with_hooks(&self, hooks: &HttpPolicyHooks) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            appenders: self.appenders.clone(),
            recordings: self.recordings.clone(),
            http_policy: Arc::new(HttpClientPolicy::resolve(
                &self.snapshot.config.http_client,
                hooks,
            )),
            access_log: self.access_log.clone(),
            resolved: DashMap::new(),
        }
    }

    /// Longest configured dotted prefix of `category`, else `default`.
    pub fn resolve(&self, category: &str) -> Arc<ResolvedCategory> {
        if let Some(hit) = self.resolved.get(category) {
            return hit.clone();
        }

        let categories = &self.snapshot.config.categories;
        let mut candidate = category;
        let matched = loop {
            if let Some(config) = categories.get(candidate) {
                break Some((candidate, config));
            }
            match candidate.rfind(CATEGORY_SEPARATOR) {
                Some(idx) => candidate = &candidate[..idx],
                None => break None,
            }
        };
        let matched = matched.or_else(|| {
            categories
                .get_key_value(DEFAULT_CATEGORY)
                .map(|(name, config)| (name.as_str(), config))
        });

        let resolved = match matched {
            Some((name, config)) => ResolvedCategory {
                matched: name.to_string(),
                level: config.level,
                appenders: config
                    .appenders
                    .iter()
                    .filter_map(|a| self.appenders.get(a).cloned())
                    .collect(),
                enable_call_stack: config.enable_call_stack,
            },
            None => ResolvedCategory::silent(),
        };

        let resolved = Arc::new(resolved);
        self.resolved
            .insert(category.to_string(), resolved.clone());
        resolved
    }

    pub fn snapshot(&self) -> &Arc<ConfigSnapshot> {
        &self.snapshot
    }

    pub fn flush(&self) {
        for appender in self.appenders.values() {
            appender.flush();
        }
    }

    pub fn close(&self) {
        for appender in self.appenders.values() {
            appender.close();
        }
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineState")
            .field("version", &self.snapshot.version)
            .field("appenders", &self.appenders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Hot-reloadable logging pipeline.
pub struct LogPipeline {
    state: ArcSwap<PipelineState>,
    namer: CategoryNamer,
    /// Also serializes state updates.
    hooks: Mutex<HttpPolicyHooks>,
    source: Mutex<Option<Arc<ConfigSource>>>,
    last_reload_error: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LogPipeline {
    /// Pipeline running on the embedded default document.
    pub fn with_defaults() -> Self {
        Self::with_namer(CategoryNamer::default())
    }

    pub fn with_namer(namer: CategoryNamer) -> Self {
        let hooks = HttpPolicyHooks::default();
        let state = match PipelineState::build(ConfigSnapshot::defaults(), &hooks) {
            Ok(state) => state,
            Err(e) => {
                eprintln!("scopelog: default logging config unusable: {}", e);
                let mut snapshot = ConfigSnapshot::defaults();
                snapshot.config.appenders.clear();
                PipelineState {
                    snapshot: Arc::new(snapshot),
                    appenders: BTreeMap::new(),
                    recordings: BTreeMap::new(),
                    http_policy: Arc::new(HttpClientPolicy::default()),
                    access_log: Arc::new(AccessLogPolicy::default()),
                    resolved: DashMap::new(),
                }
            }
        };

        Self {
            state: ArcSwap::from_pointee(state),
            namer,
            hooks: Mutex::new(hooks),
            source: Mutex::new(None),
            last_reload_error: Mutex::new(None),
        }
    }

    /// Process-wide pipeline. Starts on the embedded default document,
    /// with categories rooted per [`CategoryNamer::from_env`].
    pub fn global() -> Arc<LogPipeline> {
        static GLOBAL: OnceLock<Arc<LogPipeline>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(LogPipeline::with_namer(CategoryNamer::from_env())))
            .clone()
    }

    /// Build a pipeline from the first load of `source`.
    pub fn from_source(source: Arc<ConfigSource>) -> Result<Arc<Self>, ConfigLoadError> {
        let pipeline = Arc::new(Self::with_defaults());
        pipeline.configure(source)?;
        Ok(pipeline)
    }

    /// Load `source` and make it the pipeline's source for reloads.
    ///
    /// Unlike [`reload`](Self::reload), a failure here is returned without
    /// being recorded: a first load that fails is fatal to the caller.
    pub fn configure(&self, source: Arc<ConfigSource>) -> Result<u64, ConfigLoadError> {
        let snapshot = source.load()?;
        *lock(&self.source) = Some(source);
        self.apply(snapshot)
    }

    /// Reload from the configured source.
    ///
    /// On failure the state in effect is kept and the error is recorded
    /// and logged under `config.loader`.
    pub fn reload(&self) -> Result<u64, ConfigLoadError> {
        let source = lock(&self.source).clone();
        let Some(source) = source else {
            return Ok(self.version());
        };

        let result = source.load().and_then(|snapshot| self.apply(snapshot));
        if let Err(e) = &result {
            self.record_failure(e);
        }
        result
    }

    /// Install `snapshot`. The new state is built before anything changes;
    /// old appenders are flushed before the swap and closed after it.
    pub fn apply(&self, snapshot: ConfigSnapshot) -> Result<u64, ConfigLoadError> {
        let hooks = lock(&self.hooks);
        let version = snapshot.version;
        let next = PipelineState::build(snapshot, &hooks)?;

        let current = self.state.load_full();
        current.flush();
        self.state.store(Arc::new(next));
        current.close();
        drop(hooks);

        *lock(&self.last_reload_error) = None;
        tracing::info!(version, "Logging configuration applied");
        Ok(version)
    }

    /// Watch the configured source and apply every change.
    pub fn watch(self: &Arc<Self>) -> Result<Option<Subscription>, WatchError> {
        let source = lock(&self.source).clone();
        let Some(source) = source else {
            return Ok(None);
        };

        let pipeline = Arc::downgrade(self);
        let subscription = source.watch_results(move |result| {
            let Some(pipeline) = pipeline.upgrade() else {
                return;
            };
            if let Err(e) = result.and_then(|snapshot| pipeline.apply(snapshot)) {
                pipeline.record_failure(&e);
            }
        })?;
        Ok(Some(subscription))
    }

    fn record_failure(&self, error: &ConfigLoadError) {
        let message = error.to_string();
        *lock(&self.last_reload_error) = Some(message.clone());
        self.emit(
            LOADER_CATEGORY,
            Level::Error,
            None,
            || format!("Failed to reload config: {}. Keeping current configuration.", message),
        );
    }

    /// Last reload failure, cleared by the next successful apply.
    pub fn last_reload_error(&self) -> Option<String> {
        lock(&self.last_reload_error).clone()
    }

    /// Replace the programmatic policy hooks and rebuild the policy.
    pub fn set_http_hooks(&self, hooks: HttpPolicyHooks) {
        let mut current_hooks = lock(&self.hooks);
        let next = self.state.load().with_hooks(&hooks);
        self.state.store(Arc::new(next));
        *current_hooks = hooks;
    }

    /// Logger for a source location such as `file!()`.
    pub fn logger(self: &Arc<Self>, location: &str) -> LoggerHandle {
        LoggerHandle::new(self.namer.category_for(location), self.clone())
    }

    /// Logger for an explicit category name.
    pub fn category_logger(self: &Arc<Self>, category: impl Into<String>) -> LoggerHandle {
        LoggerHandle::new(category.into(), self.clone())
    }

    pub fn is_enabled(&self, category: &str, level: Level) -> bool {
        level.passes(self.state.load().resolve(category).level)
    }

    /// Emit one event. `message` runs only if `level` passes the
    /// category's threshold.
    pub fn emit<F>(&self, category: &str, level: Level, location: Option<CallSite>, message: F)
    where
        F: FnOnce() -> String,
    {
        let state = self.state.load();
        let resolved = state.resolve(category);
        if !level.passes(resolved.level) || resolved.appenders.is_empty() {
            return;
        }

        let event = LogEvent {
            timestamp: Local::now(),
            level,
            category: Arc::from(category),
            message: message(),
            context: context::current(),
            location: location.filter(|_| resolved.enable_call_stack),
        };
        for appender in &resolved.appenders {
            appender.append(&event);
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.state.load().snapshot.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.load().snapshot.version
    }

    pub fn http_policy(&self) -> Arc<HttpClientPolicy> {
        self.state.load().http_policy.clone()
    }

    pub fn access_log(&self) -> Arc<AccessLogPolicy> {
        self.state.load().access_log.clone()
    }

    /// Recording appender of the state in effect.
    pub fn recording(&self, name: &str) -> Option<Arc<RecordingAppender>> {
        self.state.load().recordings.get(name).cloned()
    }

    pub fn namer(&self) -> &CategoryNamer {
        &self.namer
    }

    pub fn flush(&self) {
        self.state.load().flush();
    }
}

impl fmt::Debug for LogPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPipeline")
            .field("state", &*self.state.load())
            .field("namer", &self.namer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;

    const RECORDING: &str = r#"
        [appenders.memory]
        type = "recording"
        layout = { type = "messagePassThrough" }

        [categories.default]
        level = "info"
        appenders = ["memory"]

        [categories.http]
        level = "warn"
        appenders = ["memory"]

        [categories."http.traffic"]
        level = "debug"
        appenders = ["memory"]
    "#;

    fn snapshot(version: u64, document: &str) -> ConfigSnapshot {
        ConfigSnapshot {
            version,
            origin: None,
            config: parse_config(document).unwrap(),
        }
    }

    fn pipeline() -> LogPipeline {
        let pipeline = LogPipeline::with_defaults();
        pipeline.apply(snapshot(1, RECORDING)).unwrap();
        pipeline
    }

    #[test]
    fn test_longest_prefix_wins() {
        let pipeline = pipeline();
        let state = pipeline.state.load();

        assert_eq!(state.resolve("http.traffic.client").matched, "http.traffic");
        assert_eq!(state.resolve("http.access").matched, "http");
        assert_eq!(state.resolve("httpd").matched, "default");
        assert_eq!(state.resolve("config.loader").level, Level::Info);
    }

    #[test]
    fn test_threshold_applies() {
        let pipeline = pipeline();
        pipeline.emit("http.access", Level::Info, None, || "dropped".into());
        pipeline.emit("http.access", Level::Warn, None, || "kept".into());

        let lines = pipeline.recording("memory").unwrap().lines();
        assert_eq!(lines, vec!["kept"]);
    }

    #[test]
    fn test_lazy_message_not_built_below_threshold() {
        let pipeline = pipeline();
        pipeline.emit("http", Level::Debug, None, || panic!("must not run"));
        assert!(!pipeline.is_enabled("http", Level::Debug));
        assert!(pipeline.is_enabled("http.traffic", Level::Debug));
    }

    #[test]
    fn test_apply_swaps_thresholds() {
        let pipeline = pipeline();
        assert!(!pipeline.is_enabled("app", Level::Debug));

        pipeline
            .apply(snapshot(2, &RECORDING.replacen("level = \"info\"", "level = \"debug\"", 1)))
            .unwrap();
        assert!(pipeline.is_enabled("app", Level::Debug));
        assert_eq!(pipeline.version(), 2);
    }

    #[test]
    fn test_failed_apply_keeps_state() {
        let pipeline = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let document = format!(
            "{}\n[appenders.file]\ntype = \"file\"\nfilename = {:?}\n",
            RECORDING,
            blocker.join("app.log")
        );
        assert!(pipeline.apply(snapshot(2, &document)).is_err());
        assert_eq!(pipeline.version(), 1);
        assert!(pipeline.recording("memory").is_some());
    }

    #[test]
    fn test_call_site_only_with_call_stack() {
        let pipeline = LogPipeline::with_defaults();
        let document = RECORDING
            .replace("messagePassThrough", "pattern\", pattern = \"%c:%l %m")
            .replacen("appenders = [\"memory\"]", "appenders = [\"memory\"]\nenableCallStack = true", 1);
        pipeline.apply(snapshot(1, &document)).unwrap();

        let site = || CallSite {
            file: "src/app.rs".into(),
            line: 7,
        };
        pipeline.emit("app", Level::Info, Some(site()), || "with".into());
        pipeline.emit("http", Level::Warn, Some(site()), || "without".into());

        let lines = pipeline.recording("memory").unwrap().lines();
        assert_eq!(lines, vec!["app:7 with", "http: without"]);
    }

    #[test]
    fn test_reload_without_source_is_noop() {
        let pipeline = pipeline();
        assert_eq!(pipeline.reload().unwrap(), 1);
        assert!(pipeline.last_reload_error().is_none());
    }
}
