//! Effective HTTP traffic logging policy.
//!
//! # Responsibilities
//! - Turn the partial `httpClient` document into a complete policy
//! - Attach programmatic hooks (level, body and header callbacks)
//!
//! # Design Decisions
//! - Unset document fields fall back to the built-in policy leaf by leaf
//! - Resolved once per snapshot install, never per message
//! - Hooks win over the matching document field

use std::fmt;
use std::sync::Arc;

use crate::config::schema::{
    HeaderSetting, HttpClientDocument, RequestPolicyDocument, ResponsePolicyDocument,
};
use crate::http::message::HttpMessage;
use crate::observability::level::{Level, LevelSetting};

/// Result type returned by policy hooks.
pub type HookResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub type LevelCallback = Arc<dyn Fn(&HttpMessage<'_>) -> HookResult<Level> + Send + Sync>;
pub type BodyPredicate = Arc<dyn Fn(&HttpMessage<'_>) -> HookResult<bool> + Send + Sync>;
pub type HeaderCallback = Arc<dyn Fn(&HttpMessage<'_>) -> HookResult<HeaderSelector> + Send + Sync>;

/// How a message's level is chosen.
#[derive(Clone)]
pub enum LevelRule {
    Static(Level),
    /// By status code for responses, `info` for requests.
    Auto,
    Callback(LevelCallback),
}

impl From<LevelSetting> for LevelRule {
    fn from(setting: LevelSetting) -> Self {
        match setting {
            LevelSetting::Auto => LevelRule::Auto,
            LevelSetting::Static(level) => LevelRule::Static(level),
        }
    }
}

impl fmt::Debug for LevelRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelRule::Static(level) => write!(f, "Static({})", level),
            LevelRule::Auto => f.write_str("Auto"),
            LevelRule::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Levels for the `auto` response rule, by status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLevels {
    pub level2xx: Level,
    pub level3xx: Level,
    pub level4xx: Level,
    pub level5xx: Level,
}

impl StatusLevels {
    /// 1xx shares the 2xx level; anything past 4xx uses the 5xx level.
    pub fn for_status(&self, status: u16) -> Level {
        match status / 100 {
            1 | 2 => self.level2xx,
            3 => self.level3xx,
            4 => self.level4xx,
            _ => self.level5xx,
        }
    }
}

impl Default for StatusLevels {
    fn default() -> Self {
        Self {
            level2xx: Level::Info,
            level3xx: Level::Info,
            level4xx: Level::Error,
            level5xx: Level::Error,
        }
    }
}

/// Whether the body is logged.
#[derive(Clone)]
pub enum BodyRule {
    Off,
    On,
    Predicate(BodyPredicate),
}

impl From<bool> for BodyRule {
    fn from(enabled: bool) -> Self {
        if enabled {
            BodyRule::On
        } else {
            BodyRule::Off
        }
    }
}

impl fmt::Debug for BodyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyRule::Off => f.write_str("Off"),
            BodyRule::On => f.write_str("On"),
            BodyRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A static header selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSelector {
    None,
    All,
    Names(Vec<String>),
}

impl From<&HeaderSetting> for HeaderSelector {
    fn from(setting: &HeaderSetting) -> Self {
        match setting {
            HeaderSetting::Flag(false) => HeaderSelector::None,
            HeaderSetting::Flag(true) => HeaderSelector::All,
            HeaderSetting::Name(name) if name.eq_ignore_ascii_case("all") => HeaderSelector::All,
            HeaderSetting::Name(name) => HeaderSelector::Names(vec![name.clone()]),
            HeaderSetting::Names(names) if names.is_empty() => HeaderSelector::None,
            HeaderSetting::Names(names) => HeaderSelector::Names(names.clone()),
        }
    }
}

/// Which headers are logged.
#[derive(Clone)]
pub enum HeaderRule {
    Select(HeaderSelector),
    Callback(HeaderCallback),
}

impl fmt::Debug for HeaderRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderRule::Select(selector) => write!(f, "Select({:?})", selector),
            HeaderRule::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestPolicy {
    pub log_it: bool,
    pub level: LevelRule,
    pub method: bool,
    pub url: bool,
    pub body: BodyRule,
    pub headers: HeaderRule,
}

#[derive(Debug, Clone)]
pub struct ResponsePolicy {
    pub log_it: bool,
    pub level: LevelRule,
    pub status_levels: StatusLevels,
    pub method_and_path: bool,
    pub status_code: bool,
    pub body: BodyRule,
    pub headers: HeaderRule,
}

/// Callbacks for one message type.
#[derive(Clone, Default)]
pub struct PolicyHooks {
    pub level: Option<LevelCallback>,
    pub body: Option<BodyPredicate>,
    pub headers: Option<HeaderCallback>,
}

impl fmt::Debug for PolicyHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyHooks")
            .field("level", &self.level.is_some())
            .field("body", &self.body.is_some())
            .field("headers", &self.headers.is_some())
            .finish()
    }
}

/// Programmatic hooks applied on top of the configured policy.
///
/// ```ignore
/// let hooks = HttpPolicyHooks::default()
///     .response_level(|msg| Ok(if msg.status() == Some(404) { Level::Warn } else { Level::Info }));
/// pipeline.set_http_hooks(hooks);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpPolicyHooks {
    pub request: PolicyHooks,
    pub response: PolicyHooks,
}

impl HttpPolicyHooks {
    pub fn request_level<F>(mut self, f: F) -> Self
    where
        F: Fn(&HttpMessage<'_>) -> HookResult<Level> + Send + Sync + 'static,
    {
        self.request.level = Some(Arc::new(f));
        self
    }

    pub fn response_level<F>(mut self, f: F) -> Self
    where
        F: Fn(&HttpMessage<'_>) -> HookResult<Level> + Send + Sync + 'static,
    {
        self.response.level = Some(Arc::new(f));
        self
    }

    pub fn request_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&HttpMessage<'_>) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.request.body = Some(Arc::new(f));
        self
    }

    pub fn response_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&HttpMessage<'_>) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.response.body = Some(Arc::new(f));
        self
    }

    pub fn request_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(&HttpMessage<'_>) -> HookResult<HeaderSelector> + Send + Sync + 'static,
    {
        self.request.headers = Some(Arc::new(f));
        self
    }

    pub fn response_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(&HttpMessage<'_>) -> HookResult<HeaderSelector> + Send + Sync + 'static,
    {
        self.response.headers = Some(Arc::new(f));
        self
    }
}

/// Complete policy for both message types.
#[derive(Debug, Clone)]
pub struct HttpClientPolicy {
    pub request: RequestPolicy,
    pub response: ResponsePolicy,
}

impl HttpClientPolicy {
    /// Policy used for fields the document leaves unset.
    pub fn builtin() -> HttpClientDocument {
        HttpClientDocument {
            request: RequestPolicyDocument {
                log_it: Some(true),
                level: Some(LevelSetting::Static(Level::Info)),
                method: Some(true),
                url: Some(true),
                body: Some(false),
                headers: Some(HeaderSetting::Name("all".to_string())),
            },
            response: ResponsePolicyDocument {
                log_it: Some(true),
                level: Some(LevelSetting::Auto),
                level2xx: Some(Level::Info),
                level3xx: Some(Level::Info),
                level4xx: Some(Level::Error),
                level5xx: Some(Level::Error),
                method_and_path: Some(true),
                status_code: Some(true),
                body: Some(false),
                headers: Some(HeaderSetting::Name("all".to_string())),
            },
        }
    }

    /// Merge `document` over the built-in policy and apply `hooks`.
    pub fn resolve(document: &HttpClientDocument, hooks: &HttpPolicyHooks) -> Self {
        let builtin = Self::builtin();
        let defaults = StatusLevels::default();
        let req = &document.request;
        let res = &document.response;
        let base_req = builtin.request;
        let base_res = builtin.response;

        let request = RequestPolicy {
            log_it: req.log_it.or(base_req.log_it).unwrap_or(true),
            level: req
                .level
                .or(base_req.level)
                .map(LevelRule::from)
                .unwrap_or(LevelRule::Static(Level::Info)),
            method: req.method.or(base_req.method).unwrap_or(true),
            url: req.url.or(base_req.url).unwrap_or(true),
            body: BodyRule::from(req.body.or(base_req.body).unwrap_or(false)),
            headers: HeaderRule::Select(
                req.headers
                    .as_ref()
                    .or(base_req.headers.as_ref())
                    .map(HeaderSelector::from)
                    .unwrap_or(HeaderSelector::None),
            ),
        };

        let response = ResponsePolicy {
            log_it: res.log_it.or(base_res.log_it).unwrap_or(true),
            level: res
                .level
                .or(base_res.level)
                .map(LevelRule::from)
                .unwrap_or(LevelRule::Auto),
            status_levels: StatusLevels {
                level2xx: res.level2xx.or(base_res.level2xx).unwrap_or(defaults.level2xx),
                level3xx: res.level3xx.or(base_res.level3xx).unwrap_or(defaults.level3xx),
                level4xx: res.level4xx.or(base_res.level4xx).unwrap_or(defaults.level4xx),
                level5xx: res.level5xx.or(base_res.level5xx).unwrap_or(defaults.level5xx),
            },
            method_and_path: res
                .method_and_path
                .or(base_res.method_and_path)
                .unwrap_or(true),
            status_code: res.status_code.or(base_res.status_code).unwrap_or(true),
            body: BodyRule::from(res.body.or(base_res.body).unwrap_or(false)),
            headers: HeaderRule::Select(
                res.headers
                    .as_ref()
                    .or(base_res.headers.as_ref())
                    .map(HeaderSelector::from)
                    .unwrap_or(HeaderSelector::None),
            ),
        };

        let mut policy = Self { request, response };
        policy.apply_hooks(hooks);
        policy
    }

    fn apply_hooks(&mut self, hooks: &HttpPolicyHooks) {
        if let Some(level) = &hooks.request.level {
            self.request.level = LevelRule::Callback(level.clone());
        }
        if let Some(body) = &hooks.request.body {
            self.request.body = BodyRule::Predicate(body.clone());
        }
        if let Some(headers) = &hooks.request.headers {
            self.request.headers = HeaderRule::Callback(headers.clone());
        }
        if let Some(level) = &hooks.response.level {
            self.response.level = LevelRule::Callback(level.clone());
        }
        if let Some(body) = &hooks.response.body {
            self.response.body = BodyRule::Predicate(body.clone());
        }
        if let Some(headers) = &hooks.response.headers {
            self.response.headers = HeaderRule::Callback(headers.clone());
        }
    }
}

impl Default for HttpClientPolicy {
    fn default() -> Self {
        Self::resolve(&HttpClientDocument::default(), &HttpPolicyHooks::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_buckets() {
        let levels = StatusLevels {
            level2xx: Level::Debug,
            level3xx: Level::Info,
            level4xx: Level::Warn,
            level5xx: Level::Error,
        };
        assert_eq!(levels.for_status(100), Level::Debug);
        assert_eq!(levels.for_status(200), Level::Debug);
        assert_eq!(levels.for_status(299), Level::Debug);
        assert_eq!(levels.for_status(300), Level::Info);
        assert_eq!(levels.for_status(399), Level::Info);
        assert_eq!(levels.for_status(400), Level::Warn);
        assert_eq!(levels.for_status(499), Level::Warn);
        assert_eq!(levels.for_status(500), Level::Error);
        assert_eq!(levels.for_status(599), Level::Error);
        assert_eq!(levels.for_status(0), Level::Error);
    }

    #[test]
    fn test_empty_document_uses_builtin() {
        let policy = HttpClientPolicy::resolve(
            &HttpClientDocument {
                request: RequestPolicyDocument::default(),
                response: ResponsePolicyDocument::default(),
            },
            &HttpPolicyHooks::default(),
        );

        assert!(policy.request.log_it);
        assert!(policy.response.method_and_path);
        assert!(matches!(
            policy.request.headers,
            HeaderRule::Select(HeaderSelector::All)
        ));
        assert!(matches!(
            policy.response.headers,
            HeaderRule::Select(HeaderSelector::All)
        ));
    }

    #[test]
    fn test_document_overrides_builtin() {
        let policy = HttpClientPolicy::default();

        assert!(!policy.request.log_it);
        assert!(!policy.response.method_and_path);
        assert!(matches!(policy.response.level, LevelRule::Auto));
        assert!(matches!(
            policy.response.headers,
            HeaderRule::Select(HeaderSelector::All)
        ));
    }

    #[test]
    fn test_header_setting_forms() {
        assert_eq!(
            HeaderSelector::from(&HeaderSetting::Flag(true)),
            HeaderSelector::All
        );
        assert_eq!(
            HeaderSelector::from(&HeaderSetting::Name("ALL".into())),
            HeaderSelector::All
        );
        assert_eq!(
            HeaderSelector::from(&HeaderSetting::Name("x-id".into())),
            HeaderSelector::Names(vec!["x-id".into()])
        );
        assert_eq!(
            HeaderSelector::from(&HeaderSetting::Names(vec![])),
            HeaderSelector::None
        );
    }

    #[test]
    fn test_hooks_replace_rules() {
        let hooks = HttpPolicyHooks::default()
            .response_level(|_| Ok(Level::Fatal))
            .request_body(|_| Ok(true));
        let policy = HttpClientPolicy::resolve(&HttpClientDocument::default(), &hooks);

        assert!(matches!(policy.response.level, LevelRule::Callback(_)));
        assert!(matches!(policy.request.body, BodyRule::Predicate(_)));
        assert!(matches!(policy.request.level, LevelRule::Static(Level::Info)));
    }
}
