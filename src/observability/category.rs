//! Source location → category name.
//!
//! # Responsibilities
//! - Strip the file extension
//! - Drop the application-root prefix
//! - Collapse `index`/`mod` files into their directory
//! - Join the remaining segments with `.`
//!
//! # Design Decisions
//! - Default root is `src`, which matches `file!()` paths of a standalone
//!   crate. In a workspace `file!()` yields `crates/<name>/src/...`; set
//!   `SCOPELOG_SOURCE_ROOT` (or use [`CategoryNamer::new`]) to that root
//! - Locations outside the root pass through unchanged
//! - A root-level sentinel file keeps its own name

/// Separator used in category names.
pub const CATEGORY_SEPARATOR: &str = ".";

/// Environment variable overriding the application root.
pub const SOURCE_ROOT_ENV_VAR: &str = "SCOPELOG_SOURCE_ROOT";

/// File stems that name their containing directory.
pub const DEFAULT_SENTINELS: &[&str] = &["index", "mod"];

/// Maps physical source locations to hierarchical category names.
#[derive(Debug, Clone)]
pub struct CategoryNamer {
    root: Vec<String>,
    sentinels: Vec<String>,
}

impl Default for CategoryNamer {
    fn default() -> Self {
        Self::new("src")
    }
}

impl CategoryNamer {
    /// Create a namer for the given application root.
    pub fn new(root: impl AsRef<str>) -> Self {
        Self {
            root: segments(root.as_ref()),
            sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Namer rooted at `$SCOPELOG_SOURCE_ROOT`, else `src`.
    pub fn from_env() -> Self {
        Self::from_root_setting(std::env::var(SOURCE_ROOT_ENV_VAR).ok())
    }

    fn from_root_setting(root: Option<String>) -> Self {
        match root.filter(|r| !r.trim().is_empty()) {
            Some(root) => Self::new(root),
            None => Self::default(),
        }
    }

    /// Replace the set of directory-naming file stems.
    pub fn with_sentinels<I, S>(mut self, sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sentinels = sentinels.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `location` lies under the application root.
    pub fn is_under_root(&self, location: &str) -> bool {
        let parts = segments(location);
        parts.len() > self.root.len() && parts.starts_with(&self.root)
    }

    /// Derive the category name for `location`.
    pub fn category_for(&self, location: &str) -> String {
        let parts = segments(location);
        if parts.len() <= self.root.len() || !parts.starts_with(&self.root) {
            return location.to_owned();
        }

        let mut relative: Vec<&str> = parts[self.root.len()..].iter().map(String::as_str).collect();
        if let Some(last) = relative.last_mut() {
            *last = strip_extension(*last);
        }
        if relative.len() > 1 {
            if let Some(last) = relative.last() {
                if self.sentinels.iter().any(|s| s == last) {
                    relative.pop();
                }
            }
        }

        relative.join(CATEGORY_SEPARATOR)
    }
}

/// Split a path on `/` and the platform separator.
///
/// Empty and `.` segments are dropped; an absolute path keeps a leading
/// `/` marker so it never matches a relative root.
fn segments(path: &str) -> Vec<String> {
    let is_separator = |c: char| c == '/' || c == std::path::MAIN_SEPARATOR;
    let mut parts = Vec::new();
    if path.starts_with(is_separator) {
        parts.push("/".to_owned());
    }
    parts.extend(
        path.split(is_separator)
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_owned),
    );
    parts
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
