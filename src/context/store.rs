//! Unit → context bookkeeping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// Global atomic counter for unit IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static UNIT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of one asynchronous unit of work (a task or a wrapped future).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    /// Allocate a fresh unit ID.
    pub fn next() -> Self {
        Self(UNIT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Request-scoped values shared by every unit of one causal chain.
///
/// Built once per inbound unit of work and never mutated afterwards;
/// descendants share the same `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    request_id: String,
    fields: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Create a context for the given request ID.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Create a context with a random UUID v4 request ID.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Add an extra field. Only usable while building the context.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Look up a field by name. `requestId` resolves to the request ID.
    pub fn field(&self, name: &str) -> Option<&str> {
        if name == "requestId" {
            return Some(&self.request_id);
        }
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Mapping of live units to their inherited context.
///
/// An entry exists for a unit iff the unit, or an ancestor in its causal
/// chain, had a context attached and the unit has not been destroyed yet.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: DashMap<UnitId, Arc<ExecutionContext>>,
}

impl ContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store used by the scope API.
    pub fn global() -> &'static ContextStore {
        static STORE: OnceLock<ContextStore> = OnceLock::new();
        STORE.get_or_init(ContextStore::new)
    }

    /// Bind `context` to `unit`, replacing any inherited value.
    pub fn attach(&self, unit: UnitId, context: Arc<ExecutionContext>) {
        self.entries.insert(unit, context);
    }

    /// Copy the parent's context reference to a newly created child.
    ///
    /// Must run before the child starts executing. A parent without an
    /// entry leaves the child without one.
    pub fn on_child_created(&self, parent: UnitId, child: UnitId) {
        // Clone out first so the shard guard is released before inserting.
        let inherited = self.entries.get(&parent).map(|entry| entry.value().clone());
        if let Some(context) = inherited {
            self.entries.insert(child, context);
        }
    }

    /// Remove the unit's entry. Returns whether an entry was present.
    pub fn on_unit_destroyed(&self, unit: UnitId) -> bool {
        self.entries.remove(&unit).is_some()
    }

    /// Context bound to `unit`, if any.
    pub fn get(&self, unit: UnitId) -> Option<Arc<ExecutionContext>> {
        self.entries.get(&unit).map(|entry| entry.value().clone())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
