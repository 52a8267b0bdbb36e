//! Task-local scope API driving the context store.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::context::store::{ContextStore, ExecutionContext, UnitId};

tokio::task_local! {
    /// Unit currently executing on this task.
    static CURRENT_UNIT: UnitId;
}

/// Owns one unit's lifetime in the store. Dropping it destroys the unit.
#[derive(Debug)]
struct UnitGuard {
    unit: UnitId,
    store: &'static ContextStore,
}

impl UnitGuard {
    fn new(store: &'static ContextStore) -> Self {
        Self {
            unit: UnitId::next(),
            store,
        }
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.store.on_unit_destroyed(self.unit);
    }
}

/// The unit executing on the current task, if the task runs under a scope.
pub fn current_unit() -> Option<UnitId> {
    CURRENT_UNIT.try_with(|unit| *unit).ok()
}

/// Context of the currently executing unit.
///
/// Returns `None` outside any scope, or when the causal chain never had a
/// context attached.
pub fn current() -> Option<Arc<ExecutionContext>> {
    current_unit().and_then(|unit| ContextStore::global().get(unit))
}

/// Request ID of the current context.
pub fn current_request_id() -> Option<String> {
    current().map(|ctx| ctx.request_id().to_owned())
}

/// A root unit with its context attached, alive until dropped or run.
///
/// Lets a caller do synchronous setup under the unit (for instance a tower
/// `Service::call`) and then drive the resulting future under the same
/// unit.
#[derive(Debug)]
pub struct EnteredScope {
    guard: UnitGuard,
}

impl EnteredScope {
    pub fn unit(&self) -> UnitId {
        self.guard.unit
    }

    /// Run `f` with this unit current.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT_UNIT.sync_scope(self.guard.unit, f)
    }

    /// Drive `future` with this unit current, then destroy the unit.
    pub async fn run<F: Future>(self, future: F) -> F::Output {
        let unit = self.guard.unit;
        let _guard = self.guard;
        CURRENT_UNIT.scope(unit, future).await
    }
}

/// Allocate a root unit and attach `context` to it.
pub fn enter<C>(context: C) -> EnteredScope
where
    C: Into<Arc<ExecutionContext>>,
{
    let store = ContextStore::global();
    let guard = UnitGuard::new(store);
    store.attach(guard.unit, context.into());
    EnteredScope { guard }
}

/// Run `future` as a new root unit with `context` attached.
///
/// The unit is destroyed when the future completes or is dropped. Nesting
/// a scope inside another re-attaches a different context for the inner
/// chain only.
pub async fn scope<C, F>(context: C, future: F) -> F::Output
where
    C: Into<Arc<ExecutionContext>>,
    F: Future,
{
    enter(context).run(future).await
}

/// Synchronous counterpart of [`scope`].
pub fn scope_sync<C, R>(context: C, f: impl FnOnce() -> R) -> R
where
    C: Into<Arc<ExecutionContext>>,
{
    enter(context).in_scope(f)
}

/// Wrap `future` as a child unit of the current one.
///
/// The child is registered immediately, before it is ever polled, so it
/// inherits the context in effect at the call site. Work created before
/// the ancestor's scope was opened does not inherit anything.
pub fn propagate<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let store = ContextStore::global();
    let guard = UnitGuard::new(store);
    if let Some(parent) = current_unit() {
        store.on_child_created(parent, guard.unit);
    }

    async move {
        let unit = guard.unit;
        let _guard = guard;
        CURRENT_UNIT.scope(unit, future).await
    }
}

/// Spawn a tokio task that inherits the current context.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(future))
}

/// Run blocking work on tokio's blocking pool, inheriting the current context.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let store = ContextStore::global();
    let guard = UnitGuard::new(store);
    if let Some(parent) = current_unit() {
        store.on_child_created(parent, guard.unit);
    }

    tokio::task::spawn_blocking(move || {
        let unit = guard.unit;
        let _guard = guard;
        CURRENT_UNIT.sync_scope(unit, f)
    })
}
