//! Request-scoped context propagation.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → scope(ctx, fut)        attach ctx to a fresh root unit
//!     → spawn / propagate      child unit copies the parent's Arc
//!     → current()              task-local unit → store lookup
//!     → unit guard dropped     entry removed exactly once
//! ```
//!
//! # Design Decisions
//! - The current unit is tokio task-local; the store maps units to contexts
//! - Unit lifetimes are RAII guards owned by the wrapped future, so
//!   cancellation and never-polled tasks release their entry too
//! - Every operation is total: an absent context is a normal state
//! - Work spawned before a scope is opened does not inherit a context

pub mod scope;
pub mod store;

pub use scope::{
    current, current_request_id, current_unit, enter, propagate, scope, scope_sync, spawn,
    spawn_blocking, EnteredScope,
};
pub use store::{ContextStore, ExecutionContext, UnitId};
