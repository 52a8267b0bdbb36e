//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, camelCase keys)
//!     → loader.rs (parse, deep-merge over the embedded default)
//!     → validation.rs (semantic checks, all errors collected)
//!     → source.rs (versioned ConfigSnapshot)
//!     → LogPipeline::apply (atomic swap of the pipeline state)
//!
//! On file change:
//!     watcher.rs detects change
//!     → source.rs loads a new snapshot
//!     → on_change callback (usually LogPipeline::apply)
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; changes require a full reload
//! - All fields have defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - A failed reload never replaces the snapshot in effect

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use loader::ConfigLoadError;
pub use schema::LoggingConfig;
pub use source::{ConfigSnapshot, ConfigSource};
pub use watcher::{Subscription, WatchError};
