//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to every subscriber
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGUSR1/SIGUSR2 or shutdown → close config watch
//!     panic → close config watch, then the previous hook
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{close_on_exit, close_on_panic, close_on_termination};
