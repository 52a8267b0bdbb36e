//! Teardown of config watches on process termination.
//!
//! # Responsibilities
//! - Close watch subscriptions on SIGINT, SIGTERM, SIGUSR1 and SIGUSR2
//! - Close them on the shutdown broadcast
//! - Close them from a panic hook
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Closing is idempotent, so every trigger may fire
//! - The previous panic hook still runs after the subscription is closed
//! - `close_on_exit` wires both; `init` uses it for the global watch

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::watcher::Subscription;
use crate::lifecycle::shutdown::Shutdown;

/// Resolve on the first termination signal or shutdown broadcast.
async fn terminated(shutdown: &Shutdown) -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let wait_for = |kind: SignalKind| async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => "SIGINT",
            _ = wait_for(SignalKind::terminate()) => "SIGTERM",
            _ = wait_for(SignalKind::user_defined1()) => "SIGUSR1",
            _ = wait_for(SignalKind::user_defined2()) => "SIGUSR2",
            _ = shutdown.wait() => "shutdown",
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => "ctrl-c",
            _ = shutdown.wait() => "shutdown",
        }
    }
}

/// Close `subscription` when the process is told to stop.
///
/// Returns the watching task; aborting it leaves the subscription open.
pub fn close_on_termination(subscription: Arc<Subscription>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = terminated(&shutdown).await;
        if subscription.close() {
            tracing::info!(reason, "Closed config watch on termination");
        }
    })
}

/// Close `subscription` when any thread panics.
pub fn close_on_panic(subscription: Arc<Subscription>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        subscription.close();
        previous(info);
    }));
}

/// Close `subscription` on panics and, inside a Tokio runtime, on
/// termination signals or when `shutdown` fires.
///
/// Outside a runtime only the panic hook is installed and `None` is
/// returned.
pub fn close_on_exit(subscription: Arc<Subscription>, shutdown: Shutdown) -> Option<JoinHandle<()>> {
    close_on_panic(subscription.clone());
    tokio::runtime::Handle::try_current()
        .ok()
        .map(|_| close_on_termination(subscription, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::{ConfigSnapshot, ConfigSource};
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_closes_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logging.toml");
        std::fs::write(&path, "").unwrap();
        let source = Arc::new(ConfigSource::new(&path));
        let subscription = Arc::new(source.watch(|_: ConfigSnapshot| {}).unwrap());

        let shutdown = Shutdown::new();
        let task = close_on_termination(subscription.clone(), shutdown.clone());
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(subscription.is_closed());
    }

    fn subscription(dir: &tempfile::TempDir) -> Arc<Subscription> {
        let path = dir.path().join("logging.toml");
        std::fs::write(&path, "").unwrap();
        let source = Arc::new(ConfigSource::new(&path));
        Arc::new(source.watch(|_: ConfigSnapshot| {}).unwrap())
    }

    #[test]
    fn test_panic_closes_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let subscription = subscription(&dir);
        assert!(close_on_exit(subscription.clone(), Shutdown::new()).is_none());

        let result = std::thread::spawn(|| panic!("worker failed")).join();
        assert!(result.is_err());
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn test_close_on_exit_watches_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let subscription = subscription(&dir);
        let shutdown = Shutdown::new();

        let task = close_on_exit(subscription.clone(), shutdown.clone()).unwrap();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(subscription.is_closed());
    }
}
