use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use super::OutputPort;

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracks every [`OutputPort`] created during the process's lifetime via a
/// weak registry, and closes them all together on shutdown.
///
/// Holding weak references, rather than strong ones, is what lets an
/// `Element` drop its ports normally when it goes out of scope instead of
/// the registry pinning every port ever created for the life of the
/// process — `shutdown()` simply skips entries whose port has already gone
/// away.
pub struct LifecycleManager {
    outputs: Mutex<Vec<Weak<OutputPort>>>,
    shut_down: std::sync::atomic::AtomicBool,
}

static GLOBAL: OnceLock<LifecycleManager> = OnceLock::new();

impl LifecycleManager {
    fn new() -> Self {
        Self {
            outputs: Mutex::new(Vec::new()),
            shut_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// The process-wide registry. Elements register their output ports here
    /// as they're built; nothing but `shutdown()` needs to know it exists.
    pub fn global() -> &'static LifecycleManager {
        GLOBAL.get_or_init(Self::new)
    }

    pub async fn register(&self, port: &Arc<OutputPort>) {
        self.outputs.lock().await.push(Arc::downgrade(port));
    }

    /// Closes every still-live registered output port, with `timeout` applied
    /// per port. Safe to call more than once; later calls are no-ops.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_CLOSE_TIMEOUT).await;
    }

    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        if self.shut_down.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let live: Vec<Arc<OutputPort>> = {
            let outputs = self.outputs.lock().await;
            outputs.iter().filter_map(Weak::upgrade).collect()
        };

        tracing::info!(count = live.len(), "shutting down output ports");
        for port in live {
            port.close(timeout).await;
        }
    }

    /// Installs a Ctrl-C / SIGTERM handler that runs `shutdown()` once and
    /// then returns. Intended to be spawned as its own task at process
    /// start; awaiting it blocks until a signal arrives.
    #[cfg(unix)]
    pub async fn wait_for_shutdown_signal(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
        self.shutdown().await;
    }

    #[cfg(not(unix))]
    pub async fn wait_for_shutdown_signal(&self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT");
            self.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::payload::TypeDescriptor;

    use super::*;

    #[tokio::test]
    async fn shutdown_closes_registered_ports_and_is_idempotent() {
        let manager = LifecycleManager::new();
        let closed = Arc::new(AtomicBool::new(false));

        let output = OutputPort::new(
            "out",
            "el",
            vec![super::super::RequiredItem {
                name: "value".to_string(),
                item_type: TypeDescriptor::Any,
            }],
            Arc::new(|mut items| {
                Box::pin(async move { items.remove("value").unwrap() })
            }),
            None,
            true,
        );
        manager.register(&output).await;

        manager.shutdown_with_timeout(Duration::from_millis(100)).await;
        assert_eq!(output.connected_input_count().await, 0);
        closed.store(true, Ordering::SeqCst);

        // Second call must not panic or double-close.
        manager.shutdown_with_timeout(Duration::from_millis(100)).await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropped_ports_are_skipped_on_shutdown() {
        let manager = LifecycleManager::new();
        {
            let output = OutputPort::new(
                "out",
                "el",
                vec![],
                Arc::new(|_items| Box::pin(async move { unreachable!() })),
                None,
                true,
            );
            manager.register(&output).await;
        }
        // `output` has been dropped; shutdown should not panic.
        manager.shutdown().await;
    }
}
