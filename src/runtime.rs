//! Ambient process configuration and logging setup.
//!
//! There is no dedicated event loop type to configure, unlike the
//! `asyncio`-loop-singleton the source system threads through its ports —
//! this crate runs on whatever `tokio` runtime the host process already
//! has, so the only ambient state left to configure is logging and the
//! default timeouts ports and the lifecycle manager fall back to.

use std::time::Duration;

use serde::Deserialize;

/// Process-wide defaults, loadable from environment variables via `envy`-
/// style prefixed vars or constructed directly in tests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Bound on an output port's emission queue before `emit()` starts
    /// blocking (backpressure).
    pub output_queue_capacity: usize,
    /// How long `LifecycleManager::shutdown` waits for each output port's
    /// drain task before aborting it.
    pub shutdown_timeout_secs: u64,
    /// Log filter passed to `tracing_subscriber::EnvFilter`, overridden by
    /// the `RUST_LOG` environment variable when set.
    pub log_filter: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            output_queue_capacity: crate::ports::DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout_secs: 5,
            log_filter: "info".to_string(),
        }
    }
}

impl KernelConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Installs a `tracing-subscriber` formatter honoring `RUST_LOG` (falling
/// back to `config.log_filter`). Safe to call more than once; later calls
/// are no-ops.
pub fn init_logging(config: &KernelConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));

    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_port_queue_default() {
        let config = KernelConfig::default();
        assert_eq!(config.output_queue_capacity, crate::ports::DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }
}
