//! Transport configuration
//!
//! Values can be overridden from the environment:
//!
//! - `OVSDB_CALL_TIMEOUT_MS`: default deadline applied by `JsonRpcClient::request`
//! - `OVSDB_MAX_FRAME_BYTES`: largest inbound frame accepted before the
//!   connection is treated as broken

use std::time::Duration;
use tracing::warn;

/// Default upper bound for a single inbound frame (64 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Configuration for one JSON-RPC connection
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for `request()`; `None` waits until response or teardown
    pub call_timeout: Option<Duration>,
    /// Maximum buffered size of one undecoded inbound frame
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            call_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl TransportConfig {
    /// Defaults overridden by `OVSDB_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_number("OVSDB_CALL_TIMEOUT_MS") {
            config.call_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(bytes) = env_number("OVSDB_MAX_FRAME_BYTES") {
            config.max_frame_bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
        }

        config
    }

    /// Set the default call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Set the maximum inbound frame size
    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }
}

fn env_number(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
