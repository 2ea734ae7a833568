//! Proxy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default depth of the inbound and outbound queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Largest queue capacity a proxy will allocate.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Default time the reader waits for inbound queue capacity.
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 5_000;

/// Default liveness timeout in seconds.
pub const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 10;

/// Configuration for a single [`Proxy`](crate::Proxy).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Capacity of each frame queue.
    pub queue_capacity: usize,
    /// How long the reader may wait for inbound capacity before the consumer
    /// is declared dead.
    pub enqueue_timeout_ms: u64,
    /// Liveness timeout in seconds; `None` disables the liveness task.
    pub keepalive_timeout_secs: Option<u64>,
    /// Whether the byte-stream reassembler is available.
    pub byte_stream: bool,
}

impl ProxyConfig {
    /// Minimal duplex pump: no liveness task, no byte-stream reassembly.
    pub fn minimal() -> Self {
        Self {
            keepalive_timeout_secs: None,
            byte_stream: false,
            ..Self::default()
        }
    }

    /// Enqueue timeout as a `Duration`.
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    /// Liveness timeout as a `Duration`, if enabled.
    pub fn keepalive_timeout(&self) -> Option<Duration> {
        self.keepalive_timeout_secs.map(Duration::from_secs)
    }

    /// Queue capacity, clamped to `1..=MAX_QUEUE_CAPACITY`.
    pub fn capacity(&self) -> usize {
        self.queue_capacity.clamp(1, MAX_QUEUE_CAPACITY)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout_ms: DEFAULT_ENQUEUE_TIMEOUT_MS,
            keepalive_timeout_secs: Some(DEFAULT_KEEPALIVE_TIMEOUT_SECS),
            byte_stream: true,
        }
    }
}
