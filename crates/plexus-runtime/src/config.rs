//! Configuration for the runtime.

use serde::Deserialize;
use std::time::Duration;

/// Runtime tuning knobs.
///
/// The defaults match production behaviour; tests shrink the timeout and
/// probe backoff to keep wall-clock time down.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Total time budget for one RPC round trip.
    #[serde(with = "serde_duration_millis")]
    pub request_timeout: Duration,

    /// Bound of each peer's write queue. Enqueues await free slots, which
    /// backpressures callers of `send`.
    pub write_queue_capacity: usize,

    /// Depth of the discovery intake queue.
    pub discovery_queue: usize,

    /// Probe attempts before a freshly connected peer is declared
    /// unreachable.
    pub ready_probe_attempts: u32,

    /// Delay between readiness probes.
    #[serde(with = "serde_duration_millis")]
    pub ready_probe_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            write_queue_capacity: 200,
            discovery_queue: 32,
            ready_probe_attempts: 20,
            ready_probe_backoff: Duration::from_millis(200),
        }
    }
}

/// Serde helper for Duration as milliseconds.
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
