//! Built-in readiness probe payloads.
//!
//! Every node answers the `ping` method so that a freshly connected peer can
//! verify the RPC path end to end before issuing real traffic.

use serde::{Deserialize, Serialize};

/// Method name of the built-in readiness probe.
pub const PING_METHOD: &str = "ping";

/// Argument of the `ping` method.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    /// Arbitrary text echoed back in the response.
    pub ping: String,
}

impl PingRequest {
    /// Creates a probe carrying the given text.
    #[must_use]
    pub fn new(ping: impl Into<String>) -> Self {
        Self { ping: ping.into() }
    }
}

/// Result of the `ping` method.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    /// Echo of the request text.
    pub pong: String,
}

impl PingResponse {
    /// Builds the canonical answer to a probe.
    #[must_use]
    pub fn answering(request: &PingRequest) -> Self {
        Self {
            pong: format!("Ping: {}!", request.ping),
        }
    }
}
