//! Configuration for transport hosts.

use serde::Deserialize;

/// Knobs honoured by host implementations.
///
/// A production host listens on TCP and QUIC at `listen_port`, secures
/// connections with Noise over a per-process Ed25519 identity, and lets its
/// connection manager trim peers between the two watermarks. The in-process
/// [`memory`](crate::memory) host only enforces the high watermark.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Port the host listens on for both TCP and QUIC.
    pub listen_port: u16,

    /// Connection count the connection manager trims down to.
    pub low_watermark: usize,

    /// Connection count above which new connections are refused.
    pub high_watermark: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_port: 10500,
            low_watermark: 100,
            high_watermark: 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = HostConfig::default();
        assert_eq!(config.listen_port, 10500);
        assert_eq!(config.low_watermark, 100);
        assert_eq!(config.high_watermark, 400);
    }

    #[test]
    fn config_deserialises_partial_input() {
        let config: HostConfig = serde_json::from_str(r#"{"listen_port": 4001}"#).unwrap();
        assert_eq!(config.listen_port, 4001);
        assert_eq!(config.high_watermark, 400);
    }
}
