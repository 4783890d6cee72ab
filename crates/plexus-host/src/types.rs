//! Peer identity types.

use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote process, derived from its transport-level
/// identity. Primary key of all per-peer state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a peer id from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Addressing information for a discovered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// The peer's identity.
    pub id: PeerId,

    /// Multiaddress strings the peer can be dialled on.
    pub addrs: Vec<String>,
}

impl PeerInfo {
    /// Creates addressing info with no known addresses.
    #[must_use]
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }

    /// Adds a dialable address.
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addrs.push(addr.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display_matches_input() {
        let id = PeerId::new("12D3KooWExample");
        assert_eq!(id.to_string(), "12D3KooWExample");
        assert_eq!(id.as_str(), "12D3KooWExample");
    }

    #[test]
    fn peer_info_addresses() {
        let info = PeerInfo::new(PeerId::new("peer-a")).with_addr("/ip4/10.0.0.2/tcp/10500");
        assert_eq!(info.addrs.len(), 1);
    }
}
