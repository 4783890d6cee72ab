//! Common types used across the protocol.

use serde::{Deserialize, Serialize};

/// Correlates an outbound request with its response.
///
/// Uses ULID format (128-bit, lexicographically sortable, time-prefixed).
/// Minted once when a request is sent; the matching response echoes it
/// verbatim. Serialized on the wire as the 26-character ULID string.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    /// Mints a new id from the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ulid::Ulid> for RequestId {
    fn from(ulid: ulid::Ulid) -> Self {
        Self(ulid)
    }
}
