//! Error types for host operations.

use thiserror::Error;

use crate::types::PeerId;

/// Errors surfaced by a transport host.
#[derive(Error, Debug)]
pub enum HostError {
    /// The peer is not known to the host.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// Dialling the peer failed.
    #[error("connection failed to peer {peer}: {reason}")]
    ConnectFailed {
        /// The peer that could not be reached.
        peer: PeerId,
        /// Transport-level failure description.
        reason: String,
    },

    /// The remote peer does not serve the requested protocol.
    #[error("peer {peer} has no handler for protocol {protocol}")]
    ProtocolUnsupported {
        /// The peer the stream was opened to.
        peer: PeerId,
        /// The protocol id that failed negotiation.
        protocol: String,
    },

    /// The host has been closed.
    #[error("host is closed")]
    Closed,

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
