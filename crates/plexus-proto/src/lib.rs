//! Wire protocol types for plexus peer-to-peer communication.
//!
//! This crate defines the framed records exchanged over RPC streams and the
//! broadcast topic:
//!
//! - RPC streams carry newline-delimited JSON records. Each record is an
//!   [`RpcEnvelope`] whose payload is a nested, lazily decoded record
//!   ([`RequestPayload`] or [`ResponsePayload`]).
//! - Broadcast messages are single JSON records ([`PubSubEnvelope`]) handed
//!   to the host's publish primitive; no framing is applied.
//!
//! # Wire format
//!
//! ```text
//! ┌────────────────────────────────────────────────┬────┐
//! │ {"id":"01J…","kind":"request","payload":{...}} │ \n │
//! ├────────────────────────────────────────────────┼────┤
//! │ {"id":"01J…","kind":"response","payload":{...}}│ \n │
//! └────────────────────────────────────────────────┴────┘
//! ```
//!
//! Compact JSON never contains a raw newline (the delimiter is escaped as
//! `\n` inside string literals), so the framing layer can split records on
//! the `0x0A` byte alone.

pub mod codec;
mod control;
mod envelope;
mod error;
pub mod framing;
mod types;

pub use control::{PingRequest, PingResponse, PING_METHOD};
pub use envelope::{PubSubEnvelope, RequestPayload, ResponsePayload, RpcEnvelope, RpcKind};
pub use error::ProtocolError;
pub use framing::{FrameReader, DELIMITER};
pub use types::RequestId;

/// Well-known protocol identifiers.
pub mod protocol {
    /// Protocol id negotiated for RPC streams.
    pub const RPC: &str = "/protos/rpc/0.0.1";

    /// Topic carrying broadcast updates.
    pub const UPDATES_TOPIC: &str = "/protos/updates/0.0.1";

    /// Service tag advertised by peer discovery.
    pub const DISCOVERY_TAG: &str = "protos";
}
