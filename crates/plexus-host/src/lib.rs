//! Transport host abstraction for the plexus runtime.
//!
//! The runtime multiplexes RPC and broadcast traffic over a host that owns
//! connections, stream negotiation, peer identity and discovery. This crate
//! defines the narrow contract the runtime consumes ([`Host`]) together with
//! the stream and subscription handles flowing across it, and provides an
//! in-process [`memory`] implementation that wires several hosts together
//! for tests and simulations.
//!
//! A production implementation is expected to sit on a libp2p-style stack:
//! TCP and QUIC transports, Noise security over an Ed25519 identity, mDNS
//! discovery and a floodsub-style broadcast primitive. None of that leaks
//! through the trait; the runtime only sees peer ids, byte streams and
//! topic messages.

mod config;
mod error;
pub mod memory;
mod types;

pub use config::HostConfig;
pub use error::HostError;
pub use types::{PeerId, PeerInfo};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Byte-stream capability required of RPC streams.
///
/// Connections implement both `AsyncRead` and `AsyncWrite` for streaming
/// data in both directions.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamIo for T {}

/// A protocol-scoped bidirectional stream to one remote peer.
pub struct HostStream {
    peer: PeerId,
    io: Box<dyn StreamIo>,
}

impl HostStream {
    /// Wraps a transport stream together with the remote peer's identity.
    #[must_use]
    pub fn new(peer: PeerId, io: impl StreamIo + 'static) -> Self {
        Self {
            peer,
            io: Box::new(io),
        }
    }

    /// The remote end of this stream.
    #[must_use]
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Splits the stream into the remote identity and the raw byte channel.
    #[must_use]
    pub fn into_parts(self) -> (PeerId, Box<dyn StreamIo>) {
        (self.peer, self.io)
    }
}

impl std::fmt::Debug for HostStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostStream").field("peer", &self.peer).finish_non_exhaustive()
    }
}

/// Callback invoked for every inbound stream negotiated on a protocol.
pub type StreamHandler = Arc<dyn Fn(HostStream) + Send + Sync>;

/// Callback invoked when the connection to a peer is torn down.
pub type DisconnectHandler = Arc<dyn Fn(PeerId) + Send + Sync>;

/// One message received from a broadcast topic.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    /// The peer that published the message.
    pub sender: PeerId,

    /// The published bytes, opaque to the host.
    pub data: Vec<u8>,
}

/// Receiving side of a topic subscription.
pub struct Subscription {
    rx: mpsc::Receiver<PubSubMessage>,
}

impl Subscription {
    /// Wraps the channel a host implementation delivers messages on.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<PubSubMessage>) -> Self {
        Self { rx }
    }

    /// Awaits the next message on the topic.
    ///
    /// Returns `None` once the host drops the sending side, which marks the
    /// end of the subscription.
    pub async fn next(&mut self) -> Option<PubSubMessage> {
        self.rx.recv().await
    }
}

/// The transport host contract consumed by the runtime.
///
/// Registration methods (`set_stream_handler`, `notify_disconnect`) are
/// synchronous and expected before `listen`; everything touching the network
/// is async.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Identity of this process.
    fn local_peer(&self) -> PeerId;

    /// Starts accepting inbound connections.
    async fn listen(&self) -> Result<(), HostError>;

    /// Dials a peer, establishing a connection without opening streams.
    async fn connect(&self, peer: &PeerInfo) -> Result<(), HostError>;

    /// Opens a new stream to a connected peer, scoped to a protocol id.
    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<HostStream, HostError>;

    /// Registers the callback receiving inbound streams for a protocol.
    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler);

    /// Registers a callback fired when a peer's connection closes.
    fn notify_disconnect(&self, handler: DisconnectHandler);

    /// Publishes bytes to every subscriber of a topic, best effort.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), HostError>;

    /// Subscribes to a topic, returning the message stream.
    fn subscribe(&self, topic: &str) -> Result<Subscription, HostError>;

    /// Starts peer discovery, delivering found peers to `found`.
    async fn start_discovery(
        &self,
        tag: &str,
        found: mpsc::Sender<PeerInfo>,
    ) -> Result<(), HostError>;

    /// Currently connected peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Tears down all connections and releases the host.
    async fn close(&self) -> Result<(), HostError>;
}
