//! Peer-to-peer RPC and broadcast runtime.
//!
//! The runtime multiplexes persistent bidirectional streams between peers
//! into a request/response RPC channel while operating a topic-based
//! publish/subscribe bus on the side. It sits on a transport host
//! ([`plexus_host::Host`]) that owns connections, identity and discovery.
//!
//! # Architecture
//!
//! - **Handler registry**: RPC methods and broadcast types map to typed
//!   handlers, erased over encoded payloads at registration and frozen when
//!   the node starts.
//! - **Per-peer workers**: each connected peer gets one reader/writer task
//!   pair driving one newline-delimited stream. The writer owns the stream's
//!   write side and drains a bounded queue; the reader dispatches every
//!   frame on its own task.
//! - **Request tracking**: outbound requests park in a concurrent table
//!   until the correlated response arrives, the timeout fires or the node
//!   shuts down; exactly one outcome reaches the caller.
//! - **Peer lifecycle**: discovered peers are dialled and adopted, host
//!   disconnect notifications tear workers down, and a watch channel
//!   publishes the connected peer set after every change.
//!
//! # Example
//!
//! ```ignore
//! use plexus_host::memory::MemoryNetwork;
//! use plexus_runtime::{Manager, RpcClient, RuntimeConfig};
//!
//! let network = MemoryNetwork::new();
//! let mut node = Manager::new(Arc::new(network.host("alpha")), RuntimeConfig::default());
//! node.register_rpc("greet", |peer, name: String| async move {
//!     Ok(format!("hello {name} from {peer}"))
//! })?;
//! node.start().await?;
//!
//! let client = RpcClient::connect(&node, "beta".into()).await?;
//! let reply: String = client.call("greet", &"alpha".to_string()).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod registry;

mod dispatch;
mod lifecycle;
mod pubsub;
mod tracker;
mod worker;

// Re-export main types
pub use client::RpcClient;
pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use manager::Manager;
pub use registry::{HandlerError, HandlerRegistry};

// Commonly used identity and wire types
pub use plexus_host::{Host, PeerId, PeerInfo};
pub use plexus_proto::{PingRequest, PingResponse, PING_METHOD};
