//! Error types for the runtime.

use plexus_host::{HostError, PeerId};
use plexus_proto::{ProtocolError, RequestId};
use thiserror::Error;

/// Runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No RPC handler is registered under the requested method.
    #[error("RPC handler for method '{0}' not found")]
    RpcHandlerNotFound(String),

    /// No broadcast handler is registered under the message type.
    #[error("PubSub handler for msg type '{0}' not found")]
    PubSubHandlerNotFound(String),

    /// A handler is already registered under this key.
    #[error("handler for '{0}' is already registered")]
    HandlerAlreadyRegistered(String),

    /// The runtime is already running.
    #[error("runtime is already running")]
    AlreadyStarted,

    /// The runtime has not been started.
    #[error("runtime is not running")]
    NotStarted,

    /// No worker owns a writer for the target peer.
    #[error("failed to send request '{id}' to peer '{peer}': peer writer not found")]
    PeerWriterNotFound {
        /// The request that could not be enqueued.
        id: RequestId,
        /// The peer with no running worker.
        peer: PeerId,
    },

    /// The response did not arrive within the request timeout.
    #[error("timeout waiting for request '{id}'({method}) to peer '{peer}'")]
    RequestTimeout {
        /// The request that timed out.
        id: RequestId,
        /// The method that was invoked.
        method: String,
        /// The peer that did not answer in time.
        peer: PeerId,
    },

    /// The request was abandoned before completing.
    #[error("request '{0}' was cancelled")]
    RequestCancelled(RequestId),

    /// The remote peer answered with a failure.
    #[error("error returned by '{peer}': {message}")]
    Remote {
        /// The peer that reported the failure.
        peer: PeerId,
        /// The failure description from the response.
        message: String,
    },

    /// Wire-level encode or decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Failure reported by the transport host.
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
