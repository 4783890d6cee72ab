//! Envelope types for RPC and broadcast messages.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::types::RequestId;

/// Direction of an RPC record on a stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RpcKind {
    /// A request expecting a correlated response.
    Request,
    /// A response to a previously received request.
    Response,
}

/// Outer framed record exchanged on an RPC stream.
///
/// The payload is an opaque nested record ([`RequestPayload`] or
/// [`ResponsePayload`]) decoded lazily after the envelope has been routed.
/// Decoding tolerates unknown fields for forward compatibility.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcEnvelope {
    /// Correlation id; responses echo the id of the request.
    pub id: RequestId,

    /// Whether this record is a request or a response.
    pub kind: RpcKind,

    /// The nested payload, left encoded until dispatch.
    pub payload: Box<RawValue>,
}

impl RpcEnvelope {
    /// Creates a request envelope with a freshly minted id.
    #[must_use]
    pub fn request(payload: Box<RawValue>) -> Self {
        Self {
            id: RequestId::new(),
            kind: RpcKind::Request,
            payload,
        }
    }

    /// Creates a response envelope echoing the request's id.
    #[must_use]
    pub fn response_to(id: RequestId, payload: Box<RawValue>) -> Self {
        Self {
            id,
            kind: RpcKind::Response,
            payload,
        }
    }
}

/// Nested payload of a request envelope.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestPayload {
    /// Name of the handler to invoke on the remote peer.
    pub method: String,

    /// Handler argument, pre-encoded by the caller.
    pub data: Box<RawValue>,
}

/// Nested payload of a response envelope.
///
/// An empty `error` string marks success.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResponsePayload {
    /// Failure description, or empty on success.
    #[serde(default)]
    pub error: String,

    /// Encoded handler result; absent on failure.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl ResponsePayload {
    /// Creates a success payload carrying the encoded handler result.
    #[must_use]
    pub fn ok(data: Box<RawValue>) -> Self {
        Self {
            error: String::new(),
            data: Some(data),
        }
    }

    /// Creates a failure payload carrying the error description.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            data: None,
        }
    }

    /// Checks whether this payload reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Record published on the broadcast topic.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PubSubEnvelope {
    /// Unique id of this broadcast.
    pub id: RequestId,

    /// Message type routing the payload to a subscriber handler.
    #[serde(rename = "type")]
    pub kind: String,

    /// Handler payload, left encoded until dispatch.
    pub payload: Box<RawValue>,
}

impl PubSubEnvelope {
    /// Creates a broadcast envelope with a freshly minted id.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Box<RawValue>) -> Self {
        Self {
            id: RequestId::new(),
            kind: kind.into(),
            payload,
        }
    }
}
