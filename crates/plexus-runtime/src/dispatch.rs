//! Routing of inbound RPC frames.
//!
//! Every frame read from a peer stream lands here on its own short-lived
//! task, so a slow handler never stalls the stream reader. Requests produce
//! exactly one response envelope on the peer's write queue; responses
//! complete the matching tracker entry.

use std::sync::Arc;

use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use plexus_host::PeerId;
use plexus_proto::{codec, RequestId, RequestPayload, ResponsePayload, RpcEnvelope, RpcKind};

use crate::registry::{HandlerRegistry, InvokeError};
use crate::tracker::RequestTable;
use crate::error::RuntimeError;

pub(crate) struct RpcDispatcher {
    registry: Arc<HandlerRegistry>,
    requests: Arc<RequestTable>,
}

impl RpcDispatcher {
    pub(crate) fn new(registry: Arc<HandlerRegistry>, requests: Arc<RequestTable>) -> Self {
        Self { registry, requests }
    }

    /// Decodes one frame and routes it. Malformed frames are logged and
    /// dropped; the stream stays up.
    pub(crate) async fn dispatch(
        &self,
        peer: PeerId,
        frame: &[u8],
        replies: mpsc::Sender<RpcEnvelope>,
    ) {
        let envelope: RpcEnvelope = match codec::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(peer = %peer, error = %e, "failed to decode rpc message");
                return;
            }
        };

        match envelope.kind {
            RpcKind::Request => {
                self.handle_request(peer, envelope.id, envelope.payload, replies)
                    .await;
            }
            RpcKind::Response => self.handle_response(peer, envelope.id, &envelope.payload),
        }
    }

    async fn handle_request(
        &self,
        peer: PeerId,
        id: RequestId,
        payload: Box<RawValue>,
        replies: mpsc::Sender<RpcEnvelope>,
    ) {
        let request: RequestPayload = match codec::from_raw(&payload) {
            Ok(request) => request,
            Err(e) => {
                error!(peer = %peer, id = %id, error = %e, "failed to decode request");
                return;
            }
        };
        trace!(peer = %peer, id = %id, method = %request.method, "remote request");

        let response = self.invoke(peer.clone(), &request).await;
        if response.is_failure() {
            error!(
                peer = %peer,
                id = %id,
                method = %request.method,
                error = %response.error,
                "failed to process request"
            );
        }

        let payload = match codec::to_raw(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!(peer = %peer, id = %id, error = %e, "failed to encode response");
                return;
            }
        };

        trace!(peer = %peer, id = %id, "sending response");
        if replies.send(RpcEnvelope::response_to(id, payload)).await.is_err() {
            debug!(peer = %peer, id = %id, "writer gone, dropping response");
        }
    }

    /// Runs the handler for a request, mapping every failure mode onto an
    /// error-bearing response payload.
    async fn invoke(&self, peer: PeerId, request: &RequestPayload) -> ResponsePayload {
        let handler = match self.registry.rpc(&request.method) {
            Ok(handler) => handler,
            Err(e) => return ResponsePayload::failure(e.to_string()),
        };

        // The handler runs on its own task so that an unexpected panic is
        // caught at the join point and answered, instead of unwinding the
        // dispatch task with the response unsent.
        let invocation = tokio::spawn(handler.invoke(peer, request.data.clone()));
        match invocation.await {
            Ok(Ok(data)) => ResponsePayload::ok(data),
            Ok(Err(InvokeError::Decode(message))) => {
                ResponsePayload::failure(format!("failed to decode data struct: {message}"))
            }
            Ok(Err(InvokeError::Handler(message))) => {
                ResponsePayload::failure(format!("Internal error: {message}"))
            }
            Err(join_error) => {
                let cause = if join_error.is_panic() {
                    "handler panicked"
                } else {
                    "handler cancelled"
                };
                ResponsePayload::failure(format!("Internal error: {cause}"))
            }
        }
    }

    fn handle_response(&self, peer: PeerId, id: RequestId, payload: &RawValue) {
        let response: ResponsePayload = match codec::from_raw(payload) {
            Ok(response) => response,
            Err(e) => {
                error!(peer = %peer, id = %id, error = %e, "failed to decode response");
                return;
            }
        };
        trace!(peer = %peer, id = %id, "received response");

        let outcome = if response.is_failure() {
            Err(RuntimeError::Remote {
                peer: peer.clone(),
                message: response.error,
            })
        } else {
            Ok(response.data)
        };

        if !self.requests.complete(&id, outcome) {
            warn!(peer = %peer, id = %id, "response for unknown request, dropping");
        }
    }
}
