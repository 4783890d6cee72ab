//! Typed handler registration for RPC methods and broadcast types.
//!
//! Handlers are registered with their concrete argument and result types and
//! erased into closures over encoded payloads, so the dispatchers never need
//! to know the shapes involved. Registration is write-once per key and
//! happens before the runtime starts; afterwards the registry is frozen
//! behind an `Arc` and read without locking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

use plexus_host::PeerId;
use plexus_proto::codec;

use crate::error::{Result, RuntimeError};

/// Error type returned by application handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Failure modes of an erased handler invocation.
#[derive(Debug)]
pub(crate) enum InvokeError {
    /// The inbound data did not decode into the handler's argument type.
    Decode(String),

    /// The handler itself failed.
    Handler(String),
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type ErasedRpc = Arc<
    dyn Fn(PeerId, Box<RawValue>) -> BoxFuture<std::result::Result<Box<RawValue>, InvokeError>>
        + Send
        + Sync,
>;

type ErasedPubSub = Arc<
    dyn Fn(PeerId, Box<RawValue>) -> BoxFuture<std::result::Result<(), InvokeError>> + Send + Sync,
>;

/// An RPC handler erased over encoded payloads.
pub(crate) struct RpcHandler {
    invoke: ErasedRpc,
}

impl std::fmt::Debug for RpcHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHandler").finish_non_exhaustive()
    }
}

impl RpcHandler {
    /// Decodes the argument, runs the handler and encodes its result.
    pub(crate) fn invoke(
        &self,
        peer: PeerId,
        data: Box<RawValue>,
    ) -> BoxFuture<std::result::Result<Box<RawValue>, InvokeError>> {
        (self.invoke)(peer, data)
    }
}

/// A broadcast handler erased over encoded payloads.
pub(crate) struct PubSubHandler {
    invoke: ErasedPubSub,
}

impl std::fmt::Debug for PubSubHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubHandler").finish_non_exhaustive()
    }
}

impl PubSubHandler {
    /// Decodes the payload and runs the handler.
    pub(crate) fn invoke(
        &self,
        peer: PeerId,
        payload: Box<RawValue>,
    ) -> BoxFuture<std::result::Result<(), InvokeError>> {
        (self.invoke)(peer, payload)
    }
}

/// Maps RPC method names and broadcast types to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    rpc: HashMap<String, RpcHandler>,
    pubsub: HashMap<String, PubSubHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an RPC handler under a method name.
    ///
    /// The argument type is decoded from the request's data; the result is
    /// encoded into the response. Each method can be registered once.
    pub fn register_rpc<Req, Resp, F, Fut>(&mut self, method: &str, func: F) -> Result<()>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(PeerId, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, HandlerError>> + Send + 'static,
    {
        if self.rpc.contains_key(method) {
            return Err(RuntimeError::HandlerAlreadyRegistered(method.to_owned()));
        }

        let invoke: ErasedRpc = Arc::new(move |peer, data| {
            let arg: Req = match codec::from_raw(&data) {
                Ok(arg) => arg,
                Err(e) => {
                    let message = e.to_string();
                    return Box::pin(async move { Err(InvokeError::Decode(message)) });
                }
            };

            let fut = func(peer, arg);
            Box::pin(async move {
                match fut.await {
                    Ok(resp) => codec::to_raw(&resp).map_err(|e| InvokeError::Handler(e.to_string())),
                    Err(e) => Err(InvokeError::Handler(e.to_string())),
                }
            })
        });

        self.rpc.insert(method.to_owned(), RpcHandler { invoke });
        Ok(())
    }

    /// Registers a broadcast handler under a message type.
    pub fn register_pubsub<Payload, F, Fut>(&mut self, kind: &str, func: F) -> Result<()>
    where
        Payload: DeserializeOwned + Send + 'static,
        F: Fn(PeerId, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        if self.pubsub.contains_key(kind) {
            return Err(RuntimeError::HandlerAlreadyRegistered(kind.to_owned()));
        }

        let invoke: ErasedPubSub = Arc::new(move |peer, payload| {
            let arg: Payload = match codec::from_raw(&payload) {
                Ok(arg) => arg,
                Err(e) => {
                    let message = e.to_string();
                    return Box::pin(async move { Err(InvokeError::Decode(message)) });
                }
            };

            let fut = func(peer, arg);
            Box::pin(async move { fut.await.map_err(|e| InvokeError::Handler(e.to_string())) })
        });

        self.pubsub.insert(kind.to_owned(), PubSubHandler { invoke });
        Ok(())
    }

    /// Checks whether a method already has an RPC handler.
    #[must_use]
    pub fn contains_rpc(&self, method: &str) -> bool {
        self.rpc.contains_key(method)
    }

    /// Looks up the RPC handler for a method.
    pub(crate) fn rpc(&self, method: &str) -> Result<&RpcHandler> {
        self.rpc
            .get(method)
            .ok_or_else(|| RuntimeError::RpcHandlerNotFound(method.to_owned()))
    }

    /// Looks up the broadcast handler for a message type.
    pub(crate) fn pubsub(&self, kind: &str) -> Result<&PubSubHandler> {
        self.pubsub
            .get(kind)
            .ok_or_else(|| RuntimeError::PubSubHandlerNotFound(kind.to_owned()))
    }
}
