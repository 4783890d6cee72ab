//! The runtime facade.
//!
//! A [`Manager`] owns one transport host and runs the full stack on top of
//! it: handler registration, per-peer workers, request tracking, broadcast
//! dispatch and peer lifecycle. Handlers are registered first, then
//! [`start`](Manager::start) brings the node up; [`send`](Manager::send) and
//! [`broadcast`](Manager::broadcast) carry traffic until
//! [`stop`](Manager::stop).

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use plexus_host::{Host, PeerId};
use plexus_proto::{
    codec, protocol, PingRequest, PingResponse, RequestPayload, RpcEnvelope, PING_METHOD,
};

use crate::config::RuntimeConfig;
use crate::dispatch::RpcDispatcher;
use crate::error::{Result, RuntimeError};
use crate::lifecycle::{self, PeerLifecycle};
use crate::pubsub::PubSubDispatcher;
use crate::registry::{HandlerError, HandlerRegistry};
use crate::tracker::RequestTable;
use crate::worker::PeerWorkers;

/// Peer-to-peer RPC and broadcast node.
pub struct Manager {
    host: Arc<dyn Host>,
    config: RuntimeConfig,
    registry: HandlerRegistry,
    peer_list: watch::Sender<Vec<PeerId>>,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    workers: Arc<PeerWorkers>,
    requests: Arc<RequestTable>,
    tasks: Vec<JoinHandle<()>>,
}

impl Manager {
    /// Creates a node on top of a transport host.
    #[must_use]
    pub fn new(host: Arc<dyn Host>, config: RuntimeConfig) -> Self {
        let (peer_list, _) = watch::channel(Vec::new());
        Self {
            host,
            config,
            registry: HandlerRegistry::new(),
            peer_list,
            running: None,
        }
    }

    /// Identity of the local node.
    #[must_use]
    pub fn local_peer(&self) -> PeerId {
        self.host.local_peer()
    }

    /// The runtime configuration in effect.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Watch channel carrying the connected peer set, refreshed after every
    /// connect and disconnect.
    #[must_use]
    pub fn peer_list(&self) -> watch::Receiver<Vec<PeerId>> {
        self.peer_list.subscribe()
    }

    /// Registers an RPC handler. Must be called before [`start`](Self::start).
    pub fn register_rpc<Req, Resp, F, Fut>(&mut self, method: &str, func: F) -> Result<()>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(PeerId, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, HandlerError>> + Send + 'static,
    {
        if self.running.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.registry.register_rpc(method, func)
    }

    /// Registers a broadcast handler. Must be called before
    /// [`start`](Self::start).
    pub fn register_pubsub<Payload, F, Fut>(&mut self, kind: &str, func: F) -> Result<()>
    where
        Payload: DeserializeOwned + Send + 'static,
        F: Fn(PeerId, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        if self.running.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.registry.register_pubsub(kind, func)
    }

    /// Brings the node up: freezes the handler registry, starts listening,
    /// subscribes to the broadcast topic and begins peer discovery.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }

        let mut registry = std::mem::take(&mut self.registry);
        if !registry.contains_rpc(PING_METHOD) {
            registry.register_rpc(PING_METHOD, |_peer, request: PingRequest| async move {
                Ok::<_, HandlerError>(PingResponse::answering(&request))
            })?;
        }
        let registry = Arc::new(registry);

        let cancel = CancellationToken::new();
        let requests = Arc::new(RequestTable::new());
        let dispatcher = Arc::new(RpcDispatcher::new(Arc::clone(&registry), Arc::clone(&requests)));
        let workers = Arc::new(PeerWorkers::new(
            dispatcher,
            self.config.write_queue_capacity,
            cancel.child_token(),
        ));

        // Inbound streams spawn workers; disconnects tear them down.
        let stream_workers = Arc::clone(&workers);
        self.host.set_stream_handler(
            protocol::RPC,
            Arc::new(move |stream| stream_workers.adopt_stream(stream)),
        );
        self.host.notify_disconnect(lifecycle::disconnect_handler(
            Arc::clone(&self.host),
            Arc::clone(&workers),
            self.peer_list.clone(),
        ));

        self.host.listen().await?;

        let mut tasks = Vec::new();

        let subscription = self.host.subscribe(protocol::UPDATES_TOPIC)?;
        let pubsub = Arc::new(PubSubDispatcher::new(
            Arc::clone(&registry),
            self.host.local_peer(),
        ));
        tasks.push(tokio::spawn(pubsub.run(subscription, cancel.child_token())));

        let (found_tx, found_rx) = mpsc::channel(self.config.discovery_queue);
        self.host
            .start_discovery(protocol::DISCOVERY_TAG, found_tx)
            .await?;
        let peer_lifecycle = PeerLifecycle::new(
            Arc::clone(&self.host),
            Arc::clone(&workers),
            self.peer_list.clone(),
        );
        tasks.push(tokio::spawn(peer_lifecycle.run(found_rx, cancel.child_token())));

        info!(peer = %self.host.local_peer(), "p2p node started");
        self.running = Some(Running {
            cancel,
            workers,
            requests,
            tasks,
        });
        Ok(())
    }

    /// Tears the node down: cancels dispatchers and workers and closes the
    /// host. Safe to call more than once.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        running.workers.shutdown();
        for task in running.tasks {
            let _ = task.await;
        }
        self.host.close().await?;

        info!(peer = %self.host.local_peer(), "p2p node stopped");
        Ok(())
    }

    /// Sends a request to a peer and awaits the decoded response.
    ///
    /// Fails immediately when no worker runs for the peer; otherwise the
    /// envelope is enqueued onto the peer's writer (awaiting a free slot
    /// when the queue is full) and exactly one of response, remote error or
    /// timeout is returned. The tracker entry is gone by the time this
    /// returns, so a late response is dropped by the dispatcher.
    pub async fn send<Req, Resp>(&self, peer: &PeerId, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let running = self.running.as_ref().ok_or(RuntimeError::NotStarted)?;

        let data = codec::to_raw(request)?;
        let payload = codec::to_raw(&RequestPayload {
            method: method.to_owned(),
            data,
        })?;
        let envelope = RpcEnvelope::request(payload);
        let id = envelope.id;

        let Some(queue) = running.workers.write_queue(peer) else {
            return Err(RuntimeError::PeerWriterNotFound {
                id,
                peer: peer.clone(),
            });
        };

        let mut rx = running.requests.track(id);
        trace!(peer = %peer, id = %id, method = %method, "sending request");

        if queue.send(envelope).await.is_err() {
            running.requests.cancel(&id);
            return Err(RuntimeError::PeerWriterNotFound {
                id,
                peer: peer.clone(),
            });
        }

        let outcome = match tokio::time::timeout(self.config.request_timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RuntimeError::RequestCancelled(id)),
            Err(_elapsed) => {
                if running.requests.cancel(&id) {
                    Err(RuntimeError::RequestTimeout {
                        id,
                        method: method.to_owned(),
                        peer: peer.clone(),
                    })
                } else {
                    // The response landed just as the timer fired; the
                    // dispatcher already owns the completion, take it.
                    match rx.try_recv() {
                        Ok(outcome) => outcome,
                        Err(_) => Err(RuntimeError::RequestTimeout {
                            id,
                            method: method.to_owned(),
                            peer: peer.clone(),
                        }),
                    }
                }
            }
        };

        match outcome? {
            Some(raw) => Ok(codec::from_raw(&raw)?),
            None => Ok(codec::decode(b"null")?),
        }
    }

    /// Publishes a typed payload on the broadcast topic, best effort.
    pub async fn broadcast<T: Serialize>(&self, kind: &str, payload: &T) -> Result<()> {
        let payload = codec::to_raw(payload)?;
        let envelope = plexus_proto::PubSubEnvelope::new(kind, payload);
        let bytes = codec::encode(&envelope)?;
        self.host.publish(protocol::UPDATES_TOPIC, bytes).await?;
        Ok(())
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
            running.workers.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_host::memory::MemoryNetwork;

    fn node(network: &MemoryNetwork, name: &str) -> Manager {
        Manager::new(Arc::new(network.host(name)), RuntimeConfig::default())
    }

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let network = MemoryNetwork::new();
        let manager = node(&network, "alpha");

        let result: Result<PingResponse> = manager
            .send(&PeerId::new("beta"), PING_METHOD, &PingRequest::new("hi"))
            .await;
        assert!(matches!(result, Err(RuntimeError::NotStarted)));
    }

    #[tokio::test]
    async fn registration_after_start_is_rejected() {
        let network = MemoryNetwork::new();
        let mut manager = node(&network, "alpha");
        manager.start().await.unwrap();

        let result = manager.register_rpc("late", |_peer, req: PingRequest| async move {
            Ok::<_, HandlerError>(req)
        });
        assert!(matches!(result, Err(RuntimeError::AlreadyStarted)));

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_rejected_and_stop_is_idempotent() {
        let network = MemoryNetwork::new();
        let mut manager = node(&network, "alpha");

        manager.start().await.unwrap();
        assert!(matches!(
            manager.start().await,
            Err(RuntimeError::AlreadyStarted)
        ));

        manager.stop().await.unwrap();
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn send_to_unknown_peer_reports_missing_writer() {
        let network = MemoryNetwork::new();
        let mut manager = node(&network, "alpha");
        manager.start().await.unwrap();

        let result: Result<PingResponse> = manager
            .send(&PeerId::new("ghost"), PING_METHOD, &PingRequest::new("hi"))
            .await;
        match result {
            Err(RuntimeError::PeerWriterNotFound { peer, .. }) => {
                assert_eq!(peer.as_str(), "ghost");
            }
            other => panic!("expected missing writer error, got {other:?}"),
        }

        manager.stop().await.unwrap();
    }
}
