//! In-process host implementation.
//!
//! [`MemoryNetwork`] wires any number of [`MemoryHost`]s together without
//! touching the network: streams are `tokio::io::duplex` pairs, broadcast is
//! a fan-out over per-topic channels, and discovery and disconnects are
//! driven explicitly by the test or simulation. Broadcast delivery includes
//! the publishing host itself, matching floodsub, so subscribers must filter
//! their own messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    DisconnectHandler, Host, HostConfig, HostError, HostStream, PeerId, PeerInfo, PubSubMessage,
    StreamHandler, Subscription,
};

/// In-memory capacity of each duplex stream.
const STREAM_BUFFER: usize = 64 * 1024;

/// Queue depth of each topic subscription.
const TOPIC_BUFFER: usize = 64;

/// Hub connecting a set of in-process hosts.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hosts: Arc<DashMap<PeerId, Arc<HostShared>>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host joined to this network.
    #[must_use]
    pub fn host(&self, peer: impl Into<PeerId>) -> MemoryHost {
        self.host_with_config(peer, HostConfig::default())
    }

    /// Creates a host joined to this network with explicit configuration.
    #[must_use]
    pub fn host_with_config(&self, peer: impl Into<PeerId>, config: HostConfig) -> MemoryHost {
        let peer = peer.into();
        let shared = Arc::new(HostShared {
            peer: peer.clone(),
            config,
            stream_handlers: DashMap::new(),
            disconnect_handlers: RwLock::new(Vec::new()),
            subscriptions: DashMap::new(),
            discovery: Mutex::new(None),
            connected: DashMap::new(),
            closed: AtomicBool::new(false),
        });
        self.hosts.insert(peer, Arc::clone(&shared));

        MemoryHost {
            shared,
            hosts: Arc::clone(&self.hosts),
        }
    }

    /// Announces a peer to every other host's discovery sink.
    pub async fn announce(&self, peer: &PeerId) {
        let info = PeerInfo::new(peer.clone());

        let sinks: Vec<mpsc::Sender<PeerInfo>> = self
            .hosts
            .iter()
            .filter(|entry| entry.key() != peer)
            .filter_map(|entry| entry.value().discovery_sink())
            .collect();

        for sink in sinks {
            let _ = sink.send(info.clone()).await;
        }
    }

    /// Severs the connection between two peers, firing the disconnect
    /// notification on both sides.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        if let Some(host) = self.hosts.get(a) {
            host.connected.remove(b);
            host.fire_disconnect(b);
        }
        if let Some(host) = self.hosts.get(b) {
            host.connected.remove(a);
            host.fire_disconnect(a);
        }
    }
}

struct HostShared {
    peer: PeerId,
    config: HostConfig,
    stream_handlers: DashMap<String, StreamHandler>,
    disconnect_handlers: RwLock<Vec<DisconnectHandler>>,
    subscriptions: DashMap<String, mpsc::Sender<PubSubMessage>>,
    discovery: Mutex<Option<mpsc::Sender<PeerInfo>>>,
    connected: DashMap<PeerId, ()>,
    closed: AtomicBool,
}

impl HostShared {
    fn discovery_sink(&self) -> Option<mpsc::Sender<PeerInfo>> {
        self.discovery.lock().expect("discovery lock poisoned").clone()
    }

    fn fire_disconnect(&self, peer: &PeerId) {
        let handlers: Vec<DisconnectHandler> = self
            .disconnect_handlers
            .read()
            .expect("disconnect lock poisoned")
            .clone();

        for handler in handlers {
            handler(peer.clone());
        }
    }
}

/// One host on a [`MemoryNetwork`].
pub struct MemoryHost {
    shared: Arc<HostShared>,
    hosts: Arc<DashMap<PeerId, Arc<HostShared>>>,
}

impl MemoryHost {
    /// The configuration this host was created with.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }

    fn peer_shared(&self, peer: &PeerId) -> Result<Arc<HostShared>, HostError> {
        self.hosts
            .get(peer)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HostError::UnknownPeer(peer.clone()))
    }

    fn ensure_open(&self) -> Result<(), HostError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(HostError::Closed);
        }
        Ok(())
    }

    fn mark_connected(&self, remote: &Arc<HostShared>) {
        self.shared.connected.insert(remote.peer.clone(), ());
        remote.connected.insert(self.shared.peer.clone(), ());
    }
}

#[async_trait]
impl Host for MemoryHost {
    fn local_peer(&self) -> PeerId {
        self.shared.peer.clone()
    }

    async fn listen(&self) -> Result<(), HostError> {
        self.ensure_open()
    }

    async fn connect(&self, peer: &PeerInfo) -> Result<(), HostError> {
        self.ensure_open()?;

        if self.shared.connected.len() >= self.shared.config.high_watermark {
            return Err(HostError::ConnectFailed {
                peer: peer.id.clone(),
                reason: "connection manager high watermark reached".to_owned(),
            });
        }

        let remote = self
            .hosts
            .get(&peer.id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HostError::ConnectFailed {
                peer: peer.id.clone(),
                reason: "peer unreachable".to_owned(),
            })?;

        self.mark_connected(&remote);
        Ok(())
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<HostStream, HostError> {
        self.ensure_open()?;

        let remote = self.peer_shared(peer)?;
        let handler = remote
            .stream_handlers
            .get(protocol)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HostError::ProtocolUnsupported {
                peer: peer.clone(),
                protocol: protocol.to_owned(),
            })?;

        let (local, inbound) = tokio::io::duplex(STREAM_BUFFER);
        self.mark_connected(&remote);

        handler(HostStream::new(self.shared.peer.clone(), inbound));
        Ok(HostStream::new(peer.clone(), local))
    }

    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler) {
        self.shared
            .stream_handlers
            .insert(protocol.to_owned(), handler);
    }

    fn notify_disconnect(&self, handler: DisconnectHandler) {
        self.shared
            .disconnect_handlers
            .write()
            .expect("disconnect lock poisoned")
            .push(handler);
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), HostError> {
        self.ensure_open()?;

        // Delivery includes the publisher's own subscription, as floodsub
        // does. Slow subscribers lose messages rather than stalling the
        // publisher.
        let subscribers: Vec<(PeerId, mpsc::Sender<PubSubMessage>)> = self
            .hosts
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .subscriptions
                    .get(topic)
                    .map(|tx| (entry.key().clone(), tx.clone()))
            })
            .collect();

        for (subscriber, tx) in subscribers {
            let message = PubSubMessage {
                sender: self.shared.peer.clone(),
                data: data.clone(),
            };
            if tx.try_send(message).is_err() {
                warn!(topic = %topic, subscriber = %subscriber, "dropping broadcast message, subscriber queue full");
            }
        }

        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription, HostError> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::channel(TOPIC_BUFFER);
        self.shared.subscriptions.insert(topic.to_owned(), tx);
        Ok(Subscription::new(rx))
    }

    async fn start_discovery(
        &self,
        _tag: &str,
        found: mpsc::Sender<PeerInfo>,
    ) -> Result<(), HostError> {
        // The in-process network has a single discovery domain; the service
        // tag is not used for scoping.
        self.ensure_open()?;

        *self.shared.discovery.lock().expect("discovery lock poisoned") = Some(found);
        Ok(())
    }

    fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .shared
            .connected
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        peers.sort();
        peers
    }

    async fn close(&self) -> Result<(), HostError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.subscriptions.clear();
        self.hosts.remove(&self.shared.peer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn stream_reaches_remote_handler() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");
        let beta = network.host("beta");

        let (tx, mut rx) = mpsc::channel(1);
        beta.set_stream_handler(
            "/test/1",
            Arc::new(move |stream| {
                tx.try_send(stream).expect("deliver stream");
            }),
        );

        let mut outbound = alpha
            .open_stream(&PeerId::new("beta"), "/test/1")
            .await
            .unwrap();
        assert_eq!(outbound.peer().as_str(), "beta");

        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.peer().as_str(), "alpha");

        // Bytes written by the dialler arrive on the inbound half.
        let (_, mut out_io) = outbound.into_parts();
        out_io.write_all(b"hi").await.unwrap();
        let (_, mut in_io) = inbound.into_parts();
        let mut buf = [0u8; 2];
        in_io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn open_stream_to_unknown_peer_fails() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");

        let result = alpha.open_stream(&PeerId::new("ghost"), "/test/1").await;
        assert!(matches!(result, Err(HostError::UnknownPeer(_))));
    }

    #[tokio::test]
    async fn open_stream_without_remote_handler_fails() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");
        let _beta = network.host("beta");

        let result = alpha.open_stream(&PeerId::new("beta"), "/test/1").await;
        assert!(matches!(result, Err(HostError::ProtocolUnsupported { .. })));
    }

    #[tokio::test]
    async fn publish_fans_out_including_sender() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");
        let beta = network.host("beta");

        let mut alpha_sub = alpha.subscribe("updates").unwrap();
        let mut beta_sub = beta.subscribe("updates").unwrap();

        alpha.publish("updates", b"news".to_vec()).await.unwrap();

        let received = beta_sub.next().await.unwrap();
        assert_eq!(received.sender.as_str(), "alpha");
        assert_eq!(received.data, b"news");

        // Floodsub echoes the publisher's own message back to it.
        let echoed = alpha_sub.next().await.unwrap();
        assert_eq!(echoed.sender.as_str(), "alpha");
    }

    #[tokio::test]
    async fn announce_reaches_other_hosts_only() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");
        let beta = network.host("beta");

        let (alpha_tx, mut alpha_rx) = mpsc::channel(4);
        let (beta_tx, mut beta_rx) = mpsc::channel(4);
        alpha.start_discovery("tag", alpha_tx).await.unwrap();
        beta.start_discovery("tag", beta_tx).await.unwrap();

        network.announce(&PeerId::new("beta")).await;

        let found = alpha_rx.recv().await.unwrap();
        assert_eq!(found.id.as_str(), "beta");
        assert!(beta_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_fires_handlers_on_both_sides() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");
        let beta = network.host("beta");

        alpha
            .connect(&PeerInfo::new(PeerId::new("beta")))
            .await
            .unwrap();
        assert_eq!(alpha.peers(), vec![PeerId::new("beta")]);

        let (tx, mut rx) = mpsc::channel(1);
        alpha.notify_disconnect(Arc::new(move |peer| {
            tx.try_send(peer).expect("deliver disconnect");
        }));

        network.disconnect(&PeerId::new("alpha"), &PeerId::new("beta"));

        assert_eq!(rx.recv().await.unwrap().as_str(), "beta");
        assert!(alpha.peers().is_empty());
        assert!(beta.peers().is_empty());
    }

    #[tokio::test]
    async fn connect_refuses_beyond_high_watermark() {
        let network = MemoryNetwork::new();
        let config = HostConfig {
            high_watermark: 1,
            ..HostConfig::default()
        };
        let alpha = network.host_with_config("alpha", config);
        let _beta = network.host("beta");
        let _gamma = network.host("gamma");

        alpha
            .connect(&PeerInfo::new(PeerId::new("beta")))
            .await
            .unwrap();
        let result = alpha.connect(&PeerInfo::new(PeerId::new("gamma"))).await;
        assert!(matches!(result, Err(HostError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn closed_host_refuses_operations() {
        let network = MemoryNetwork::new();
        let alpha = network.host("alpha");
        let _beta = network.host("beta");

        alpha.close().await.unwrap();

        assert!(matches!(alpha.listen().await, Err(HostError::Closed)));
        assert!(matches!(
            alpha.connect(&PeerInfo::new(PeerId::new("beta"))).await,
            Err(HostError::Closed)
        ));
        assert!(matches!(alpha.subscribe("updates"), Err(HostError::Closed)));
    }
}
