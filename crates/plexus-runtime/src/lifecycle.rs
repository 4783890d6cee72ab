//! Peer lifecycle: discovery intake and connection teardown.
//!
//! Discovered peers are dialled, an RPC stream is opened and handed to the
//! worker registry, and the connected peer set is published. Disconnect
//! notifications from the host tear the per-peer worker down again. Failures
//! along the way are logged and the peer skipped; discovery will surface it
//! again.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use plexus_host::{DisconnectHandler, Host, PeerId, PeerInfo};
use plexus_proto::protocol;

use crate::worker::PeerWorkers;

pub(crate) struct PeerLifecycle {
    host: Arc<dyn Host>,
    workers: Arc<PeerWorkers>,
    peer_list: watch::Sender<Vec<PeerId>>,
}

impl PeerLifecycle {
    pub(crate) fn new(
        host: Arc<dyn Host>,
        workers: Arc<PeerWorkers>,
        peer_list: watch::Sender<Vec<PeerId>>,
    ) -> Self {
        Self {
            host,
            workers,
            peer_list,
        }
    }

    /// Drives discovered peers into connections until cancelled.
    pub(crate) async fn run(
        self,
        mut discovered: mpsc::Receiver<PeerInfo>,
        cancel: CancellationToken,
    ) {
        info!("starting peer discovery processor");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("stopping peer discovery processor");
                    return;
                }
                next = discovered.recv() => {
                    let Some(info) = next else {
                        debug!("discovery intake closed");
                        return;
                    };
                    self.connect_peer(info).await;
                }
            }
        }
    }

    async fn connect_peer(&self, info: PeerInfo) {
        debug!(peer = %info.id, "new peer, connecting");

        if let Err(e) = self.host.connect(&info).await {
            error!(peer = %info.id, error = %e, "connection failed");
            return;
        }

        match self.host.open_stream(&info.id, protocol::RPC).await {
            Ok(stream) => {
                self.workers.adopt_stream(stream);
                debug!(peer = %info.id, "connected");
                self.peer_list.send_replace(self.host.peers());
            }
            Err(e) => error!(peer = %info.id, error = %e, "stream open failed"),
        }
    }
}

/// Builds the disconnect callback installed on the host: pop the peer's
/// worker, cancel it and publish the shrunken peer set.
pub(crate) fn disconnect_handler(
    host: Arc<dyn Host>,
    workers: Arc<PeerWorkers>,
    peer_list: watch::Sender<Vec<PeerId>>,
) -> DisconnectHandler {
    Arc::new(move |peer: PeerId| {
        if workers.remove(&peer) {
            peer_list.send_replace(host.peers());
        }
    })
}
