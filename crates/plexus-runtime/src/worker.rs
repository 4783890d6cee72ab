//! Per-peer stream workers.
//!
//! Each peer gets at most one worker: a reader/writer task pair owning one
//! RPC stream. The writer has exclusive write access to the stream and
//! drains a bounded queue; the reader splits the stream into frames and
//! hands each one to the dispatcher on a short-lived task. Both tasks exit
//! on cancellation or when the stream goes down.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use plexus_host::{HostStream, PeerId, StreamIo};
use plexus_proto::{codec, framing, FrameReader, RpcEnvelope};

use crate::dispatch::RpcDispatcher;

struct PeerWorker {
    write_queue: mpsc::Sender<RpcEnvelope>,
    cancel: CancellationToken,
}

/// Registry of running workers, one per connected peer.
pub(crate) struct PeerWorkers {
    workers: DashMap<PeerId, PeerWorker>,
    dispatcher: Arc<RpcDispatcher>,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl PeerWorkers {
    pub(crate) fn new(
        dispatcher: Arc<RpcDispatcher>,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workers: DashMap::new(),
            dispatcher,
            queue_capacity,
            cancel,
        }
    }

    /// Adopts a freshly negotiated stream, spawning the worker pair unless
    /// one is already running for the peer. A losing stream is dropped; the
    /// existing worker keeps its stream.
    pub(crate) fn adopt_stream(&self, stream: HostStream) {
        let (peer, io) = stream.into_parts();

        match self.workers.entry(peer.clone()) {
            Entry::Occupied(_) => {
                debug!(peer = %peer, "msg processor already running, dropping stream");
            }
            Entry::Vacant(slot) => {
                info!(peer = %peer, "starting msg processor");

                let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
                let cancel = self.cancel.child_token();
                slot.insert(PeerWorker {
                    write_queue: queue_tx.clone(),
                    cancel: cancel.clone(),
                });

                let (read_half, write_half) = tokio::io::split(io);
                tokio::spawn(write_loop(
                    write_half,
                    queue_rx,
                    cancel.clone(),
                    peer.clone(),
                ));
                tokio::spawn(read_loop(
                    read_half,
                    queue_tx,
                    cancel,
                    peer,
                    Arc::clone(&self.dispatcher),
                ));
            }
        }
    }

    /// Queue handle for a peer's writer, if a worker is running.
    pub(crate) fn write_queue(&self, peer: &PeerId) -> Option<mpsc::Sender<RpcEnvelope>> {
        self.workers
            .get(peer)
            .map(|worker| worker.write_queue.clone())
    }

    /// Stops the worker for a peer. Returns `true` if one was running.
    pub(crate) fn remove(&self, peer: &PeerId) -> bool {
        match self.workers.remove(peer) {
            Some((_, worker)) => {
                info!(peer = %peer, "stopping msg processor");
                worker.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops every worker and clears the registry.
    pub(crate) fn shutdown(&self) {
        for entry in self.workers.iter() {
            entry.value().cancel.cancel();
        }
        self.workers.clear();
    }
}

/// Writer task: drains the queue, one framed write per envelope.
///
/// Write failures are logged and the worker kept alive; the host reports
/// the disconnect if the stream is actually gone.
async fn write_loop(
    mut io: WriteHalf<Box<dyn StreamIo>>,
    mut queue: mpsc::Receiver<RpcEnvelope>,
    cancel: CancellationToken,
    peer: PeerId,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(peer = %peer, "stopping rpc msg writer");
                return;
            }
            next = queue.recv() => {
                let Some(envelope) = next else {
                    debug!(peer = %peer, "write queue closed, stopping rpc msg writer");
                    return;
                };

                let record = match codec::encode(&envelope) {
                    Ok(record) => record,
                    Err(e) => {
                        error!(peer = %peer, id = %envelope.id, error = %e, "failed to encode msg");
                        continue;
                    }
                };

                if let Err(e) = framing::write_frame(&mut io, &record).await {
                    error!(peer = %peer, id = %envelope.id, error = %e, "failed to send msg");
                    continue;
                }
            }
        }
    }
}

/// Reader task: frames the stream and dispatches each frame on its own
/// task so a slow handler cannot stall reading.
async fn read_loop(
    io: ReadHalf<Box<dyn StreamIo>>,
    replies: mpsc::Sender<RpcEnvelope>,
    cancel: CancellationToken,
    peer: PeerId,
    dispatcher: Arc<RpcDispatcher>,
) {
    let mut frames = FrameReader::new(io);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(peer = %peer, "stopping rpc msg reader");
                return;
            }
            next = frames.next_frame() => {
                match next {
                    Ok(Some(frame)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let peer = peer.clone();
                        let replies = replies.clone();
                        tokio::spawn(async move {
                            dispatcher.dispatch(peer, &frame, replies).await;
                        });
                    }
                    Ok(None) => {
                        debug!(peer = %peer, "rpc stream closed");
                        return;
                    }
                    Err(e) => {
                        error!(peer = %peer, error = %e, "rpc stream read failed");
                        return;
                    }
                }
            }
        }
    }
}
