//! Broadcast topic dispatch.
//!
//! A single loop drains the host's subscription. Messages published by the
//! local peer are filtered out; every other message is decoded and handed to
//! its typed handler on a short-lived task. Broadcast is fire-and-forget:
//! handler failures are logged and dropped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use plexus_host::{PeerId, PubSubMessage, Subscription};
use plexus_proto::{codec, PubSubEnvelope};

use crate::registry::{HandlerRegistry, InvokeError};

pub(crate) struct PubSubDispatcher {
    registry: Arc<HandlerRegistry>,
    local_peer: PeerId,
}

impl PubSubDispatcher {
    pub(crate) fn new(registry: Arc<HandlerRegistry>, local_peer: PeerId) -> Self {
        Self {
            registry,
            local_peer,
        }
    }

    /// Drains the subscription until cancelled or the host drops it.
    pub(crate) async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        cancel: CancellationToken,
    ) {
        info!("starting pubsub processor");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("stopping pubsub processor");
                    return;
                }
                next = subscription.next() => {
                    let Some(message) = next else {
                        debug!("pubsub subscription ended");
                        return;
                    };

                    if message.sender == self.local_peer {
                        continue;
                    }

                    // One task per message; a panicking handler takes down
                    // its task, not this loop.
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        dispatcher.deliver(message).await;
                    });
                }
            }
        }
    }

    async fn deliver(&self, message: PubSubMessage) {
        let envelope: PubSubEnvelope = match codec::decode(&message.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(sender = %message.sender, error = %e, "failed to decode pubsub message");
                return;
            }
        };

        let handler = match self.registry.pubsub(&envelope.kind) {
            Ok(handler) => handler,
            Err(e) => {
                error!(sender = %message.sender, error = %e, "failed to process pubsub message");
                return;
            }
        };

        match handler.invoke(message.sender.clone(), envelope.payload).await {
            Ok(()) => {}
            Err(InvokeError::Decode(error)) => {
                error!(sender = %message.sender, kind = %envelope.kind, error = %error, "failed to decode pubsub payload");
            }
            Err(InvokeError::Handler(error)) => {
                error!(sender = %message.sender, kind = %envelope.kind, error = %error, "pubsub handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerError;
    use serde::Deserialize;
    use tokio::sync::mpsc;

    #[derive(Deserialize, serde::Serialize, Clone)]
    struct Note {
        text: String,
    }

    fn encoded(kind: &str, payload: &Note) -> Vec<u8> {
        let envelope = PubSubEnvelope::new(kind, codec::to_raw(payload).unwrap());
        codec::encode(&envelope).unwrap()
    }

    fn dispatcher_capturing_notes() -> (Arc<PubSubDispatcher>, mpsc::Receiver<(PeerId, Note)>) {
        let (tx, rx) = mpsc::channel(8);
        let mut registry = HandlerRegistry::new();
        registry
            .register_pubsub("note", move |peer, note: Note| {
                let tx = tx.clone();
                async move {
                    tx.send((peer, note)).await.map_err(|e| -> HandlerError {
                        e.to_string().into()
                    })
                }
            })
            .unwrap();

        (
            Arc::new(PubSubDispatcher::new(
                Arc::new(registry),
                PeerId::new("local"),
            )),
            rx,
        )
    }

    #[tokio::test]
    async fn message_reaches_typed_handler() {
        let (dispatcher, mut rx) = dispatcher_capturing_notes();

        dispatcher
            .deliver(PubSubMessage {
                sender: PeerId::new("remote"),
                data: encoded("note", &Note { text: "hi".into() }),
            })
            .await;

        let (peer, note) = rx.recv().await.unwrap();
        assert_eq!(peer.as_str(), "remote");
        assert_eq!(note.text, "hi");
    }

    #[tokio::test]
    async fn unknown_type_and_garbage_are_dropped() {
        let (dispatcher, mut rx) = dispatcher_capturing_notes();

        dispatcher
            .deliver(PubSubMessage {
                sender: PeerId::new("remote"),
                data: encoded("unregistered", &Note { text: "hi".into() }),
            })
            .await;
        dispatcher
            .deliver(PubSubMessage {
                sender: PeerId::new("remote"),
                data: b"garbage".to_vec(),
            })
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn self_echo_is_filtered_by_the_loop() {
        let (dispatcher, mut rx) = dispatcher_capturing_notes();

        let (tx, sub_rx) = mpsc::channel(8);
        let subscription = Subscription::new(sub_rx);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&dispatcher).run(subscription, cancel.clone()));

        tx.send(PubSubMessage {
            sender: PeerId::new("local"),
            data: encoded("note", &Note { text: "own".into() }),
        })
        .await
        .unwrap();
        tx.send(PubSubMessage {
            sender: PeerId::new("remote"),
            data: encoded("note", &Note { text: "other".into() }),
        })
        .await
        .unwrap();

        // Only the remote message is delivered.
        let (peer, note) = rx.recv().await.unwrap();
        assert_eq!(peer.as_str(), "remote");
        assert_eq!(note.text, "other");
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }
}
