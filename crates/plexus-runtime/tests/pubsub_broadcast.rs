//! Broadcast fan-out scenarios over the in-process network.

mod common;

use std::time::Duration;

use common::TestMesh;
use plexus_runtime::{HandlerError, Manager, PeerId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct EchoPayload {
    text: String,
}

/// Starts a node whose `echo` broadcasts land on the returned channel.
async fn echo_node(
    mesh: &TestMesh,
    name: &str,
) -> (Manager, mpsc::Receiver<(PeerId, EchoPayload)>) {
    let (tx, rx) = mpsc::channel(16);
    let mut node = mesh.node(name);
    node.register_pubsub("echo", move |peer, payload: EchoPayload| {
        let tx = tx.clone();
        async move {
            tx.send((peer, payload))
                .await
                .map_err(|e| -> HandlerError { e.to_string().into() })
        }
    })
    .unwrap();
    node.start().await.unwrap();
    (node, rx)
}

#[tokio::test]
async fn broadcast_reaches_every_subscriber_except_the_sender() {
    let mesh = TestMesh::new();
    let (alpha, mut alpha_rx) = echo_node(&mesh, "alpha").await;
    let (_beta, mut beta_rx) = echo_node(&mesh, "beta").await;
    let (_gamma, mut gamma_rx) = echo_node(&mesh, "gamma").await;

    alpha
        .broadcast("echo", &EchoPayload { text: "hi".into() })
        .await
        .unwrap();

    for rx in [&mut beta_rx, &mut gamma_rx] {
        let (sender, payload) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("broadcast delivered")
            .unwrap();
        assert_eq!(sender.as_str(), "alpha");
        assert_eq!(payload, EchoPayload { text: "hi".into() });
    }

    // The sender's own handler is never invoked.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(alpha_rx.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_of_an_unregistered_type_is_dropped() {
    let mesh = TestMesh::new();
    let (alpha, _alpha_rx) = echo_node(&mesh, "alpha").await;
    let (_beta, mut beta_rx) = echo_node(&mesh, "beta").await;

    alpha
        .broadcast("unregistered", &EchoPayload { text: "hi".into() })
        .await
        .unwrap();
    alpha
        .broadcast("echo", &EchoPayload { text: "after".into() })
        .await
        .unwrap();

    // The unknown type is logged and dropped; the bus keeps working.
    let (_, payload) = tokio::time::timeout(Duration::from_secs(1), beta_rx.recv())
        .await
        .expect("broadcast delivered")
        .unwrap();
    assert_eq!(payload.text, "after");
}

#[tokio::test]
async fn failing_subscriber_does_not_stop_the_bus() {
    let mesh = TestMesh::new();
    let (alpha, _alpha_rx) = echo_node(&mesh, "alpha").await;

    let mut beta = mesh.node("beta");
    beta.register_pubsub("echo", |_peer, _payload: EchoPayload| async move {
        Err::<(), HandlerError>("subscriber failure".into())
    })
    .unwrap();
    beta.start().await.unwrap();

    let (_gamma, mut gamma_rx) = echo_node(&mesh, "gamma").await;

    alpha
        .broadcast("echo", &EchoPayload { text: "one".into() })
        .await
        .unwrap();
    alpha
        .broadcast("echo", &EchoPayload { text: "two".into() })
        .await
        .unwrap();

    // Gamma receives both despite beta's handler failing each time. The
    // per-message dispatch tasks race, so collect without assuming order.
    let mut seen = Vec::new();
    for _ in 0..2 {
        let (_, payload) = tokio::time::timeout(Duration::from_secs(1), gamma_rx.recv())
            .await
            .expect("broadcast delivered")
            .unwrap();
        seen.push(payload.text);
    }
    seen.sort();
    assert_eq!(seen, ["one", "two"]);
}
