//! Typed client handle for a remote peer.
//!
//! Wraps a peer id together with the local [`Manager`] and adds the
//! bring-up probe: a freshly connected peer may not have finished
//! registering its handlers yet, so [`RpcClient::connect`] pings with
//! retries before handing the client out. Only the probe's result is
//! consulted; there is no other readiness signal.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use plexus_host::PeerId;
use plexus_proto::{PingRequest, PingResponse, PING_METHOD};

use crate::error::Result;
use crate::manager::Manager;

/// Handle for issuing RPCs to one remote peer.
pub struct RpcClient<'a> {
    manager: &'a Manager,
    peer: PeerId,
}

impl<'a> RpcClient<'a> {
    /// Probes the peer until it answers ping, then returns the client.
    ///
    /// Retries up to the configured attempt budget, spaced by the configured
    /// backoff, and returns the final probe error on exhaustion. This
    /// tolerates the race between the peer's stream coming up and its
    /// handlers being registered.
    pub async fn connect(manager: &'a Manager, peer: PeerId) -> Result<RpcClient<'a>> {
        let client = Self { manager, peer };
        let attempts = manager.config().ready_probe_attempts.max(1);
        let backoff = manager.config().ready_probe_backoff;

        let mut tries = 0;
        loop {
            match client.ping("probe").await {
                Ok(_) => return Ok(client),
                Err(e) => {
                    tries += 1;
                    if tries >= attempts {
                        return Err(e);
                    }
                    debug!(peer = %client.peer, attempt = tries, error = %e, "peer not ready, retrying probe");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// The remote peer this client talks to.
    #[must_use]
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Issues the built-in readiness probe.
    pub async fn ping(&self, msg: &str) -> Result<PingResponse> {
        self.manager
            .send(&self.peer, PING_METHOD, &PingRequest::new(msg))
            .await
    }

    /// Calls a remote method and decodes its response.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.manager.send(&self.peer, method, request).await
    }
}
