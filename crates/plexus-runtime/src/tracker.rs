//! Correlation of in-flight requests to their responses.

use dashmap::DashMap;
use serde_json::value::RawValue;
use tokio::sync::oneshot;

use plexus_proto::RequestId;

use crate::error::RuntimeError;

/// Outcome delivered to a waiting `send` call: the encoded response data on
/// success, or the failure to surface.
pub(crate) type Outcome = Result<Option<Box<RawValue>>, RuntimeError>;

/// Table of requests awaiting their responses.
///
/// The oneshot sender stored per id doubles as the single-winner latch:
/// whoever removes the entry first owns the completion, and the loser finds
/// the table empty and backs off. A response arriving for an id that has
/// already timed out is therefore dropped without waking anyone.
#[derive(Default)]
pub(crate) struct RequestTable {
    pending: DashMap<RequestId, oneshot::Sender<Outcome>>,
}

impl RequestTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns the receiver its outcome arrives on.
    pub(crate) fn track(&self, id: RequestId) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Completes a request if it is still pending.
    ///
    /// Returns `false` when the id is unknown, either because the request
    /// already timed out or because it was never tracked here.
    pub(crate) fn complete(&self, id: &RequestId, outcome: Outcome) -> bool {
        match self.pending.remove(id) {
            Some((_, tx)) => {
                // The receiver may already have been dropped by a caller
                // giving up; the outcome is discarded in that case.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Abandons a request, dropping its sender.
    ///
    /// Returns `false` if the request was already completed.
    pub(crate) fn cancel(&self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Number of requests currently awaiting responses.
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
