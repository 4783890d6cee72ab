//! Common test utilities for runtime integration tests.

use std::sync::Arc;
use std::time::Duration;

use plexus_host::memory::MemoryNetwork;
use plexus_host::PeerId;
use plexus_runtime::{Manager, RuntimeConfig};

/// Configuration with short timeouts to keep test wall-clock time down.
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        request_timeout: Duration::from_millis(500),
        ready_probe_backoff: Duration::from_millis(20),
        ..RuntimeConfig::default()
    }
}

/// A set of nodes wired together over an in-process network.
pub struct TestMesh {
    pub network: MemoryNetwork,
}

#[allow(dead_code)]
impl TestMesh {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
        }
    }

    /// Creates a node with the fast test configuration.
    pub fn node(&self, name: &str) -> Manager {
        self.node_with_config(name, fast_config())
    }

    /// Creates a node with explicit configuration.
    pub fn node_with_config(&self, name: &str, config: RuntimeConfig) -> Manager {
        Manager::new(Arc::new(self.network.host(name)), config)
    }

    /// Announces a peer so that every running node dials it.
    pub async fn announce(&self, target: &str) {
        self.network.announce(&PeerId::new(target)).await;
    }

    /// Severs the connection between two peers.
    pub fn disconnect(&self, a: &str, b: &str) {
        self.network.disconnect(&PeerId::new(a), &PeerId::new(b));
    }
}
