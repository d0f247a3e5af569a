//! The shared handle threaded through every WebSocket and HTTP handler:
//! store + registry + fan-out + config, all behind one `Arc` clone.

use crate::config::Config;
use crate::fanout::Fanout;
use crate::registry::Registry;
use crate::store::{InMemoryStore, Store};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct BrokerState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<Registry>,
    pub fanout: Fanout,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl BrokerState {
    pub fn new(config: Config) -> Self {
        let store = InMemoryStore::new();
        let registry = Arc::new(Registry::new());
        let fanout = Fanout::new(registry.clone());
        Self { store, registry, fanout, config: Arc::new(config), started_at: Instant::now() }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
