//! Fan-out Engine (C5): pushes encoded frames to every handle the
//! registry has for a topic, with an optional excluded connection
//! (the publisher, when it is also subscribed — see `spec.md` §9).

use crate::protocol::Outbound;
use crate::registry::Registry;
use std::sync::Arc;
use tracing::{trace, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Fanout {
    registry: Arc<Registry>,
}

impl Fanout {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Encodes `envelope` once and sends it to every live handle on
    /// `topic`, skipping `exclude` if given. Returns how many handles
    /// actually received it (a dead channel doesn't count).
    pub fn broadcast(&self, topic: &str, envelope: &Outbound, exclude: Option<Uuid>) -> usize {
        let frame = match serde_json::to_string(envelope) {
            Ok(f) => f,
            Err(e) => {
                warn!(topic, error = %e, "failed to encode outbound envelope");
                return 0;
            }
        };
        let handles = self.registry.snapshot(topic);
        let mut delivered = 0;
        for handle in handles {
            if Some(handle.id) == exclude {
                continue;
            }
            if handle.send(frame.clone()) {
                delivered += 1;
            } else {
                trace!(topic, connection_id = %handle.id, "dropped frame, evicting dead handle");
                self.registry.detach(topic, handle.id);
            }
        }
        delivered
    }

    /// Admin-triggered notice that a topic was deleted, broadcast to every
    /// connection still attached to it, then evicts the topic's routing
    /// set so no further publishes can reach them. Callable from the HTTP
    /// admin path as readily as from the WS dispatch path — the fan-out
    /// primitive has no notion of "which transport asked."
    pub fn notify_topic_deleted(&self, topic: &str) -> usize {
        let envelope = Outbound::topic_deleted(topic);
        let frame = match serde_json::to_string(&envelope) {
            Ok(f) => f,
            Err(_) => return 0,
        };
        let handles = self.registry.evict_topic(topic);
        let mut delivered = 0;
        for handle in handles {
            if handle.send(frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn broadcast_excludes_the_publisher() {
        let registry = Arc::new(Registry::new());
        let fanout = Fanout::new(registry.clone());

        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let a = ConnectionHandle::new(Uuid::new_v4(), tx_a);
        let b = ConnectionHandle::new(Uuid::new_v4(), tx_b);
        registry.attach("weather", a.clone());
        registry.attach("weather", b.clone());

        let envelope = Outbound::topic_deleted("weather");
        let delivered = fanout.broadcast("weather", &envelope, Some(a.id));
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn broadcast_evicts_a_handle_whose_receiver_is_gone() {
        let registry = Arc::new(Registry::new());
        let fanout = Fanout::new(registry.clone());

        let (tx, rx) = unbounded_channel();
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        registry.attach("weather", handle);
        drop(rx); // simulates the outbound task having already died

        let envelope = Outbound::topic_deleted("weather");
        let delivered = fanout.broadcast("weather", &envelope, None);
        assert_eq!(delivered, 0);
        assert_eq!(registry.live_count("weather"), 0);
    }

    #[test]
    fn notify_topic_deleted_evicts_and_delivers() {
        let registry = Arc::new(Registry::new());
        let fanout = Fanout::new(registry.clone());
        let (tx, mut rx) = unbounded_channel();
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        registry.attach("weather", handle);

        let delivered = fanout.notify_topic_deleted("weather");
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert_eq!(registry.live_count("weather"), 0);
    }
}
