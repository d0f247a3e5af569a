//! Topic Registry (C2): the volatile routing table of live connection
//! handles per topic. Unlike the store (C1), nothing here survives a
//! disconnect without an explicit `detach` — this is a cache of "who do
//! I push frames to right now," not a record of truth.

use dashmap::DashMap;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// A routable handle to one live WebSocket connection's outbound task.
/// Cloned freely; equality and hashing are by connection id only, so a
/// handle can sit in a `HashSet` alongside the registry's per-topic entries
/// without the sender itself needing to implement `Eq`.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub sender: UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(id: Uuid, sender: UnboundedSender<String>) -> Self {
        Self { id, sender }
    }

    pub fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// `DashMap<topic, set of handles>`, sharded the same way the teacher's
/// `common::concurrent_map` recommends for hot read/write paths.
#[derive(Default)]
pub struct Registry {
    topics: DashMap<String, HashSet<ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle` to `topic`'s routing set. Idempotent: attaching the
    /// same connection twice is a no-op on the second call, matching the
    /// store's idempotent `upsert_subscription`.
    pub fn attach(&self, topic: &str, handle: ConnectionHandle) {
        self.topics.entry(topic.to_string()).or_default().insert(handle);
    }

    /// Removes `connection_id` from `topic`'s routing set. Returns `true`
    /// if it was present. Drops the topic entry entirely once empty so the
    /// registry doesn't accumulate dead topics.
    pub fn detach(&self, topic: &str, connection_id: Uuid) -> bool {
        let Some(mut set) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = set.retain_removed(connection_id);
        let is_empty = set.is_empty();
        drop(set);
        if is_empty {
            self.topics.remove(topic);
        }
        removed
    }

    /// Removes `connection_id` from every topic it's attached to. Used on
    /// disconnect when the handler doesn't track its own subscriptions and
    /// wants a single sweep, or as a belt-and-braces cleanup alongside the
    /// handler's tracked set.
    pub fn detach_all(&self, connection_id: Uuid) {
        let mut empty_topics = Vec::new();
        for mut entry in self.topics.iter_mut() {
            entry.value_mut().retain_removed(connection_id);
            if entry.value().is_empty() {
                empty_topics.push(entry.key().clone());
            }
        }
        for topic in empty_topics {
            self.topics.remove(&topic);
        }
    }

    /// A snapshot of the handles currently attached to `topic`, for the
    /// fan-out engine to iterate over without holding the shard lock while
    /// it sends.
    pub fn snapshot(&self, topic: &str) -> Vec<ConnectionHandle> {
        self.topics
            .get(topic)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn live_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|set| set.len()).unwrap_or(0)
    }

    /// Drops an entire topic's routing set, e.g. after an admin deletes
    /// the topic. Returns the handles that were attached so the caller can
    /// notify them before the set disappears.
    pub fn evict_topic(&self, topic: &str) -> Vec<ConnectionHandle> {
        self.topics
            .remove(topic)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default()
    }
}

trait RetainRemoved {
    fn retain_removed(&mut self, id: Uuid) -> bool;
}

impl RetainRemoved for HashSet<ConnectionHandle> {
    fn retain_removed(&mut self, id: Uuid) -> bool {
        let before = self.len();
        self.retain(|h| h.id != id);
        self.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn handle() -> (ConnectionHandle, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    #[test]
    fn attach_is_idempotent() {
        let registry = Registry::new();
        let (h, _rx) = handle();
        registry.attach("weather", h.clone());
        registry.attach("weather", h.clone());
        assert_eq!(registry.live_count("weather"), 1);
    }

    #[test]
    fn detach_removes_empty_topic() {
        let registry = Registry::new();
        let (h, _rx) = handle();
        registry.attach("weather", h.clone());
        assert!(registry.detach("weather", h.id));
        assert_eq!(registry.live_count("weather"), 0);
        assert!(registry.snapshot("weather").is_empty());
    }

    #[test]
    fn detach_all_sweeps_every_topic() {
        let registry = Registry::new();
        let (h, _rx) = handle();
        registry.attach("t1", h.clone());
        registry.attach("t2", h.clone());
        registry.detach_all(h.id);
        assert_eq!(registry.live_count("t1"), 0);
        assert_eq!(registry.live_count("t2"), 0);
    }

    #[test]
    fn evict_topic_returns_attached_handles() {
        let registry = Registry::new();
        let (h1, _rx1) = handle();
        let (h2, _rx2) = handle();
        registry.attach("weather", h1.clone());
        registry.attach("weather", h2.clone());
        let evicted = registry.evict_topic("weather");
        assert_eq!(evicted.len(), 2);
        assert_eq!(registry.live_count("weather"), 0);
    }
}
