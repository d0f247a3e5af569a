//! Durable Store (C1): the authoritative record of topics, connections,
//! subscriptions, and messages — the thing C2 (the registry) is a
//! volatile, routing-only shadow of.
//!
//! This implementation is in-memory: `DashMap`s guarded per-shard,
//! following the teacher's own preference for `DashMap` over a single
//! `Arc<RwLock<HashMap>>` (see the teacher's `common::concurrent_map`
//! module). "Durable" here means "authoritative," not "survives a
//! process restart" — there is no on-disk engine in scope, see
//! `DESIGN.md`.

pub mod models;

use crate::error::{BrokerError, Result};
use chrono::Utc;
use dashmap::DashMap;
use models::{Connection, Message, Subscription, Topic};
use std::sync::Arc;
use uuid::Uuid;

/// The durable-store interface. A single production implementation
/// (`InMemoryStore`) exists; the trait exists so the broker core never
/// couples its handlers to a concrete storage strategy, matching §9's
/// note that the store is "the only authority on 'does this subscription
/// exist'."
pub trait Store: Send + Sync {
    fn get_or_create_topic(&self, name: &str) -> Result<Topic>;
    fn get_topic(&self, name: &str) -> Result<Option<Topic>>;
    fn create_topic(&self, name: &str, metadata: serde_json::Value) -> Result<Topic>;
    fn delete_topic(&self, name: &str) -> Result<bool>;
    fn list_topics(&self) -> Result<Vec<Topic>>;

    fn create_connection(
        &self,
        id: Uuid,
        remote_addr: Option<String>,
        user_agent: String,
    ) -> Result<Connection>;
    fn touch_connection(&self, id: Uuid) -> Result<()>;
    /// Cascades subscription deletion; returns the topics the connection
    /// had an active subscription to, so the caller can refresh their
    /// subscriber counts.
    fn delete_connection(&self, id: Uuid) -> Result<Vec<String>>;

    /// Returns `(created, subscription)` — `created` is `false` when this
    /// re-activates an existing row.
    fn upsert_subscription(&self, conn_id: Uuid, topic: &str) -> Result<(bool, Subscription)>;
    /// Returns `true` if an active subscription existed and was deactivated.
    fn deactivate_subscription(&self, conn_id: Uuid, topic: &str) -> Result<bool>;
    fn count_subscriptions(&self, topic: &str) -> Result<usize>;
    fn topic_subscribers(&self, topic: &str) -> Result<Vec<Subscription>>;
    fn connection(&self, id: Uuid) -> Result<Option<Connection>>;

    fn append_message(
        &self,
        topic: &str,
        publisher_conn_id: Option<Uuid>,
        payload: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<Uuid>;
    /// Newest-first.
    fn recent_messages(&self, topic: &str, n: usize) -> Result<Vec<Message>>;
    /// Newest-first page starting `offset` rows in, plus the topic's total
    /// message count — backs the admin `/topics/<name>/messages/` endpoint's
    /// `total_count` field.
    fn messages_page(&self, topic: &str, limit: usize, offset: usize) -> Result<(Vec<Message>, u64)>;
    fn message_count(&self, topic: &str) -> Result<u64>;
}

#[derive(Default)]
pub struct InMemoryStore {
    topics: DashMap<String, Topic>,
    connections: DashMap<Uuid, Connection>,
    subscriptions: DashMap<(Uuid, String), Subscription>,
    messages: DashMap<String, Vec<Message>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn recount_subscribers(&self, topic: &str) {
        let count = self.count_subscriptions(topic).unwrap_or(0);
        if let Some(mut t) = self.topics.get_mut(topic) {
            t.subscriber_count = count;
        }
    }
}

impl Store for InMemoryStore {
    fn get_or_create_topic(&self, name: &str) -> Result<Topic> {
        if let Some(existing) = self.topics.get(name) {
            return Ok(existing.clone());
        }
        let topic = Topic::new(name, serde_json::json!({}));
        let entry = self
            .topics
            .entry(name.to_string())
            .or_insert_with(|| topic);
        Ok(entry.clone())
    }

    fn get_topic(&self, name: &str) -> Result<Option<Topic>> {
        Ok(self.topics.get(name).map(|t| t.clone()))
    }

    fn create_topic(&self, name: &str, metadata: serde_json::Value) -> Result<Topic> {
        if self.topics.contains_key(name) {
            return Err(BrokerError::AlreadyExists(format!(
                "topic '{name}' already exists"
            )));
        }
        let topic = Topic::new(name, metadata);
        self.topics.insert(name.to_string(), topic.clone());
        Ok(topic)
    }

    fn delete_topic(&self, name: &str) -> Result<bool> {
        let Some((_, _)) = self.topics.remove(name) else {
            return Ok(false);
        };
        self.subscriptions.retain(|(_, t), _| t != name);
        self.messages.remove(name);
        Ok(true)
    }

    fn list_topics(&self) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self.topics.iter().map(|e| e.value().clone()).collect();
        topics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(topics)
    }

    fn create_connection(
        &self,
        id: Uuid,
        remote_addr: Option<String>,
        user_agent: String,
    ) -> Result<Connection> {
        let conn = Connection::new(id, remote_addr, user_agent);
        self.connections.insert(id, conn.clone());
        Ok(conn)
    }

    fn touch_connection(&self, id: Uuid) -> Result<()> {
        if let Some(mut c) = self.connections.get_mut(&id) {
            c.touch();
        }
        Ok(())
    }

    fn delete_connection(&self, id: Uuid) -> Result<Vec<String>> {
        self.connections.remove(&id);
        let mut affected = Vec::new();
        let keys: Vec<(Uuid, String)> = self
            .subscriptions
            .iter()
            .filter(|e| e.key().0 == id)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            if let Some((_, sub)) = self.subscriptions.remove(&key) {
                if sub.is_active {
                    affected.push(sub.topic.clone());
                }
            }
        }
        for topic in affected.iter() {
            self.recount_subscribers(topic);
        }
        Ok(affected)
    }

    fn upsert_subscription(&self, conn_id: Uuid, topic: &str) -> Result<(bool, Subscription)> {
        let key = (conn_id, topic.to_string());
        let created = !self.subscriptions.contains_key(&key);
        let sub = self
            .subscriptions
            .entry(key)
            .and_modify(|s| s.is_active = true)
            .or_insert_with(|| Subscription {
                connection_id: conn_id,
                topic: topic.to_string(),
                subscribed_at: Utc::now(),
                is_active: true,
            })
            .clone();
        self.recount_subscribers(topic);
        Ok((created, sub))
    }

    fn deactivate_subscription(&self, conn_id: Uuid, topic: &str) -> Result<bool> {
        let key = (conn_id, topic.to_string());
        let existed = match self.subscriptions.get_mut(&key) {
            Some(mut sub) if sub.is_active => {
                sub.is_active = false;
                true
            }
            _ => false,
        };
        if existed {
            self.recount_subscribers(topic);
        }
        Ok(existed)
    }

    fn count_subscriptions(&self, topic: &str) -> Result<usize> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|e| e.key().1 == topic && e.value().is_active)
            .count())
    }

    fn topic_subscribers(&self, topic: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|e| e.key().1 == topic && e.value().is_active)
            .map(|e| e.value().clone())
            .collect())
    }

    fn connection(&self, id: Uuid) -> Result<Option<Connection>> {
        Ok(self.connections.get(&id).map(|c| c.clone()))
    }

    fn append_message(
        &self,
        topic: &str,
        publisher_conn_id: Option<Uuid>,
        payload: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<Uuid> {
        if !self.topics.contains_key(topic) {
            return Err(BrokerError::not_found(format!("topic '{topic}' not found")));
        }
        let id = Uuid::new_v4();
        let published_at = Utc::now();
        let message = Message {
            id,
            topic: topic.to_string(),
            publisher_connection_id: publisher_conn_id,
            payload,
            published_at,
            delivery_attempts: 0,
            max_delivery_attempts: 3,
            metadata,
        };
        self.messages
            .entry(topic.to_string())
            .or_default()
            .push(message);
        if let Some(mut t) = self.topics.get_mut(topic) {
            t.message_count += 1;
            t.last_published = Some(published_at);
        }
        Ok(id)
    }

    fn recent_messages(&self, topic: &str, n: usize) -> Result<Vec<Message>> {
        let Some(messages) = self.messages.get(topic) else {
            return Ok(Vec::new());
        };
        Ok(messages.iter().rev().take(n).cloned().collect())
    }

    fn messages_page(&self, topic: &str, limit: usize, offset: usize) -> Result<(Vec<Message>, u64)> {
        let Some(messages) = self.messages.get(topic) else {
            return Ok((Vec::new(), 0));
        };
        let total = messages.len() as u64;
        let page = messages.iter().rev().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    fn message_count(&self, topic: &str) -> Result<u64> {
        Ok(self.topics.get(topic).map(|t| t.message_count).unwrap_or(0))
    }
}
