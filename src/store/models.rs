//! Durable record types (C1 data model, `spec.md` §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named channel. `name` is the primary identity; there is no separate
/// surrogate id because every lookup in this system goes through the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_published: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub subscriber_count: usize,
    pub is_active: bool,
    pub metadata: serde_json::Value,
}

impl Topic {
    pub fn new(name: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            last_published: None,
            message_count: 0,
            subscriber_count: 0,
            is_active: true,
            metadata,
        }
    }
}

/// A live WebSocket session, as tracked by the durable store. This is
/// distinct from the in-memory `ConnectionHandle` the registry holds —
/// this is the record-of-truth row, not the routable handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub remote_addr: Option<String>,
    pub user_agent: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub metadata: serde_json::Value,
}

impl Connection {
    pub fn new(id: Uuid, remote_addr: Option<String>, user_agent: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            remote_addr,
            user_agent,
            connected_at: now,
            last_activity: now,
            is_active: true,
            metadata: serde_json::json!({}),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Relation between a connection and a topic. Uniqueness is enforced by
/// keying the store's subscription map on `(connection_id, topic)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub connection_id: Uuid,
    pub topic: String,
    pub subscribed_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A published message, retained as history. `payload` holds the whole
/// `message` sub-object as the publisher sent it (`{payload, metadata}`),
/// not just its inner `payload` key — the broadcast/replay wire envelope
/// is the thing that narrows down to that key, not storage (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub publisher_connection_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
    pub delivery_attempts: u32,
    pub max_delivery_attempts: u32,
    pub metadata: serde_json::Value,
}

impl Message {
    /// The publisher's declared `client_id`, guaranteed present in
    /// `metadata` at append time (`spec.md` §3) but read back out
    /// defensively since `metadata` is a free-form JSON value.
    pub fn client_id(&self) -> Option<&str> {
        self.metadata.get("client_id").and_then(serde_json::Value::as_str)
    }

    /// The inner `message.payload` value, for broadcast and history-replay
    /// envelopes (`spec.md` §4.4) — `payload` itself holds the whole stored
    /// `message` sub-object, not just this.
    pub fn broadcast_payload(&self) -> serde_json::Value {
        self.payload
            .get("payload")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}
