//! Protocol Codec (C4): the wire format spoken over `/ws/`.
//!
//! Inbound decoding is two-phase, mirroring
//! `original_source/pubsub/consumers.py::receive`: first the envelope is
//! parsed just far enough to validate `type` and `request_id` (every
//! request-bearing frame must carry a UUID-parseable `request_id`,
//! independent of its type), then the type-specific payload is decoded
//! from the remaining raw JSON. A single serde-tagged enum can't express
//! "validate request_id before looking at the rest," so this is deliberately
//! not one `#[serde(tag = "type")]` enum on the inbound side.

use crate::error::BrokerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Inbound {
    Subscribe(SubscribePayload),
    Unsubscribe(UnsubscribePayload),
    Publish(PublishPayload),
    Ping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribePayload {
    pub topic: String,
    pub client_id: String,
    #[serde(default)]
    pub last_n: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribePayload {
    pub topic: String,
    pub client_id: String,
}

/// The publisher's `message` sub-object. `payload` is the only field the
/// broker reads back out on broadcast (§4.4); `metadata` is free-form and
/// merged with the `client_id` the broker records alongside it.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishMessage {
    pub payload: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishPayload {
    pub topic: String,
    pub client_id: String,
    pub message: PublishMessage,
}

/// The outcome of decoding one inbound frame: the parsed message plus the
/// `request_id` it carried (absent only for frames that failed validation
/// before a `request_id` could be recovered at all).
pub struct Decoded {
    pub request_id: Uuid,
    pub message: Inbound,
}

/// Decodes one raw text frame. Validates `request_id` first, then
/// dispatches on `type`; any failure after that point is still tagged
/// with the `request_id` that was already recovered, so error envelopes
/// can echo it back to the client.
pub fn decode(raw: &str) -> std::result::Result<Decoded, DecodeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeError::no_request_id(format!("malformed JSON: {e}")))?;

    let request_id = value
        .get("request_id")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::no_request_id("Invalid or missing request_id"))
        .and_then(|s| {
            Uuid::parse_str(s).map_err(|_| DecodeError::no_request_id("Invalid or missing request_id"))
        })?;

    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::with_request_id(request_id, "missing 'type' field"))?;

    let message = match msg_type {
        "subscribe" => {
            let payload: SubscribePayload = serde_json::from_value(value).map_err(|e| {
                DecodeError::with_request_id(request_id, format!("invalid subscribe payload: {e}"))
            })?;
            if payload.topic.trim().is_empty() {
                return Err(DecodeError::with_request_id(request_id, "topic must not be empty"));
            }
            if payload.client_id.trim().is_empty() {
                return Err(DecodeError::with_request_id(request_id, "client_id must not be empty"));
            }
            Inbound::Subscribe(payload)
        }
        "unsubscribe" => {
            let payload: UnsubscribePayload = serde_json::from_value(value).map_err(|e| {
                DecodeError::with_request_id(request_id, format!("invalid unsubscribe payload: {e}"))
            })?;
            if payload.topic.trim().is_empty() {
                return Err(DecodeError::with_request_id(request_id, "topic must not be empty"));
            }
            if payload.client_id.trim().is_empty() {
                return Err(DecodeError::with_request_id(request_id, "client_id must not be empty"));
            }
            Inbound::Unsubscribe(payload)
        }
        "publish" => {
            let payload: PublishPayload = serde_json::from_value(value).map_err(|e| {
                DecodeError::with_request_id(request_id, format!("invalid publish payload: {e}"))
            })?;
            if payload.topic.trim().is_empty() {
                return Err(DecodeError::with_request_id(request_id, "topic must not be empty"));
            }
            if payload.client_id.trim().is_empty() {
                return Err(DecodeError::with_request_id(request_id, "client_id must not be empty"));
            }
            if payload.message.payload.is_null() {
                return Err(DecodeError::with_request_id(request_id, "message.payload is required"));
            }
            Inbound::Publish(payload)
        }
        "ping" => Inbound::Ping,
        other => {
            return Err(DecodeError::with_request_id(
                request_id,
                format!("Unknown message type: {other}"),
            ))
        }
    };

    Ok(Decoded { request_id, message })
}

/// A decode failure. Carries a `request_id` only when one was recovered
/// before the failure occurred, matching §4.3's "no `request_id` echoed"
/// rule for the earliest validation failure.
pub struct DecodeError {
    pub request_id: Option<Uuid>,
    pub reason: String,
}

impl DecodeError {
    fn no_request_id(reason: impl Into<String>) -> Self {
        Self { request_id: None, reason: reason.into() }
    }

    fn with_request_id(request_id: Uuid, reason: impl Into<String>) -> Self {
        Self { request_id: Some(request_id), reason: reason.into() }
    }
}

impl From<DecodeError> for BrokerError {
    fn from(e: DecodeError) -> Self {
        BrokerError::Protocol(e.reason)
    }
}

/// The nested `message` object of a broadcast or history-replay envelope:
/// `{id, payload, timestamp}` per §4.4 — server-assigned id, the
/// publisher's `message.payload` sub-object verbatim, and the server's
/// publish timestamp (never the publisher's clock).
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub id: Uuid,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Outbound frames, tagged by `type` in `snake_case` — the shape every
/// `/ws/` client receives. `request_id` is omitted (not nulled) wherever
/// it doesn't apply, matching the Python reference's `send_error`
/// behavior of only including the key when truthy. Field names below
/// (`error` not `reason`, `msg`/`ts` on `info`) follow §4.4's envelope
/// shapes literally, including their inconsistency with each other.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Connected {
        connection_id: Uuid,
        status: &'static str,
        timestamp: DateTime<Utc>,
    },
    Subscribed {
        request_id: Uuid,
        topic: String,
        client_id: String,
        status: &'static str,
        timestamp: DateTime<Utc>,
    },
    Unsubscribed {
        request_id: Uuid,
        topic: String,
        client_id: String,
        status: &'static str,
        timestamp: DateTime<Utc>,
    },
    Published {
        request_id: Uuid,
        topic: String,
        message_id: Uuid,
        client_id: String,
        status: &'static str,
        timestamp: DateTime<Utc>,
    },
    Pong {
        request_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A live broadcast or a `last_n` history replay entry. `request_id`
    /// is only present on replay entries, which are a direct response to
    /// the subscribing client's own request; a live fan-out delivery
    /// carries none, since nothing requested it.
    Message {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        topic: String,
        message: MessageBody,
        publisher_client_id: String,
    },
    /// Unsolicited notices, e.g. admin-triggered topic deletion. `msg`
    /// and `ts` (not `message`/`timestamp`) per §4.4 — this shape is
    /// deliberately distinct from every other envelope's field names.
    Info {
        topic: String,
        msg: String,
        ts: DateTime<Utc>,
    },
}

impl Outbound {
    pub fn error(request_id: Option<Uuid>, error: impl Into<String>) -> Self {
        Outbound::Error { request_id, error: error.into(), timestamp: Utc::now() }
    }

    pub fn topic_deleted(topic: impl Into<String>) -> Self {
        Outbound::Info { topic: topic.into(), msg: "topic_deleted".to_string(), ts: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_missing_request_id() {
        let err = decode(r#"{"type":"ping"}"#).unwrap_err();
        assert!(err.request_id.is_none());
        assert_eq!(err.reason, "Invalid or missing request_id");
    }

    #[test]
    fn decode_rejects_non_uuid_request_id() {
        let err = decode(r#"{"type":"ping","request_id":"not-a-uuid"}"#).unwrap_err();
        assert!(err.request_id.is_none());
    }

    #[test]
    fn decode_parses_subscribe() {
        let request_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"subscribe","request_id":"{request_id}","topic":"weather","client_id":"alice","last_n":5}}"#
        );
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.request_id, request_id);
        match decoded.message {
            Inbound::Subscribe(p) => {
                assert_eq!(p.topic, "weather");
                assert_eq!(p.client_id, "alice");
                assert_eq!(p.last_n, Some(5));
            }
            _ => panic!("expected subscribe"),
        }
    }

    #[test]
    fn decode_rejects_empty_topic() {
        let request_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"subscribe","request_id":"{request_id}","topic":"","client_id":"alice"}}"#
        );
        let err = decode(&raw).unwrap_err();
        assert_eq!(err.request_id, Some(request_id));
    }

    #[test]
    fn decode_preserves_request_id_on_type_specific_error() {
        let request_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"publish","request_id":"{request_id}"}}"#);
        let err = decode(&raw).unwrap_err();
        assert_eq!(err.request_id, Some(request_id));
    }

    #[test]
    fn decode_parses_publish_message_sub_object() {
        let request_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"publish","request_id":"{request_id}","topic":"weather","client_id":"p","message":{{"payload":{{"temp":72}}}}}}"#
        );
        let decoded = decode(&raw).unwrap();
        match decoded.message {
            Inbound::Publish(p) => assert_eq!(p.message.payload["temp"], 72),
            _ => panic!("expected publish"),
        }
    }

    #[test]
    fn error_envelope_omits_missing_request_id() {
        let envelope = Outbound::error(None, "bad");
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("request_id"));
        assert!(json.contains(r#""error":"bad""#));
    }

    #[test]
    fn info_envelope_uses_msg_and_ts_field_names() {
        let envelope = Outbound::topic_deleted("weather");
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""msg":"topic_deleted""#));
        assert!(json.contains(r#""ts":"#));
        assert!(!json.contains(r#""message":"#));
    }
}
