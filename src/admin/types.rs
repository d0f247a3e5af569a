//! Request/response DTOs for the admin HTTP surface, and the
//! `BrokerError -> HTTP` mapping (§7, in the teacher's
//! `ApiError::into_response` idiom). Response shapes follow §6's table
//! literally — field names and nesting are a wire contract, not a
//! convenience.

use crate::error::BrokerError;
use crate::store::models::{Connection, Message, Topic};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrokerError::BadRequest(_) | BrokerError::Protocol(_) => StatusCode::BAD_REQUEST,
            BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::AlreadyExists(_) => StatusCode::CONFLICT,
            BrokerError::Store(_) | BrokerError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody { error: self.0.to_string() });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `GET /health/` — `{uptime_sec, topics, subscribers}`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub uptime_sec: u64,
    pub topics: usize,
    pub subscribers: usize,
}

/// `GET /stats/` — `{topics:{<name>:{messages,subscribers},...}}`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub topics: HashMap<String, TopicStat>,
}

#[derive(Debug, Serialize)]
pub struct TopicStat {
    pub messages: u64,
    pub subscribers: usize,
}

/// One entry of `GET /topics/`'s `topics` array — name plus the
/// registry's *live* subscriber count (§4.6: "name + live subscriber
/// count"), distinct from the store's authoritative `subscriber_count`.
#[derive(Debug, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct TopicListResponse {
    pub topics: Vec<TopicSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// `POST /topics/create/` success — `{status:"created", topic}`.
#[derive(Debug, Serialize)]
pub struct CreateTopicResponse {
    pub status: &'static str,
    pub topic: Topic,
}

/// `GET /topics/<name>/` — the topic detail, including the
/// active-subscription count (already a `Topic` field).
#[derive(Debug, Serialize)]
pub struct TopicResponse {
    #[serde(flatten)]
    pub topic: Topic,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /topics/<name>/messages/` — `{topic, messages, total_count, limit, offset}`.
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub topic: String,
    pub messages: Vec<Message>,
    pub total_count: u64,
    pub limit: usize,
    pub offset: usize,
}

/// One entry of `GET /topics/<name>/subscribers/`'s `subscribers` array.
#[derive(Debug, Serialize)]
pub struct SubscriberInfo {
    pub connection_id: Uuid,
    pub subscribed_at: chrono::DateTime<chrono::Utc>,
    pub client_ip: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribersResponse {
    pub topic: String,
    pub subscribers_count: usize,
    pub subscribers: Vec<SubscriberInfo>,
}

/// `POST|DELETE /topics/<name>/delete/` success — `{status:"deleted", topic}`.
#[derive(Debug, Serialize)]
pub struct DeleteTopicResponse {
    pub status: &'static str,
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    #[serde(flatten)]
    pub connection: Connection,
}
