//! HTTP handler functions for the admin bridge. Each borrows
//! `BrokerState` and calls straight into C1/C2/C5 — the same functions
//! the WebSocket dispatch loop in `crate::ws` calls.

use super::types::{
    ApiResult, ConnectionResponse, CreateTopicRequest, CreateTopicResponse, DeleteTopicResponse,
    HealthResponse, MessagesQuery, MessagesResponse, StatsResponse, SubscriberInfo,
    SubscribersResponse, TopicListResponse, TopicResponse, TopicStat, TopicSummary,
};
use crate::error::BrokerError;
use crate::state::BrokerState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

pub async fn health(State(state): State<BrokerState>) -> ApiResult<Json<HealthResponse>> {
    let topics = state.store.list_topics()?;
    let subscribers = topics.iter().map(|t| t.subscriber_count).sum();
    Ok(Json(HealthResponse {
        uptime_sec: state.uptime_secs(),
        topics: topics.len(),
        subscribers,
    }))
}

pub async fn stats(State(state): State<BrokerState>) -> ApiResult<Json<StatsResponse>> {
    let topics = state.store.list_topics()?;
    let topics: HashMap<String, TopicStat> = topics
        .into_iter()
        .map(|t| (t.name, TopicStat { messages: t.message_count, subscribers: t.subscriber_count }))
        .collect();
    Ok(Json(StatsResponse { topics }))
}

#[instrument(skip(state))]
pub async fn list_topics(State(state): State<BrokerState>) -> ApiResult<Json<TopicListResponse>> {
    let topics = state.store.list_topics()?;
    let topics = topics
        .into_iter()
        .map(|t| TopicSummary { subscribers: state.registry.live_count(&t.name), name: t.name })
        .collect();
    Ok(Json(TopicListResponse { topics }))
}

#[instrument(skip(state))]
pub async fn create_topic(
    State(state): State<BrokerState>,
    Json(req): Json<CreateTopicRequest>,
) -> ApiResult<(StatusCode, Json<CreateTopicResponse>)> {
    if req.name.trim().is_empty() {
        return Err(BrokerError::bad_request("topic name must not be empty").into());
    }
    let metadata = req.metadata.unwrap_or_else(|| serde_json::json!({}));
    let topic = state.store.create_topic(&req.name, metadata).map_err(|e| match e {
        BrokerError::AlreadyExists(_) => BrokerError::AlreadyExists("Topic already exists".to_string()),
        other => other,
    })?;
    Ok((StatusCode::CREATED, Json(CreateTopicResponse { status: "created", topic })))
}

pub async fn get_topic(
    State(state): State<BrokerState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TopicResponse>> {
    let topic = state
        .store
        .get_topic(&name)?
        .ok_or_else(|| BrokerError::not_found(format!("topic '{name}' not found")))?;
    Ok(Json(TopicResponse { topic }))
}

#[instrument(skip(state))]
pub async fn delete_topic(
    State(state): State<BrokerState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteTopicResponse>> {
    let deleted = state.store.delete_topic(&name)?;
    if !deleted {
        return Err(BrokerError::not_found(format!("topic '{name}' not found")).into());
    }
    state.fanout.notify_topic_deleted(&name);
    Ok(Json(DeleteTopicResponse { status: "deleted", topic: name }))
}

pub async fn list_subscribers(
    State(state): State<BrokerState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SubscribersResponse>> {
    state
        .store
        .get_topic(&name)?
        .ok_or_else(|| BrokerError::not_found(format!("topic '{name}' not found")))?;
    let subscriptions = state.store.topic_subscribers(&name)?;
    let mut subscribers = Vec::with_capacity(subscriptions.len());
    for sub in subscriptions {
        let (client_ip, user_agent) = match state.store.connection(sub.connection_id)? {
            Some(conn) => (conn.remote_addr, conn.user_agent),
            None => (None, String::new()),
        };
        subscribers.push(SubscriberInfo {
            connection_id: sub.connection_id,
            subscribed_at: sub.subscribed_at,
            client_ip,
            user_agent,
        });
    }
    Ok(Json(SubscribersResponse { topic: name, subscribers_count: subscribers.len(), subscribers }))
}

pub async fn list_messages(
    State(state): State<BrokerState>,
    Path(name): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    state
        .store
        .get_topic(&name)?
        .ok_or_else(|| BrokerError::not_found(format!("topic '{name}' not found")))?;
    let limit = query.limit.unwrap_or(state.config.max_page_limit).clamp(1, state.config.max_page_limit);
    let offset = query.offset.unwrap_or(0);
    let (messages, total_count) = state.store.messages_page(&name, limit, offset)?;
    Ok(Json(MessagesResponse { topic: name, messages, total_count, limit, offset }))
}

pub async fn get_connection(
    State(state): State<BrokerState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConnectionResponse>> {
    let connection = state
        .store
        .connection(id)?
        .ok_or_else(|| BrokerError::not_found(format!("connection '{id}' not found")))?;
    Ok(Json(ConnectionResponse { connection }))
}
