//! Connection Handler (C3): the axum WebSocket upgrade and the
//! per-connection dispatch loop.

use crate::protocol::{self, Inbound, MessageBody, Outbound};
use crate::state::BrokerState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use chrono::Utc;
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::registry::ConnectionHandle;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<BrokerState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    ws.on_upgrade(move |socket| handle_socket(socket, state, remote_addr, user_agent))
}

#[instrument(skip(socket, state), fields(connection_id))]
async fn handle_socket(
    socket: WebSocket,
    state: BrokerState,
    remote_addr: SocketAddr,
    user_agent: String,
) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

    if let Err(e) = state
        .store
        .create_connection(connection_id, Some(remote_addr.to_string()), user_agent)
    {
        warn!(error = %e, "failed to register connection");
        return;
    }
    info!("connection accepted");

    let (mut sink, mut stream) = futures_util::StreamExt::split(socket);
    let (tx, mut rx) = unbounded_channel::<String>();
    let handle = ConnectionHandle::new(connection_id, tx.clone());

    let connected = Outbound::Connected { connection_id, status: "success", timestamp: Utc::now() };
    if let Ok(frame) = serde_json::to_string(&connected) {
        let _ = tx.send(frame);
    }

    let outbound_task = tokio::spawn(async move {
        use futures_util::SinkExt;
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut subscribed_topics: HashSet<String> = HashSet::new();

    while let Some(msg) = futures_util::StreamExt::next(&mut stream).await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "websocket read error");
                break;
            }
        };
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        let _ = state.store.touch_connection(connection_id);

        match protocol::decode(&text) {
            Ok(decoded) => {
                dispatch(&state, &handle, &mut subscribed_topics, decoded).await;
            }
            Err(err) => {
                let envelope = Outbound::error(err.request_id, err.reason);
                if let Ok(frame) = serde_json::to_string(&envelope) {
                    let _ = tx.send(frame);
                }
            }
        }
    }

    outbound_task.abort();
    cleanup(&state, connection_id, &subscribed_topics);
}

async fn dispatch(
    state: &BrokerState,
    handle: &ConnectionHandle,
    subscribed_topics: &mut HashSet<String>,
    decoded: protocol::Decoded,
) {
    let request_id = decoded.request_id;
    let reply = |envelope: Outbound| {
        if let Ok(frame) = serde_json::to_string(&envelope) {
            handle.send(frame);
        }
    };

    match decoded.message {
        Inbound::Ping => reply(Outbound::Pong { request_id, timestamp: Utc::now() }),

        Inbound::Subscribe(payload) => {
            let Ok(_topic) = state.store.get_or_create_topic(&payload.topic) else {
                reply(Outbound::error(Some(request_id), "failed to create topic"));
                return;
            };
            match state.store.upsert_subscription(handle.id, &payload.topic) {
                Ok((_, _)) => {
                    state.registry.attach(&payload.topic, handle.clone());
                    subscribed_topics.insert(payload.topic.clone());
                    let _ = state.store.touch_connection(handle.id);

                    reply(Outbound::Subscribed {
                        request_id,
                        topic: payload.topic.clone(),
                        client_id: payload.client_id.clone(),
                        status: "success",
                        timestamp: Utc::now(),
                    });

                    let history_n = payload.last_n.unwrap_or(state.config.default_history_replay);
                    if history_n > 0 {
                        if let Ok(messages) = state.store.recent_messages(&payload.topic, history_n) {
                            // newest-first, matching the retrieval order (§4.3 step 7).
                            for message in messages {
                                let publisher_client_id =
                                    message.client_id().unwrap_or_default().to_string();
                                reply(Outbound::Message {
                                    request_id: Some(request_id),
                                    topic: payload.topic.clone(),
                                    message: MessageBody {
                                        id: message.id,
                                        payload: message.broadcast_payload(),
                                        timestamp: message.published_at,
                                    },
                                    publisher_client_id,
                                });
                            }
                        }
                    }
                }
                Err(e) => reply(Outbound::error(Some(request_id), e.to_string())),
            }
        }

        Inbound::Unsubscribe(payload) => {
            match state.store.deactivate_subscription(handle.id, &payload.topic) {
                Ok(true) => {
                    state.registry.detach(&payload.topic, handle.id);
                    subscribed_topics.remove(&payload.topic);
                    let _ = state.store.touch_connection(handle.id);
                    reply(Outbound::Unsubscribed {
                        request_id,
                        topic: payload.topic,
                        client_id: payload.client_id,
                        status: "success",
                        timestamp: Utc::now(),
                    });
                }
                Ok(false) => reply(Outbound::error(
                    Some(request_id),
                    format!("not subscribed to '{}'", payload.topic),
                )),
                Err(e) => reply(Outbound::error(Some(request_id), e.to_string())),
            }
        }

        Inbound::Publish(payload) => {
            let mut metadata = payload.message.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
            if !metadata.is_object() {
                metadata = serde_json::json!({});
            }
            metadata["client_id"] = serde_json::Value::String(payload.client_id.clone());

            // Stored verbatim as the publisher sent it (§3, §4.3 step 2) — the
            // whole `message` sub-object, not just its `payload` key. Only the
            // broadcast/replay envelope narrows to `.payload` (§4.4).
            let mut message_value = serde_json::json!({ "payload": payload.message.payload.clone() });
            if let Some(meta) = &payload.message.metadata {
                message_value["metadata"] = meta.clone();
            }

            match state.store.append_message(
                &payload.topic,
                Some(handle.id),
                message_value,
                metadata,
            ) {
                Ok(message_id) => {
                    let _ = state.store.touch_connection(handle.id);
                    let published_at = Utc::now();
                    let envelope = Outbound::Message {
                        request_id: None,
                        topic: payload.topic.clone(),
                        message: MessageBody {
                            id: message_id,
                            payload: payload.message.payload,
                            timestamp: published_at,
                        },
                        publisher_client_id: payload.client_id.clone(),
                    };
                    state.fanout.broadcast(&payload.topic, &envelope, Some(handle.id));
                    reply(Outbound::Published {
                        request_id,
                        topic: payload.topic,
                        message_id,
                        client_id: payload.client_id,
                        status: "success",
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => reply(Outbound::error(Some(request_id), e.to_string())),
            }
        }
    }
}

fn cleanup(state: &BrokerState, connection_id: Uuid, subscribed_topics: &HashSet<String>) {
    for topic in subscribed_topics {
        state.registry.detach(topic, connection_id);
    }
    match state.store.delete_connection(connection_id) {
        Ok(affected) => info!(connection_id = %connection_id, topics = affected.len(), "connection closed"),
        Err(e) => warn!(error = %e, "failed to clean up connection"),
    }
}
