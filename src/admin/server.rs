//! Router assembly: the WebSocket endpoint and the HTTP control plane
//! share one `axum::Router`, one bind address, and the same `tower-http`
//! layer stack (tracing, body-size limit, timeout, request logging,
//! permissive CORS) — the teacher's `RestApiServer::build_router` shape,
//! trimmed to this broker's endpoint set.

use super::handlers;
use super::middleware::request_logger;
use crate::state::BrokerState;
use crate::ws::ws_handler;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: BrokerState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    let timeout_secs = state.config.request_timeout_secs;

    Router::new()
        .route("/ws/", get(ws_handler))
        .route("/health/", get(handlers::health))
        .route("/stats/", get(handlers::stats))
        .route("/topics/", get(handlers::list_topics))
        .route("/topics/create/", axum::routing::post(handlers::create_topic))
        .route("/topics/{name}/", get(handlers::get_topic))
        .route(
            "/topics/{name}/delete/",
            axum::routing::post(handlers::delete_topic).delete(handlers::delete_topic),
        )
        .route("/topics/{name}/subscribers/", get(handlers::list_subscribers))
        .route("/topics/{name}/messages/", get(handlers::list_messages))
        .route("/connections/{id}/", get(handlers::get_connection))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs)))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::from_fn(request_logger))
        .layer(CorsLayer::permissive())
}
