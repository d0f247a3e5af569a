//! Request logging middleware (C7 observability on the HTTP surface).
//! Mirrors the teacher's `request_logger_middleware`: a per-request
//! `tracing` span carrying a request id, logged on entry and on
//! completion with the elapsed time.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use uuid::Uuid;

pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    tracing::info!(%request_id, %method, %uri, "incoming request");

    let response = next.run(req).await;

    tracing::info!(
        %request_id,
        %method,
        %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
