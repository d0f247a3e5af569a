//! Broker server entrypoint: load config, build the shared state, bind
//! one listener, serve the WebSocket endpoint and the HTTP control plane
//! from the same router.

use relay_broker::error::Result;
use relay_broker::{BrokerState, Config};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr;
    let state = BrokerState::new(config);
    let app = relay_broker::build_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| relay_broker::error::BrokerError::Transport(e.to_string()))?;
    info!(%bind_addr, "relay broker listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| relay_broker::error::BrokerError::Transport(e.to_string()))?;

    Ok(())
}
