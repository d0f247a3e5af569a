//! Core library for the relay broker: a WebSocket publish/subscribe
//! broker with an HTTP control plane. The binary crates (`main.rs`,
//! `cli.rs`) are thin wrappers around what's exported here.

pub mod admin;
pub mod config;
pub mod error;
pub mod fanout;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod store;
pub mod ws;

pub use admin::build_router;
pub use config::Config;
pub use state::BrokerState;
