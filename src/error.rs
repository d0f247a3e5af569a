//! Error taxonomy for the broker core.
//!
//! Mirrors the teacher's `DbError`: one `thiserror` enum, tuple variants
//! carrying a message, and `From` impls for the error types the store and
//! protocol layers actually produce.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl BrokerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        BrokerError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BrokerError::NotFound(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Protocol(e.to_string())
    }
}

impl From<uuid::Error> for BrokerError {
    fn from(e: uuid::Error) -> Self {
        BrokerError::BadRequest(format!("invalid uuid: {e}"))
    }
}
