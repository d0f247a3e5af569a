//! Configuration (C8): environment-driven process config, no config-file
//! parser. Follows the teacher's `DatabaseConfig`-with-`Default` idiom,
//! minus the `rustydb.toml` file loader — env vars only, in scope here.

use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Default `last_n` applied to a `subscribe` when the client omits it.
    pub default_history_replay: usize,
    /// Hard cap on `last_n` / the `?limit=` query param, matching §6's
    /// `limit ∈ [1, 100]`.
    pub max_page_limit: usize,
    /// How many messages are retained per topic before the oldest are
    /// dropped from the in-memory history.
    pub message_history_cap: usize,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static bind address"),
            default_history_replay: 0,
            max_page_limit: 100,
            message_history_cap: 1000,
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Config {
    /// Loads overrides from the environment, falling back to `Default`
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env::var("RELAY_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            default_history_replay: env::var("RELAY_DEFAULT_HISTORY_REPLAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_history_replay),
            max_page_limit: env::var("RELAY_MAX_PAGE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_page_limit),
            message_history_cap: env::var("RELAY_MESSAGE_HISTORY_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.message_history_cap),
            request_timeout_secs: env::var("RELAY_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            max_body_bytes: env::var("RELAY_MAX_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.max_page_limit, 100);
        assert!(config.message_history_cap > 0);
    }
}
