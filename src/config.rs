//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use serde::Deserialize;

use crate::domain::DEFAULT_EVENT_BUS_CAPACITY;
use crate::error::WsError;

/// WebSocket transport settings passed straight through to the upgrade.
///
/// `None` keeps the axum default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportOptions {
    /// Read buffer size in bytes.
    pub read_buffer_size: Option<usize>,
    /// Target write buffer size in bytes.
    pub write_buffer_size: Option<usize>,
    /// Maximum write buffer size in bytes.
    pub max_write_buffer_size: Option<usize>,
    /// Maximum incoming message size in bytes.
    pub max_message_size: Option<usize>,
    /// Maximum incoming frame size in bytes.
    pub max_frame_size: Option<usize>,
}

impl TransportOptions {
    /// Applies the configured limits to an upgrade.
    #[must_use]
    pub fn apply(&self, mut upgrade: WebSocketUpgrade) -> WebSocketUpgrade {
        if let Some(size) = self.read_buffer_size {
            upgrade = upgrade.read_buffer_size(size);
        }
        if let Some(size) = self.write_buffer_size {
            upgrade = upgrade.write_buffer_size(size);
        }
        if let Some(size) = self.max_write_buffer_size {
            upgrade = upgrade.max_write_buffer_size(size);
        }
        if let Some(size) = self.max_message_size {
            upgrade = upgrade.max_message_size(size);
        }
        if let Some(size) = self.max_frame_size {
            upgrade = upgrade.max_frame_size(size);
        }
        upgrade
    }

    /// Reads `WS_*` variables from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            read_buffer_size: parse_env_opt("WS_READ_BUFFER_SIZE"),
            write_buffer_size: parse_env_opt("WS_WRITE_BUFFER_SIZE"),
            max_write_buffer_size: parse_env_opt("WS_MAX_WRITE_BUFFER_SIZE"),
            max_message_size: parse_env_opt("WS_MAX_MESSAGE_SIZE"),
            max_frame_size: parse_env_opt("WS_MAX_FRAME_SIZE"),
        }
    }
}

/// Top-level server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of the connection event bus.
    pub event_bus_capacity: usize,

    /// Mount the keep-alive middleware on every WebSocket route.
    pub global_keep_alive: bool,

    /// Transport settings for every upgrade.
    pub transport: TransportOptions,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Config`] if `LISTEN_ADDR` is set but cannot be
    /// parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, WsError> {
        dotenvy::dotenv().ok();

        let raw_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .map_err(|err| WsError::Config(format!("LISTEN_ADDR `{raw_addr}`: {err}")))?;

        Ok(Self {
            listen_addr,
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", DEFAULT_EVENT_BUS_CAPACITY),
            global_keep_alive: parse_env_bool("WS_GLOBAL_KEEP_ALIVE", true),
            transport: TransportOptions::from_env(),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_env_opt(key).unwrap_or(default)
}

fn parse_env_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transport_options_deserialize_from_camel_case() {
        let Ok(options) = serde_json::from_value::<TransportOptions>(serde_json::json!({
            "maxMessageSize": 65536,
            "maxFrameSize": 16384
        })) else {
            panic!("options deserialize");
        };
        assert_eq!(options.max_message_size, Some(65_536));
        assert_eq!(options.max_frame_size, Some(16_384));
        assert_eq!(options.write_buffer_size, None);
    }

    #[test]
    fn empty_transport_options_are_default() {
        let Ok(options) = serde_json::from_str::<TransportOptions>("{}") else {
            panic!("empty object deserializes");
        };
        assert_eq!(options, TransportOptions::default());
    }

    #[test]
    fn missing_variables_use_defaults() {
        assert_eq!(parse_env("WSGATE_TEST_UNSET_NUMBER", 7_usize), 7);
        assert!(parse_env_bool("WSGATE_TEST_UNSET_BOOL", true));
        assert_eq!(parse_env_opt::<usize>("WSGATE_TEST_UNSET_OPT"), None);
    }
}
