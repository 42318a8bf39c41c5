//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to defaults; only the endpoint is validated strictly.

use std::time::Duration;

use crate::domain::DEFAULT_HISTORY_CAPACITY;
use crate::ws::ReconnectPolicy;

/// Default dice authority endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/";

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the dice authority (`ws://` or `wss://`).
    pub endpoint: String,

    /// Number of rounds kept in history.
    pub history_capacity: usize,

    /// Capacity of the session EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Capacity of the frame log notification channel.
    pub frame_log_channel_capacity: usize,

    /// How long to wait for `ROLL` before abandoning a round. `None`
    /// (the default) waits until the round resolves or the connection
    /// closes.
    pub round_timeout: Option<Duration>,

    /// Reconnect behaviour after an unexpected close.
    pub reconnect: ReconnectPolicy,

    /// Whether the console front-end prints frames as they are captured.
    pub debug_frames: bool,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            event_bus_capacity: 1024,
            frame_log_channel_capacity: 1024,
            round_timeout: None,
            reconnect: ReconnectPolicy::disabled(),
            debug_frames: false,
            log_json: false,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `DICE_ENDPOINT` is set but is not a `ws://` or
    /// `wss://` URL.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let endpoint =
            std::env::var("DICE_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&endpoint)?;

        let history_capacity = parse_env("HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY);
        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 1024);
        let frame_log_channel_capacity = parse_env("FRAME_LOG_CHANNEL_CAPACITY", 1024);

        let round_timeout_ms: u64 = parse_env("ROUND_TIMEOUT_MS", 0);
        let round_timeout = (round_timeout_ms > 0).then(|| Duration::from_millis(round_timeout_ms));

        let reconnect = ReconnectPolicy {
            max_retries: parse_env("RECONNECT_MAX_RETRIES", 0),
            base_delay: Duration::from_millis(parse_env("RECONNECT_BASE_DELAY_MS", 500)),
            max_delay: Duration::from_millis(parse_env("RECONNECT_MAX_DELAY_MS", 10_000)),
        };

        let debug_frames = parse_env_bool("DEBUG_FRAMES", false);
        let log_json = parse_env_bool("LOG_JSON", false);

        Ok(Self {
            endpoint,
            history_capacity,
            event_bus_capacity,
            frame_log_channel_capacity,
            round_timeout,
            reconnect,
            debug_frames,
            log_json,
        })
    }
}

/// Checks that `endpoint` uses a WebSocket scheme and names a host.
///
/// # Errors
///
/// Returns a message describing the problem.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    let rest = endpoint
        .strip_prefix("ws://")
        .or_else(|| endpoint.strip_prefix("wss://"))
        .ok_or_else(|| format!("endpoint {endpoint:?} must start with ws:// or wss://"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("endpoint {endpoint:?} has no host"));
    }
    Ok(())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|v| v.to_ascii_lowercase()).as_deref() {
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
    fn accepts_websocket_urls() {
        assert!(validate_endpoint("ws://localhost:8080/").is_ok());
        assert!(validate_endpoint("wss://dice.example.com/ws").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_empty_hosts() {
        assert!(validate_endpoint("http://localhost:8080").is_err());
        assert!(validate_endpoint("localhost:8080").is_err());
        assert!(validate_endpoint("ws://").is_err());
        assert!(validate_endpoint("ws:///path").is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.round_timeout, None);
        assert_eq!(config.reconnect.max_retries, 0);
        assert!(!config.debug_frames);
    }
}
