//! Configuration accepted by [`crate::Client::connect`].
//!
//! Mirrors the teacher's `state::Config` pattern: a plain struct with
//! sensible defaults, validated on construction, and tolerant of unknown
//! keys when built from a loosely-typed map (spec §6: "Unknown keys are
//! ignored").

use serde::{Deserialize, Serialize};

/// Default backoff ceiling for WebSocket reconnects, in milliseconds.
pub const DEFAULT_RECONNECT_CEILING_MS: u64 = 30_000;

/// Default number of consecutive reconnect failures before giving up.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Default idle timeout for the WebSocket session, in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;

/// Configuration recognized by [`crate::Client::connect`] (spec §6).
///
/// Unknown keys encountered when deserializing from an external JSON/YAML
/// source are ignored rather than rejected: this struct is not annotated
/// with `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// Base URL of the telephony API, e.g. `http://localhost:8088`.
    pub base_url: String,
    /// Basic auth username.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// Backoff ceiling for WebSocket reconnects, in milliseconds.
    #[serde(default = "default_reconnect_ceiling_ms")]
    pub reconnect_ceiling_ms: u64,
    /// Number of consecutive reconnect failures before the session moves to
    /// [`crate::ws_session::SessionState::GaveUp`] and stops retrying.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Idle timeout for the WebSocket session, in milliseconds. Elapsing
    /// without a frame triggers the same reconnect path as a socket error.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_reconnect_ceiling_ms() -> u64 {
    DEFAULT_RECONNECT_CEILING_MS
}

fn default_max_consecutive_failures() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_FAILURES
}

fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

impl ConnectOptions {
    /// Creates options with the given credentials and all other fields
    /// defaulted.
    #[must_use]
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            reconnect_ceiling_ms: DEFAULT_RECONNECT_CEILING_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}
