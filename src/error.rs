//! Centralized error types for the telephony control client.
//!
//! This module provides the error taxonomy surfaced to callers (spec §7):
//! reachability failures during `connect`, server-reported failures, schema
//! failures, caller contract violations, transport interruptions mid-call,
//! and cooperative cancellation.

use thiserror::Error;

/// Errors that can occur while using the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// DNS resolution failure, connection refused, or TLS failure during
    /// `connect` — surfaced as a single condition so callers don't need to
    /// distinguish the underlying network cause.
    #[error("host is not reachable: {0}")]
    HostIsNotReachable(String),

    /// The server responded with an HTTP status >= 400.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status code returned by the server.
        status: u16,
        /// Message extracted from the server's JSON `message` field, or the
        /// HTTP reason phrase if absent.
        message: String,
    },

    /// A network failure occurred mid-call (after the connection to the
    /// host was already judged reachable).
    #[error("transport error: {0}")]
    TransportError(String),

    /// A schema document was malformed or missing required top-level keys.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    /// A required parameter was missing from the caller-supplied option map.
    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(String),

    /// The operation was cancelled via its `CancellationToken`.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Returns a machine-readable error code, stable across versions.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::HostIsNotReachable(_) => "host_is_not_reachable",
            Self::ServerError { .. } => "server_error",
            Self::TransportError(_) => "transport_error",
            Self::SchemaInvalid(_) => "schema_invalid",
            Self::MissingRequiredParameter(_) => "missing_required_parameter",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::HostIsNotReachable(err.to_string())
        } else {
            Self::TransportError(err.to_string())
        }
    }
}

/// Convenient `Result` alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
