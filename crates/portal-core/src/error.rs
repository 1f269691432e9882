//! Closed error taxonomy for the gateway core.
//!
//! Transient kinds (`spawn_failed`, `handshake_failed`, `transport_error`,
//! `timeout`) are handled locally by sessions and the supervisor; callers
//! only ever see `upstream_unavailable` once retries are exhausted.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayError {
    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("failed to spawn child process: {message}")]
    SpawnFailed { message: String },

    #[error("mcp handshake failed: {message}")]
    HandshakeFailed { message: String },

    #[error("transport error: {message}")]
    TransportError { message: String },

    #[error("request timed out")]
    Timeout,

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("upstream error: {message}")]
    UpstreamError { message: String },

    #[error("session closed")]
    SessionClosed,

    #[error("upstream unavailable after exhausting retries")]
    UpstreamUnavailable,

    #[error("internal invariant violated: {message}")]
    Fatal { message: String },
}

impl GatewayError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid { message: message.into() }
    }

    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed { message: message.into() }
    }

    pub fn handshake_failed(message: impl Into<String>) -> Self {
        Self::HandshakeFailed { message: message.into() }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::TransportError { message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::UpstreamError { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Whether the supervisor should retry the session after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. }
                | Self::HandshakeFailed { .. }
                | Self::TransportError { .. }
                | Self::Timeout
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. } => "config_invalid",
            Self::SpawnFailed { .. } => "spawn_failed",
            Self::HandshakeFailed { .. } => "handshake_failed",
            Self::TransportError { .. } => "transport_error",
            Self::Timeout => "timeout",
            Self::NotFound { .. } => "not_found",
            Self::UpstreamError { .. } => "upstream_error",
            Self::SessionClosed => "session_closed",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Fatal { .. } => "fatal",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
