//! Events carried on the event bus.
//!
//! The set of event kinds is closed: `initial_status`, `status_update`,
//! `server_event`, `tool_execution`, `resource_access`, `server_reconnection`,
//! `metrics_update`, `heartbeat`. Consumers match on `kind` and ignore
//! variants they don't care about; new kinds are never added silently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionState;

/// A point-in-time view of one declared server, as returned by
/// `list_servers()` and carried in `initial_status`/`status_update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub source: super::server::ServerSource,
    pub state: SessionState,
    pub tool_count: usize,
    pub resource_count: usize,
    pub last_error: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// Sub-kind carried by a `server_event` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEventKind {
    ConfigError,
    Disconnected,
    Reconnecting,
    Stopped,
    Overflow,
    EnableNoop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayEvent {
    InitialStatus {
        servers: Vec<ServerStatus>,
    },
    StatusUpdate {
        server_name: String,
        status: ServerStatus,
    },
    ServerEvent {
        server_name: Option<String>,
        event_kind: ServerEventKind,
        message: String,
    },
    ToolExecution {
        server_name: String,
        original: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    ResourceAccess {
        server_name: String,
        original: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    ServerReconnection {
        server_name: String,
        success: bool,
        attempt: u32,
    },
    MetricsUpdate {
        connected_servers: usize,
        total_tools: usize,
        total_resources: usize,
    },
    Heartbeat,
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialStatus { .. } => "initial_status",
            Self::StatusUpdate { .. } => "status_update",
            Self::ServerEvent { .. } => "server_event",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ResourceAccess { .. } => "resource_access",
            Self::ServerReconnection { .. } => "server_reconnection",
            Self::MetricsUpdate { .. } => "metrics_update",
            Self::Heartbeat => "heartbeat",
        }
    }
}
