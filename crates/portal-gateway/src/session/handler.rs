//! The `rmcp::ClientHandler` implementation used for every upstream
//! session. It reacts to list-changed notifications (forwarded to the
//! owning session as a [`SessionSignal`] so it can refresh its inventory)
//! and forwards server-side log messages into `tracing`.

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation, LoggingLevel};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// What the handler (or the transport's own reaper task) tells the owning
/// session. `Disconnected` lets a dead transport be noticed immediately by
/// `health_watch` instead of waiting for the next scheduled ping.
#[derive(Debug, Clone, Copy)]
pub enum SessionSignal {
    ToolsChanged,
    ResourcesChanged,
    Disconnected,
}

#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server_name: String,
    signal_tx: mpsc::UnboundedSender<SessionSignal>,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler").field("server_name", &self.server_name).finish()
    }
}

impl McpClientHandler {
    pub fn new(server_name: &str, signal_tx: mpsc::UnboundedSender<SessionSignal>) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("mcp-portal-{server_name}"),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            server_name: server_name.to_string(),
            signal_tx,
        }
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(server_name = %self.server_name, "tools/list_changed notification received");
            let _ = self.signal_tx.send(SessionSignal::ToolsChanged);
        }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(server_name = %self.server_name, "resources/list_changed notification received");
            let _ = self.signal_tx.send(SessionSignal::ResourcesChanged);
        }
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let message = match &params.data {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match params.level {
                LoggingLevel::Error | LoggingLevel::Critical | LoggingLevel::Alert | LoggingLevel::Emergency => {
                    tracing::error!(server_name = %self.server_name, "{message}")
                }
                LoggingLevel::Warning => tracing::warn!(server_name = %self.server_name, "{message}"),
                _ => debug!(server_name = %self.server_name, "{message}"),
            }
        }
    }
}
