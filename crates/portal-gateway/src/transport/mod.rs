//! The transport layer: two interchangeable carriers for a single MCP
//! session. Both end up producing the same thing, an `rmcp` client
//! session (`RunningService<RoleClient, _>`), so that everything above
//! this layer is transport-agnostic.

mod http_sse;
mod stdio;

pub use http_sse::HttpSseTransport;
pub use stdio::{configure_child_process_platform, StdioTransport};

use async_trait::async_trait;
use portal_core::domain::DeclaredTransport;
use portal_core::{GatewayError, GatewayResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::session::handler::SessionSignal;
use crate::session::McpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    HttpSse,
}

pub enum TransportConnectResult {
    Connected(McpClient),
    Failed(GatewayError),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// `signal_tx` is owned by the session; the transport's client handler
    /// forwards `tools/resources list_changed` notifications through it so
    /// the session can react with `refresh_inventory()`, and the transport
    /// itself sends `Disconnected` the moment it knows its upstream is gone
    /// (e.g. the child process exiting). `cancel` is the session's own
    /// token; a stdio transport watches it to stage its child's teardown
    /// (graceful wait, then `SIGTERM`, then `SIGKILL`).
    async fn connect(
        &self,
        signal_tx: tokio::sync::mpsc::UnboundedSender<SessionSignal>,
        cancel: CancellationToken,
    ) -> TransportConnectResult;
    fn kind(&self) -> TransportKind;
    fn description(&self) -> String;
}

/// Builds the right carrier for a declared transport, after command
/// normalization has already happened for stdio transports.
pub fn build_transport(
    server_name: &str,
    transport: &DeclaredTransport,
    handshake_timeout: Duration,
    home: &std::path::Path,
) -> GatewayResult<Box<dyn Transport>> {
    match transport {
        DeclaredTransport::Stdio { .. } => {
            let normalized = portal_core::command_normalizer::normalize(transport, home)?;
            Ok(Box::new(StdioTransport::new(
                server_name.to_string(),
                normalized,
                handshake_timeout,
            )))
        }
        DeclaredTransport::HttpSse { url } => {
            Ok(Box::new(HttpSseTransport::new(server_name.to_string(), url.clone(), handshake_timeout)))
        }
    }
}
