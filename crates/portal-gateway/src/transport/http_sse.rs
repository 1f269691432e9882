//! http_sse carrier: an SSE stream for inbound frames, POSTs for outbound
//! ones. Reconnects never replay events that were missed while
//! disconnected (see the open-question resolution in the design notes).

use std::time::Duration;

use portal_core::GatewayError;
use rmcp::service::ServiceExt;
use rmcp::transport::streamable_http_client::{StreamableHttpClientTransport, StreamableHttpClientTransportConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{Transport, TransportConnectResult, TransportKind};
use crate::session::handler::{McpClientHandler, SessionSignal};

pub struct HttpSseTransport {
    server_name: String,
    url: String,
    handshake_timeout: Duration,
}

impl HttpSseTransport {
    pub fn new(server_name: String, url: String, handshake_timeout: Duration) -> Self {
        Self { server_name, url, handshake_timeout }
    }
}

#[async_trait::async_trait]
impl Transport for HttpSseTransport {
    async fn connect(
        &self,
        signal_tx: tokio::sync::mpsc::UnboundedSender<SessionSignal>,
        // No child process to stage a teardown for; a dropped SSE stream is
        // only noticed by the next scheduled ping, same as before.
        _cancel: CancellationToken,
    ) -> TransportConnectResult {
        info!(server_name = %self.server_name, url = %self.url, "connecting http_sse server");

        let config = StreamableHttpClientTransportConfig::with_uri(self.url.clone());
        let transport = match StreamableHttpClientTransport::from_config(config) {
            Ok(t) => t,
            Err(err) => {
                let message = format!("failed to build http_sse transport: {err}");
                error!(server_name = %self.server_name, "{message}");
                return TransportConnectResult::Failed(GatewayError::transport_error(message));
            }
        };

        let handler = McpClientHandler::new(&self.server_name, signal_tx);
        let connect_future = handler.serve(transport);
        match tokio::time::timeout(self.handshake_timeout, connect_future).await {
            Ok(Ok(client)) => {
                info!(server_name = %self.server_name, "http_sse server connected");
                TransportConnectResult::Connected(client)
            }
            Ok(Err(err)) => {
                let message = format!("mcp handshake failed: {err}");
                error!(server_name = %self.server_name, "{message}");
                TransportConnectResult::Failed(GatewayError::handshake_failed(message))
            }
            Err(_) => {
                let message = format!("handshake timed out after {:?}", self.handshake_timeout);
                error!(server_name = %self.server_name, "{message}");
                TransportConnectResult::Failed(GatewayError::handshake_failed(message))
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::HttpSse
    }

    fn description(&self) -> String {
        format!("http_sse:{}", self.url)
    }
}
