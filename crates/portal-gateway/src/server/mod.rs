//! HTTP surface: REST management API, the `/api/v1/events` SSE stream,
//! and the unified `/api/v1/mcp` endpoint (rmcp's Streamable HTTP
//! transport, mounted directly).

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use portal_core::registry::Registry;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::GatewayHandler;
use crate::supervisor::Supervisor;
use handlers::AppState;

/// Where the server binds and whether it loosens CORS for browser
/// clients. Populated from `MCP_PORTAL_HOST`/`MCP_PORTAL_PORT` by the CLI.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8020, enable_cors: true }
    }
}

impl GatewayConfig {
    pub fn addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().expect("invalid host/port")
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

pub struct GatewayServer {
    config: GatewayConfig,
    registry: Arc<Registry>,
    supervisor: Arc<Supervisor>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, registry: Arc<Registry>, supervisor: Arc<Supervisor>) -> Self {
        Self { config, registry, supervisor }
    }

    fn build_router(&self) -> Router {
        let app_state = AppState {
            registry: self.registry.clone(),
            supervisor: self.supervisor.clone(),
            started_at: Instant::now(),
        };

        let handler = GatewayHandler::new(self.registry.clone(), self.supervisor.clone());
        let mcp_service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(std::time::Duration::from_secs(30)),
                sse_retry: Some(std::time::Duration::from_secs(3)),
                cancellation_token: CancellationToken::new(),
            },
        );

        let mut router = Router::new()
            .route("/api/v1/health", get(handlers::health))
            .route("/api/v1/servers", get(handlers::list_servers))
            .route("/api/v1/servers/refresh", post(handlers::refresh_servers))
            .route("/api/v1/servers/{name}/enable", post(handlers::enable_server))
            .route("/api/v1/servers/{name}/disable", post(handlers::disable_server))
            .route("/api/v1/servers/{name}/reconnect", post(handlers::reconnect_server))
            .route("/api/v1/tools", get(handlers::list_tools))
            .route("/api/v1/resources", get(handlers::list_resources))
            .route("/api/v1/config", get(handlers::get_config).post(handlers::set_config))
            .route("/api/v1/events", get(handlers::events))
            .with_state(app_state)
            .nest_service("/api/v1/mcp", mcp_service)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Binds, kicks off the initial discovery scan in the background, and
    /// serves until Ctrl-C/SIGTERM, then drives the supervisor through its
    /// graceful shutdown before returning.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.addr();
        info!(%addr, cors = self.config.enable_cors, "gateway starting");

        let supervisor = self.supervisor.clone();
        tokio::spawn(async move { supervisor.startup().await });

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "gateway ready");

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        info!("shutdown signal received, stopping sessions");
        self.supervisor.shutdown().await;
        Ok(())
    }

    /// Binds the listener and returns its actual address alongside the
    /// serving task, so callers (tests, mainly) can bind port `0` and
    /// still learn what they got.
    pub async fn bind(self) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<anyhow::Result<()>>)> {
        let addr = self.config.addr();
        info!(%addr, cors = self.config.enable_cors, "gateway starting");

        let supervisor = self.supervisor.clone();
        tokio::spawn(async move { supervisor.startup().await });

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await?;
            Ok(())
        });
        Ok((local_addr, handle))
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Resolves on Ctrl-C or, on unix, `SIGTERM` — whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
