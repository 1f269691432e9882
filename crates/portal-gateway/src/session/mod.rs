//! One live MCP conversation with one upstream: handshake, request
//! correlation (delegated to `rmcp`'s own `Peer`), notifications, health,
//! and reconnect.

pub mod handler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use portal_core::domain::{GatewayEvent, SessionState};
use portal_core::registry::Registry;
use portal_core::{GatewayError, GatewayResult, ServerDecl, ServerEventKind};
use rand::Rng;
use rmcp::model::{CallToolRequestParams, ReadResourceRequestParams};
use serde_json::Value;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use handler::{McpClient, SessionSignal};

use crate::transport::{build_transport, TransportConnectResult};

const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MIN_PING_INTERVAL: Duration = Duration::from_secs(30);

pub struct Session {
    server_name: String,
    decl: RwLock<ServerDecl>,
    home: PathBuf,
    registry: Arc<Registry>,
    client: RwLock<Option<McpClient>>,
    client_notify: Notify,
    last_ping_at: RwLock<Option<Instant>>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(decl: ServerDecl, home: PathBuf, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            server_name: decl.name.clone(),
            decl: RwLock::new(decl),
            home,
            registry,
            client: RwLock::new(None),
            client_notify: Notify::new(),
            last_ping_at: RwLock::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Connects once, then spawns the reconnect-with-backoff watchdog that
    /// keeps the session alive for its whole lifetime (until `stop()`).
    pub async fn start(self: &Arc<Self>) {
        self.registry.update_state(&self.server_name, SessionState::Connecting).await;
        let me = self.clone();
        tokio::spawn(async move { me.run().await });
    }

    async fn run(self: Arc<Self>) {
        let mut retry: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.connect_once().await {
                Ok(signal_rx) => {
                    let reconnected_after = retry;
                    retry = 0;
                    self.registry.set_retry_count(&self.server_name, 0).await;
                    if reconnected_after > 0 {
                        self.registry.events().emit(GatewayEvent::ServerReconnection {
                            server_name: self.server_name.clone(),
                            success: true,
                            attempt: reconnected_after,
                        });
                    }
                    self.health_watch(signal_rx).await;
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    self.client.write().await.take();
                    self.client_notify.notify_waiters();
                    self.registry.update_state(&self.server_name, SessionState::Degraded).await;
                    self.registry
                        .events()
                        .emit_server_event(
                            Some(self.server_name.clone()),
                            ServerEventKind::Disconnected,
                            "transport unresponsive",
                        );
                }
                Err(err) => {
                    self.registry.record_error(&self.server_name, err.to_string()).await;
                }
            }

            let max_retries = self.decl.read().await.max_retries;
            if retry >= max_retries {
                self.registry.update_state(&self.server_name, SessionState::Failed).await;
                self.cancel.cancel();
                self.client_notify.notify_waiters();
                return;
            }

            let backoff = full_jitter_backoff(retry);
            retry += 1;
            self.registry.set_retry_count(&self.server_name, retry).await;
            self.registry
                .events()
                .emit_server_event(
                    Some(self.server_name.clone()),
                    ServerEventKind::Reconnecting,
                    format!("retry {retry}/{max_retries} in {backoff:?}"),
                );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn connect_once(&self) -> GatewayResult<mpsc::UnboundedReceiver<SessionSignal>> {
        let decl = self.decl.read().await.clone();
        let timeout = Duration::from_secs(decl.timeout_seconds);
        let transport = build_transport(&self.server_name, &decl.transport, timeout, &self.home)?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        match transport.connect(signal_tx, self.cancel.clone()).await {
            TransportConnectResult::Connected(client) => {
                *self.client.write().await = Some(client);
                self.client_notify.notify_waiters();
                self.registry.update_state(&self.server_name, SessionState::Ready).await;
                self.refresh_inventory().await?;
                Ok(signal_rx)
            }
            TransportConnectResult::Failed(err) => Err(err),
        }
    }

    /// Watches the live connection until it needs to come down: a throttled
    /// `ping()` on a timer (rmcp gives no cheaper way to notice a closed
    /// stdio pipe or a dropped SSE stream than a live round trip), a
    /// list-changed notification (triggers an inventory refresh, stays
    /// live), or the transport reporting its child/stream is gone (returns
    /// immediately instead of waiting for the next scheduled ping).
    async fn health_watch(&self, mut signal_rx: mpsc::UnboundedReceiver<SessionSignal>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(MIN_PING_INTERVAL) => {
                    if self.ping().await.is_err() {
                        return;
                    }
                }
                signal = signal_rx.recv() => {
                    match signal {
                        Some(SessionSignal::ToolsChanged) | Some(SessionSignal::ResourcesChanged) => {
                            info!(server_name = %self.server_name, ?signal, "inventory refresh requested");
                            if self.refresh_inventory().await.is_err() {
                                return;
                            }
                        }
                        Some(SessionSignal::Disconnected) | None => return,
                    }
                }
                _ = self.cancel.cancelled() => return,
            }
            if self.cancel.is_cancelled() {
                return;
            }
        }
    }

    /// Re-issues `tools/list` / `resources/list` and stores the results.
    pub async fn refresh_inventory(&self) -> GatewayResult<()> {
        let guard = self.client.read().await;
        let Some(client) = guard.as_ref() else {
            return Err(GatewayError::transport_error("no live client to refresh inventory from"));
        };

        let tools = client
            .list_all_tools()
            .await
            .map_err(|e| GatewayError::upstream_error(e.to_string()))?;
        let resources = client
            .list_all_resources()
            .await
            .map_err(|e| GatewayError::upstream_error(e.to_string()))?;
        drop(guard);

        let tools = tools
            .into_iter()
            .map(|t| {
                let name = t.name.to_string();
                let description = t.description.as_ref().map(|d| d.to_string());
                let raw = serde_json::to_value(&t).unwrap_or(Value::Null);
                (name, description, raw)
            })
            .collect();
        let resources = resources
            .into_iter()
            .map(|r| {
                let uri = r.raw.uri.clone();
                let description = r.raw.description.clone();
                let mime_type = r.raw.mime_type.clone();
                let raw = serde_json::to_value(&r).unwrap_or(Value::Null);
                (uri, description, mime_type, raw)
            })
            .collect();

        self.registry.update_inventory(&self.server_name, tools, resources).await;
        Ok(())
    }

    /// Throttled keepalive: at most once per [`MIN_PING_INTERVAL`].
    pub async fn ping(&self) -> GatewayResult<()> {
        {
            let last = self.last_ping_at.read().await;
            if let Some(at) = *last {
                if at.elapsed() < MIN_PING_INTERVAL {
                    return Ok(());
                }
            }
        }
        let guard = self.client.read().await;
        let Some(client) = guard.as_ref() else {
            return Err(GatewayError::transport_error("no live client to ping"));
        };
        client
            .list_all_tools()
            .await
            .map_err(|e| GatewayError::transport_error(e.to_string()))?;
        drop(guard);
        *self.last_ping_at.write().await = Some(Instant::now());
        self.registry.record_heartbeat(&self.server_name).await;
        Ok(())
    }

    pub async fn call_tool(&self, original_name: &str, arguments: Value, deadline: Duration) -> GatewayResult<Value> {
        self.wait_for_reconnect().await?;
        let guard = self.client.read().await;
        let Some(client) = guard.as_ref() else {
            return Err(GatewayError::SessionClosed);
        };
        let arguments = arguments.as_object().cloned();
        let request =
            CallToolRequestParams { name: original_name.to_string().into(), arguments, task: None, meta: None };
        let result = tokio::time::timeout(deadline, client.call_tool(request))
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(|e| GatewayError::upstream_error(e.to_string()))?;
        serde_json::to_value(result).map_err(|e| GatewayError::fatal(e.to_string()))
    }

    pub async fn read_resource(&self, original_uri: &str, deadline: Duration) -> GatewayResult<Value> {
        self.wait_for_reconnect().await?;
        let guard = self.client.read().await;
        let Some(client) = guard.as_ref() else {
            return Err(GatewayError::SessionClosed);
        };
        let request = ReadResourceRequestParams { uri: original_uri.to_string(), meta: None };
        let result = tokio::time::timeout(deadline, client.read_resource(request))
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(|e| GatewayError::upstream_error(e.to_string()))?;
        serde_json::to_value(result).map_err(|e| GatewayError::fatal(e.to_string()))
    }

    /// If the session is mid-reconnect (no live client yet, but not
    /// stopped), briefly queues the caller up to this session's declared
    /// `timeout_seconds` rather than failing immediately. Returns once a
    /// client is live, `SessionClosed` the moment `stop()` runs, or
    /// `UpstreamUnavailable` once the wait is exhausted.
    async fn wait_for_reconnect(&self) -> GatewayResult<()> {
        let budget = Duration::from_secs(self.decl.read().await.timeout_seconds);
        let started = Instant::now();
        loop {
            let notified = self.client_notify.notified();
            if self.client.read().await.is_some() {
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(GatewayError::SessionClosed);
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                return Err(GatewayError::UpstreamUnavailable);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(budget - elapsed) => return Err(GatewayError::UpstreamUnavailable),
                _ = self.cancel.cancelled() => return Err(GatewayError::SessionClosed),
            }
        }
    }

    pub async fn update_decl(&self, decl: ServerDecl) {
        *self.decl.write().await = decl;
    }

    /// Cancels all in-flight work, closes the transport, transitions to
    /// `stopped`. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        // Dropping the client tears down its peer task; stdio children are
        // spawned with `kill_on_drop(true)` so the process goes with it.
        self.client.write().await.take();
        self.client_notify.notify_waiters();
        self.registry.update_state(&self.server_name, SessionState::Stopped).await;
    }
}

/// `min(2^n * 500ms, 30s)` with full jitter.
fn full_jitter_backoff(attempt: u32) -> Duration {
    let capped_ms = MIN_BACKOFF.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped = Duration::from_millis(capped_ms).min(MAX_BACKOFF);
    let jittered_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64);
    Duration::from_millis(jittered_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_thirty_seconds() {
        for attempt in 0..20 {
            let backoff = full_jitter_backoff(attempt);
            assert!(backoff <= MAX_BACKOFF);
        }
    }

    #[test]
    fn backoff_grows_with_attempt_count_on_average() {
        // Full jitter means any single sample can be small, but the upper
        // bound given to the RNG must grow until it saturates at the cap.
        let small_attempt_ceiling = MIN_BACKOFF * 2u32.pow(2);
        let large_attempt_ceiling = MAX_BACKOFF;
        assert!(small_attempt_ceiling < large_attempt_ceiling);
    }
}
