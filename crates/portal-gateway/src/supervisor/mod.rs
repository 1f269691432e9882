//! Reconciliation-driven session lifecycle: diffs a discovery rescan
//! against the registry's declared servers and starts, restarts, or stops
//! the affected [`Session`]s. Keeps initialization logic out of the
//! server/dispatcher layer.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use portal_core::discovery::Discovery;
use portal_core::domain::{DeclaredTransport, ServerEventKind, SessionState};
use portal_core::registry::Registry;
use portal_core::ServerDecl;
use tracing::{info, warn};

use crate::session::Session;

pub struct Supervisor {
    discovery: Discovery,
    registry: Arc<Registry>,
    home: PathBuf,
    sessions: DashMap<String, Arc<Session>>,
}

impl Supervisor {
    pub fn new(discovery: Discovery, registry: Arc<Registry>, home: PathBuf) -> Self {
        Self { discovery, registry, home, sessions: DashMap::new() }
    }

    pub fn config_dir(&self) -> &std::path::Path {
        self.discovery.config_dir()
    }

    /// First scan at process start: declares every discovered server, then
    /// starts all the enabled ones in parallel.
    pub async fn startup(self: &Arc<Self>) {
        let scan = self.discovery.scan();
        for warning in &scan.warnings {
            warn!("{warning}");
            self.registry.record_config_error(None, warning.clone());
        }

        for decl in &scan.decls {
            self.registry.upsert_decl(decl.clone()).await;
        }

        let mut starts = Vec::new();
        for decl in scan.decls {
            if !decl.enabled {
                continue;
            }
            let me = self.clone();
            starts.push(tokio::spawn(async move { me.start_session(decl).await }));
        }
        for handle in starts {
            let _ = handle.await;
        }
        info!("startup reconciliation complete, {} session(s) starting", self.sessions.len());
    }

    /// Re-scans every known config location and applies the delta. Runs
    /// one reconciliation pass at a time; concurrent calls serialize on
    /// the registry/session-map locks they share.
    pub async fn reconcile(self: &Arc<Self>) {
        let scan = self.discovery.scan();
        for warning in &scan.warnings {
            warn!("{warning}");
            self.registry.record_config_error(None, warning.clone());
        }

        let current = self.registry.declared_names().await;
        let delta = self.discovery.reconcile(&current, &scan.decls);
        if delta.is_empty() {
            return;
        }

        info!(
            added = delta.added.len(),
            changed = delta.changed.len(),
            removed = delta.removed.len(),
            "applying discovery delta"
        );

        for decl in delta.added {
            self.registry.upsert_decl(decl.clone()).await;
            if decl.enabled {
                self.start_session(decl).await;
            }
        }

        for decl in delta.changed {
            self.registry.upsert_decl(decl.clone()).await;
            self.restart_session(decl).await;
        }

        for name in delta.removed {
            self.stop_session(&name).await;
            self.registry.remove(&name).await;
        }
    }

    async fn start_session(self: &Arc<Self>, decl: ServerDecl) {
        let name = decl.name.clone();
        if self.sessions.contains_key(&name) {
            return;
        }
        let session = Session::new(decl, self.home.clone(), self.registry.clone());
        session.start().await;
        self.sessions.insert(name, session);
    }

    async fn restart_session(self: &Arc<Self>, decl: ServerDecl) {
        let name = decl.name.clone();
        if let Some((_, old)) = self.sessions.remove(&name) {
            old.stop().await;
        }
        if decl.enabled {
            self.start_session(decl).await;
        }
    }

    async fn stop_session(&self, name: &str) {
        if let Some((_, session)) = self.sessions.remove(name) {
            session.stop().await;
        }
    }

    /// Drives `enable`/`disable` from the REST surface. Persists the
    /// override to the manual source first, since manual precedence means
    /// it will still win on the next rescan regardless of which source
    /// originally declared this server.
    pub async fn set_enabled(self: &Arc<Self>, name: &str, enabled: bool) -> Option<bool> {
        let record = self.registry.get(name).await?;
        if record.decl.enabled != enabled {
            if let Err(err) = self.persist_enabled_override(&record.decl, enabled).await {
                warn!(name, %err, "failed to persist enabled override to manual source");
            }
        }

        let changed = self.registry.set_enabled(name, enabled).await?;
        if changed {
            if enabled {
                if let Some(record) = self.registry.get(name).await {
                    self.start_session(record.decl).await;
                }
            } else {
                self.stop_session(name).await;
            }
        } else {
            let verb = if enabled { "enable" } else { "disable" };
            self.registry.events().emit_server_event(
                Some(name.to_string()),
                ServerEventKind::EnableNoop,
                format!("server `{name}` is already {verb}d, no-op"),
            );
        }
        Some(changed)
    }

    async fn persist_enabled_override(&self, decl: &ServerDecl, enabled: bool) -> std::io::Result<()> {
        let mut document = self.discovery.read_manual()?;
        let mut entry = match &decl.transport {
            DeclaredTransport::Stdio { command, args, env } => {
                serde_json::json!({"command": command, "args": args, "env": env})
            }
            DeclaredTransport::HttpSse { url } => serde_json::json!({"url": url}),
        };
        entry["timeout_seconds"] = decl.timeout_seconds.into();
        entry["max_retries"] = decl.max_retries.into();
        entry["enabled"] = enabled.into();

        document
            .as_object_mut()
            .expect("manual document is always an object")
            .entry("mcpServers")
            .or_insert_with(|| serde_json::json!({}))
            .as_object_mut()
            .expect("mcpServers is always an object")
            .insert(decl.name.clone(), entry);

        self.discovery.write_manual(&document).await?;
        Ok(())
    }

    /// Forces a session back through `Init` regardless of backoff state,
    /// used by the `/reconnect` endpoint.
    pub async fn force_reconnect(self: &Arc<Self>, name: &str) -> bool {
        let Some(record) = self.registry.get(name).await else {
            return false;
        };
        self.restart_session(record.decl).await;
        true
    }

    pub async fn refresh(self: &Arc<Self>) {
        self.reconcile().await;
    }

    /// The manual source document, as last written (or an empty
    /// `mcpServers` object if none exists yet).
    pub fn read_manual_config(&self) -> std::io::Result<serde_json::Value> {
        self.discovery.read_manual()
    }

    /// Replaces the manual source document and immediately reconciles
    /// against it. Returns the number of servers the new document declares.
    pub async fn write_manual_config(self: &Arc<Self>, document: &serde_json::Value) -> std::io::Result<usize> {
        let scan = self.discovery.write_manual(document).await?;
        let updated_servers = scan.decls.len();
        self.reconcile().await;
        Ok(updated_servers)
    }

    pub fn session(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.get(name).map(|entry| entry.clone())
    }

    /// Stops every session concurrently so one slow stdio child's
    /// teardown doesn't hold up the others.
    pub async fn shutdown(&self) {
        let stops = self.sessions.iter().map(|entry| {
            let session = entry.value().clone();
            async move { session.stop().await }
        });
        futures::future::join_all(stops).await;
        for name in self.registry.declared_names().await {
            self.registry.update_state(&name.name, SessionState::Stopped).await;
        }
    }
}
