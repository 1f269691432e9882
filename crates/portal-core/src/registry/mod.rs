//! Authoritative in-memory state: declared servers, their desired
//! enabled/disabled bit, current status, tool/resource inventories, last
//! error, and last heartbeat.
//!
//! All mutations go through a single `tokio::sync::RwLock`, held only for
//! the duration of the mutation. Reads take a read guard and clone out a
//! snapshot, so `list_servers()` is always atomic with respect to
//! concurrent writers.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::{
    DeclaredTransport, GatewayEvent, ServerDecl, ServerEventKind, ServerStatus, SessionState,
};
use crate::event_bus::EventSender;

#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub decl: ServerDecl,
    pub state: SessionState,
    pub tools: Vec<(String, Option<String>, Value)>,
    pub resources: Vec<(String, Option<String>, Option<String>, Value)>,
    pub last_error: Option<String>,
    pub last_heartbeat: Option<chrono::DateTime<Utc>>,
    pub retry_count: u32,
}

impl ServerRecord {
    fn new(decl: ServerDecl) -> Self {
        Self {
            decl,
            state: SessionState::Init,
            tools: Vec::new(),
            resources: Vec::new(),
            last_error: None,
            last_heartbeat: None,
            retry_count: 0,
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            name: self.decl.name.clone(),
            source: self.decl.source,
            state: self.state,
            tool_count: self.tools.len(),
            resource_count: self.resources.len(),
            last_error: self.last_error.clone(),
            last_heartbeat: self.last_heartbeat,
            retry_count: self.retry_count,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    servers: HashMap<String, ServerRecord>,
}

pub struct Registry {
    state: RwLock<RegistryState>,
    events: EventSender,
}

impl Registry {
    pub fn new(events: EventSender) -> Self {
        Self { state: RwLock::new(RegistryState::default()), events }
    }

    pub async fn list_servers(&self) -> Vec<ServerStatus> {
        let state = self.state.read().await;
        let mut statuses: Vec<_> = state.servers.values().map(ServerRecord::status).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Snapshot of decls + states the aggregator/supervisor need, without
    /// holding the lock while they work.
    pub async fn snapshot(&self) -> Vec<ServerRecord> {
        let state = self.state.read().await;
        state.servers.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<ServerRecord> {
        self.state.read().await.servers.get(name).cloned()
    }

    pub async fn upsert_decl(&self, decl: ServerDecl) {
        let mut state = self.state.write().await;
        state
            .servers
            .entry(decl.name.clone())
            .and_modify(|existing| existing.decl = decl.clone())
            .or_insert_with(|| ServerRecord::new(decl));
    }

    pub async fn remove(&self, name: &str) {
        self.state.write().await.servers.remove(name);
    }

    /// Flips the enabled bit. Returns `Ok(false)` when it was already at
    /// the requested value (the no-op case §8 requires).
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Option<bool> {
        let mut state = self.state.write().await;
        let record = state.servers.get_mut(name)?;
        let changed = record.decl.enabled != enabled;
        record.decl.enabled = enabled;
        Some(changed)
    }

    pub async fn update_state(&self, name: &str, new_state: SessionState) {
        let status = {
            let mut state = self.state.write().await;
            let Some(record) = state.servers.get_mut(name) else { return };
            record.state = new_state;
            if new_state == SessionState::Stopped {
                record.tools.clear();
                record.resources.clear();
            }
            record.status()
        };
        self.events
            .emit(GatewayEvent::StatusUpdate { server_name: name.to_string(), status });
    }

    pub async fn record_error(&self, name: &str, message: String) {
        let mut state = self.state.write().await;
        if let Some(record) = state.servers.get_mut(name) {
            record.last_error = Some(message);
        }
    }

    pub async fn record_heartbeat(&self, name: &str) {
        let mut state = self.state.write().await;
        if let Some(record) = state.servers.get_mut(name) {
            record.last_heartbeat = Some(Utc::now());
        }
    }

    pub async fn set_retry_count(&self, name: &str, retry_count: u32) {
        let mut state = self.state.write().await;
        if let Some(record) = state.servers.get_mut(name) {
            record.retry_count = retry_count;
        }
    }

    /// Atomic swap of one session's slice of the catalog.
    pub async fn update_inventory(
        &self,
        name: &str,
        tools: Vec<(String, Option<String>, Value)>,
        resources: Vec<(String, Option<String>, Option<String>, Value)>,
    ) {
        let mut state = self.state.write().await;
        if let Some(record) = state.servers.get_mut(name) {
            record.tools = tools;
            record.resources = resources;
        }
    }

    pub fn record_event(&self, event: GatewayEvent) {
        self.events.emit(event);
    }

    pub fn record_config_error(&self, server_name: Option<String>, message: impl Into<String>) {
        self.events.emit_server_event(server_name, ServerEventKind::ConfigError, message);
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Current server names, used by the supervisor's reconciliation pass.
    pub async fn declared_names(&self) -> Vec<ServerDecl> {
        self.state.read().await.servers.values().map(|r| r.decl.clone()).collect()
    }
}
