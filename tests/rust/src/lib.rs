//! Shared fixtures for the scenario tests: a throwaway `$HOME`, a running
//! gateway bound to an ephemeral port, and the path to the `echo-mcp-server`
//! binary this suite spawns as every test's upstream.

use std::path::Path;
use std::sync::Arc;

use portal_core::create_shared_event_bus;
use portal_core::discovery::Discovery;
use portal_core::registry::Registry;
use portal_gateway::{GatewayConfig, GatewayServer, Supervisor};
use serde_json::Value;

/// Absolute path to the `echo-mcp-server` binary cargo built for this
/// suite. Set by cargo at compile time; see the `[[bin]]` entry.
pub fn echo_server_path() -> &'static str {
    env!("CARGO_BIN_EXE_echo-mcp-server")
}

/// A manual-source-shaped document declaring one stdio server named
/// `name` that runs the echo binary.
pub fn echo_server_decl(name: &str) -> Value {
    serde_json::json!({
        "mcpServers": {
            name: {
                "command": echo_server_path(),
                "args": [],
            }
        }
    })
}

pub fn write_json(path: &Path, contents: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(contents).unwrap()).unwrap();
}

/// One running gateway over a fresh temp `$HOME`, torn down on drop.
pub struct Harness {
    pub home: tempfile::TempDir,
    pub base_url: String,
    pub registry: Arc<Registry>,
    pub supervisor: Arc<Supervisor>,
    server_task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    /// Starts a gateway whose only discovery source, at boot, is whatever
    /// the caller seeded under `home.path()` before calling this.
    pub async fn start(home: tempfile::TempDir) -> Self {
        let (_bus, sender) = create_shared_event_bus();
        let registry = Arc::new(Registry::new(sender));
        let config_dir = home.path().join(".mcp-portal");
        let discovery = Discovery::new(home.path().to_path_buf(), config_dir);
        let supervisor = Arc::new(Supervisor::new(discovery, registry.clone(), home.path().to_path_buf()));

        let config = GatewayConfig { host: "127.0.0.1".to_string(), port: 0, enable_cors: false };
        let server = GatewayServer::new(config, registry.clone(), supervisor.clone());
        let (addr, server_task) = server.bind().await.expect("gateway binds");

        // Give the background startup() scan a moment to spawn sessions.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        Self { home, base_url: format!("http://{addr}"), registry, supervisor, server_task }
    }

    pub fn mcp_url(&self) -> String {
        format!("{}/api/v1/mcp", self.base_url)
    }

    pub async fn rest_get(&self, path: &str) -> Value {
        reqwest::get(format!("{}{path}", self.base_url))
            .await
            .expect("request")
            .json()
            .await
            .expect("json body")
    }

    pub async fn rest_post(&self, path: &str, body: &Value) -> Value {
        reqwest::Client::new()
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json body")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
