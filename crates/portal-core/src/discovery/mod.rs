//! Scans known IDE config locations, parses declarations, and produces a
//! normalized, deduplicated server list.

mod locations;
mod parse;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

pub use locations::{known_locations, ConfigLocation};

use crate::domain::{ServerDecl, ServerSource};

/// One `scan()`'s worth of work: the decls that survived, and the
/// per-file warnings that didn't abort anything.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub decls: Vec<ServerDecl>,
    pub warnings: Vec<String>,
}

/// The three sets a reconciliation produces, handed to the supervisor.
#[derive(Debug, Default)]
pub struct ReconcileDelta {
    pub added: Vec<ServerDecl>,
    pub changed: Vec<ServerDecl>,
    pub removed: Vec<String>,
}

impl ReconcileDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

pub struct Discovery {
    home: PathBuf,
    config_dir: PathBuf,
}

impl Discovery {
    pub fn new(home: PathBuf, config_dir: PathBuf) -> Self {
        Self { home, config_dir }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Synchronous full rescan. A file that can't be read or parsed is
    /// logged and skipped; scanning always completes.
    pub fn scan(&self) -> ScanResult {
        let mut by_name: HashMap<String, ServerDecl> = HashMap::new();
        let mut warnings = Vec::new();

        for location in known_locations(&self.home, &self.config_dir) {
            let Ok(contents) = std::fs::read_to_string(&location.path) else {
                debug!(path = %location.path.display(), "config location absent, skipping");
                continue;
            };
            let document: Value = match serde_json::from_str(&contents) {
                Ok(doc) => doc,
                Err(err) => {
                    warnings.push(format!("{}: invalid JSON ({err})", location.path.display()));
                    continue;
                }
            };

            let (decls, file_warnings) = parse::parse_document(location.source, &document);
            warnings.extend(
                file_warnings
                    .into_iter()
                    .map(|w| format!("{} ({}): {w}", location.path.display(), location.source)),
            );

            for decl in decls {
                self.insert_with_precedence(&mut by_name, decl, &mut warnings);
            }
        }

        let mut decls: Vec<_> = by_name.into_values().collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        ScanResult { decls, warnings }
    }

    fn insert_with_precedence(
        &self,
        by_name: &mut HashMap<String, ServerDecl>,
        decl: ServerDecl,
        warnings: &mut Vec<String>,
    ) {
        match by_name.get(&decl.name) {
            Some(existing) if existing.source.precedence() <= decl.source.precedence() => {
                warn!(
                    name = %decl.name,
                    winner = %existing.source,
                    loser = %decl.source,
                    "duplicate server name, lower precedence dropped"
                );
                warnings.push(format!(
                    "{}: duplicate, lower precedence dropped ({})",
                    decl.name, decl.source
                ));
            }
            _ => {
                by_name.insert(decl.name.clone(), decl);
            }
        }
    }

    /// Diffs a fresh scan against the registry's current declarations.
    pub fn reconcile(&self, current: &[ServerDecl], scanned: &[ServerDecl]) -> ReconcileDelta {
        let current_by_name: HashMap<&str, &ServerDecl> =
            current.iter().map(|d| (d.name.as_str(), d)).collect();
        let scanned_by_name: HashMap<&str, &ServerDecl> =
            scanned.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut delta = ReconcileDelta::default();

        for decl in scanned {
            match current_by_name.get(decl.name.as_str()) {
                None => delta.added.push(decl.clone()),
                Some(existing) if decl_equivalent(existing, decl) => {}
                Some(_) => delta.changed.push(decl.clone()),
            }
        }

        for name in current_by_name.keys() {
            if !scanned_by_name.contains_key(name) {
                delta.removed.push(name.to_string());
            }
        }

        delta
    }

    /// Atomically replaces the manual source document, then re-scans.
    pub async fn write_manual(&self, document: &Value) -> std::io::Result<ScanResult> {
        let manual_path = self.config_dir.join("manual.json");
        tokio::fs::create_dir_all(&self.config_dir).await?;
        let tmp_path = self.config_dir.join("manual.json.tmp");
        let serialized = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&tmp_path, &serialized).await?;
        tokio::fs::rename(&tmp_path, &manual_path).await?;
        Ok(self.scan())
    }

    pub fn read_manual(&self) -> std::io::Result<Value> {
        let manual_path = self.config_dir.join("manual.json");
        match std::fs::read_to_string(&manual_path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(serde_json::json!({ "mcpServers": {} }))
            }
            Err(err) => Err(err),
        }
    }
}

fn decl_equivalent(a: &ServerDecl, b: &ServerDecl) -> bool {
    a.source == b.source
        && a.transport == b.transport
        && a.timeout_seconds == b.timeout_seconds
        && a.max_retries == b.max_retries
        && a.enabled == b.enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_json(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn cursor_beats_windsurf_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path();
        write_json(
            &home.join(".cursor/mcp.json"),
            r#"{"mcpServers":{"alpha":{"command":"cursor-cmd"}}}"#,
        );
        write_json(
            &home.join(".windsurf/mcp_servers.json"),
            r#"{"mcpServers":{"alpha":{"command":"windsurf-cmd"}}}"#,
        );

        let discovery = Discovery::new(home.to_path_buf(), home.join(".mcp-portal"));
        let result = discovery.scan();

        assert_eq!(result.decls.len(), 1);
        let crate::domain::DeclaredTransport::Stdio { command, .. } = &result.decls[0].transport
        else {
            panic!("expected stdio transport");
        };
        assert_eq!(command, "cursor-cmd");
        assert!(result.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn reconcile_reports_a_no_op_for_identical_scans() {
        let tmp = tempfile::tempdir().unwrap();
        let discovery = Discovery::new(tmp.path().to_path_buf(), tmp.path().join(".mcp-portal"));
        let decl = ServerDecl {
            name: "alpha".into(),
            source: ServerSource::Cursor,
            transport: crate::domain::DeclaredTransport::Stdio {
                command: "echo".into(),
                args: vec![],
                env: HashMap::new(),
            },
            timeout_seconds: 30,
            max_retries: 5,
            enabled: true,
        };
        let delta = discovery.reconcile(&[decl.clone()], &[decl]);
        assert!(delta.is_empty());
    }

    #[test]
    fn reconcile_detects_added_changed_and_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let discovery = Discovery::new(tmp.path().to_path_buf(), tmp.path().join(".mcp-portal"));

        let make = |name: &str, command: &str| ServerDecl {
            name: name.into(),
            source: ServerSource::Cursor,
            transport: crate::domain::DeclaredTransport::Stdio {
                command: command.into(),
                args: vec![],
                env: HashMap::new(),
            },
            timeout_seconds: 30,
            max_retries: 5,
            enabled: true,
        };

        let current = vec![make("alpha", "old-cmd"), make("beta", "beta-cmd")];
        let scanned = vec![make("alpha", "new-cmd"), make("gamma", "gamma-cmd")];

        let delta = discovery.reconcile(&current, &scanned);
        assert_eq!(delta.added.len(), 1);
        assert_eq!(delta.added[0].name, "gamma");
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.changed[0].name, "alpha");
        assert_eq!(delta.removed, vec!["beta".to_string()]);
    }
}
