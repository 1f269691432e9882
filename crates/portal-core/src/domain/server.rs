//! Declared server intent, as recovered by discovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where a [`ServerDecl`] was recovered from.
///
/// Ordering here doubles as collision precedence: `manual` beats every
/// IDE-owned source, and IDE-owned sources are ordered roughly by how
/// actively this gateway's users tend to maintain them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ServerSource {
    Manual,
    Cursor,
    Vscode,
    Claude,
    Windsurf,
    Continue,
}

impl ServerSource {
    /// Lower is higher precedence.
    pub fn precedence(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for ServerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Cursor => "cursor",
            Self::Vscode => "vscode",
            Self::Claude => "claude",
            Self::Windsurf => "windsurf",
            Self::Continue => "continue",
        };
        f.write_str(s)
    }
}

/// The declared transport for a server, before command normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "transport_hint", rename_all = "snake_case")]
pub enum DeclaredTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    HttpSse { url: String },
}

/// A declared MCP server, as produced by discovery and owned by the registry
/// until reconciliation replaces or removes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDecl {
    pub name: String,
    pub source: ServerSource,
    #[serde(flatten)]
    pub transport: DeclaredTransport,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_enabled() -> bool {
    true
}

impl ServerDecl {
    pub fn is_stdio(&self) -> bool {
        matches!(self.transport, DeclaredTransport::Stdio { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_outranks_every_ide_source() {
        assert!(ServerSource::Manual.precedence() < ServerSource::Cursor.precedence());
        assert!(ServerSource::Cursor.precedence() < ServerSource::Vscode.precedence());
        assert!(ServerSource::Continue.precedence() > ServerSource::Windsurf.precedence());
    }

    #[test]
    fn stdio_decl_round_trips_through_json() {
        let decl = ServerDecl {
            name: "alpha".into(),
            source: ServerSource::Cursor,
            transport: DeclaredTransport::Stdio {
                command: "npx".into(),
                args: vec!["-y".into(), "echo-tool".into()],
                env: HashMap::new(),
            },
            timeout_seconds: 30,
            max_retries: 5,
            enabled: true,
        };
        let json = serde_json::to_string(&decl).unwrap();
        let back: ServerDecl = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "alpha");
        assert!(back.is_stdio());
    }
}
