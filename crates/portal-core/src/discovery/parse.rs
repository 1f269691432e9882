//! Tolerant parsing of the several `mcpServers`-shaped documents in the
//! wild. Every source is expected to roughly agree on the shape of one
//! server entry; none of them are trusted to agree on where the map lives.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::domain::{DeclaredTransport, ServerDecl, ServerSource};

#[derive(Debug, Deserialize)]
struct RawServerEntry {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    url: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    enabled: Option<bool>,
}

/// Finds the `{name: entry}` map inside a parsed config document,
/// regardless of whether it lives at the top level (`mcpServers`) or
/// nested under VS Code's `mcp.servers`.
fn find_server_map(document: &Value) -> Option<&serde_json::Map<String, Value>> {
    document
        .get("mcpServers")
        .and_then(Value::as_object)
        .or_else(|| document.pointer("/mcp/servers").and_then(Value::as_object))
}

/// Parses one config document, tolerating per-entry malformation: a bad
/// entry produces a warning string and is skipped, it never aborts the
/// whole file.
pub fn parse_document(
    source: ServerSource,
    document: &Value,
) -> (Vec<ServerDecl>, Vec<String>) {
    let mut decls = Vec::new();
    let mut warnings = Vec::new();

    let Some(map) = find_server_map(document) else {
        return (decls, warnings);
    };

    for (name, value) in map {
        match serde_json::from_value::<RawServerEntry>(value.clone()) {
            Ok(raw) => match to_decl(source, name, raw) {
                Ok(decl) => decls.push(decl),
                Err(message) => warnings.push(format!("{name}: {message}")),
            },
            Err(err) => warnings.push(format!("{name}: malformed entry ({err})")),
        }
    }

    (decls, warnings)
}

fn to_decl(source: ServerSource, name: &str, raw: RawServerEntry) -> Result<ServerDecl, String> {
    let transport = match (raw.url, raw.command) {
        (Some(url), _) => DeclaredTransport::HttpSse { url },
        (None, Some(command)) => DeclaredTransport::Stdio { command, args: raw.args, env: raw.env },
        (None, None) => return Err("neither `command` nor `url` was declared".to_string()),
    };

    Ok(ServerDecl {
        name: name.to_string(),
        source,
        transport,
        timeout_seconds: raw.timeout_seconds.unwrap_or(30),
        max_retries: raw.max_retries.unwrap_or(5),
        enabled: raw.enabled.unwrap_or(true),
    })
}
