//! Merges per-session inventories into a single namespaced catalog.

use std::collections::HashMap;

use url::Url;

use crate::domain::{ResourceDescriptor, ToolDescriptor};
use crate::error::{GatewayError, GatewayResult};

/// One session's last-known inventory, as fed in by the registry.
pub struct SessionInventory<'a> {
    pub server_name: &'a str,
    pub tools: &'a [(String, Option<String>, serde_json::Value)],
    pub resources: &'a [(String, Option<String>, Option<String>, serde_json::Value)],
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
    tool_index: HashMap<String, usize>,
    resource_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn resolve_tool(&self, prefixed_name: &str) -> GatewayResult<(&str, &str)> {
        let idx = self
            .tool_index
            .get(prefixed_name)
            .ok_or_else(|| GatewayError::not_found(format!("tool `{prefixed_name}`")))?;
        let tool = &self.tools[*idx];
        Ok((tool.server_name.as_str(), tool.original_name.as_str()))
    }

    pub fn resolve_resource(&self, prefixed_uri: &str) -> GatewayResult<(&str, &str)> {
        let idx = self
            .resource_index
            .get(prefixed_uri)
            .ok_or_else(|| GatewayError::not_found(format!("resource `{prefixed_uri}`")))?;
        let resource = &self.resources[*idx];
        Ok((resource.server_name.as_str(), resource.original_uri.as_str()))
    }
}

/// Builds a fresh catalog from the current inventories of every session
/// that is `ready` or `degraded` (the caller filters by state before
/// calling this; the aggregator itself is state-agnostic).
pub fn build_catalog<'a>(inventories: impl IntoIterator<Item = SessionInventory<'a>>) -> Catalog {
    let mut tools = Vec::new();
    let mut resources = Vec::new();
    let mut seen_tool_names: HashMap<String, u32> = HashMap::new();
    let mut seen_resource_uris: HashMap<String, u32> = HashMap::new();

    for inventory in inventories {
        for (original_name, description, parameters) in inventory.tools {
            let base = format!("{}.{}", inventory.server_name, original_name);
            let prefixed_name = disambiguate(&base, &mut seen_tool_names);
            tools.push(ToolDescriptor {
                original_name: original_name.clone(),
                server_name: inventory.server_name.to_string(),
                prefixed_name,
                description: description.clone(),
                parameters: parameters.clone(),
            });
        }
        for (original_uri, description, mime_type, raw) in inventory.resources {
            let base = prefix_resource_uri(inventory.server_name, original_uri);
            let prefixed_uri = disambiguate(&base, &mut seen_resource_uris);
            resources.push(ResourceDescriptor {
                original_uri: original_uri.clone(),
                server_name: inventory.server_name.to_string(),
                prefixed_uri,
                description: description.clone(),
                mime_type: mime_type.clone(),
                raw: raw.clone(),
            });
        }
    }

    tools.sort_by(|a, b| a.prefixed_name.cmp(&b.prefixed_name));
    resources.sort_by(|a, b| a.prefixed_uri.cmp(&b.prefixed_uri));

    let tool_index = tools.iter().enumerate().map(|(i, t)| (t.prefixed_name.clone(), i)).collect();
    let resource_index =
        resources.iter().enumerate().map(|(i, r)| (r.prefixed_uri.clone(), i)).collect();

    Catalog { tools, resources, tool_index, resource_index }
}

/// Absolute upstream URIs (those that parse with a scheme) are preserved
/// verbatim; only relative/scheme-less ones are rewritten under the
/// server's own `mcp://` namespace.
fn prefix_resource_uri(server_name: &str, original_uri: &str) -> String {
    if Url::parse(original_uri).is_ok() {
        original_uri.to_string()
    } else {
        format!("mcp://{server_name}/{}", original_uri.trim_start_matches('/'))
    }
}

fn disambiguate(base: &str, seen: &mut HashMap<String, u32>) -> String {
    match seen.get_mut(base) {
        None => {
            seen.insert(base.to_string(), 1);
            base.to_string()
        }
        Some(count) => {
            *count += 1;
            format!("{base}#{count}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_keys_are_prefixed_by_server_name() {
        let tools = vec![("echo".to_string(), None, json!({}))];
        let inventories =
            vec![SessionInventory { server_name: "alpha", tools: &tools, resources: &[] }];
        let catalog = build_catalog(inventories);
        assert_eq!(catalog.tools()[0].prefixed_name, "alpha.echo");
    }

    #[test]
    fn colliding_prefixed_names_get_a_numeric_suffix() {
        let tools_a = vec![("echo".to_string(), None, json!({}))];
        let tools_b = vec![("echo".to_string(), None, json!({}))];
        // Two servers literally named the same thing after precedence
        // resolution shouldn't happen, but the aggregator must still not
        // produce colliding public ids if it ever does.
        let inventories = vec![
            SessionInventory { server_name: "alpha", tools: &tools_a, resources: &[] },
            SessionInventory { server_name: "alpha", tools: &tools_b, resources: &[] },
        ];
        let catalog = build_catalog(inventories);
        let names: Vec<_> = catalog.tools().iter().map(|t| t.prefixed_name.as_str()).collect();
        assert!(names.contains(&"alpha.echo"));
        assert!(names.contains(&"alpha.echo#2"));
    }

    #[test]
    fn absolute_resource_uris_are_preserved_verbatim() {
        let resources = vec![("https://example.com/doc".to_string(), None, None, json!({}))];
        let inventories =
            vec![SessionInventory { server_name: "alpha", tools: &[], resources: &resources }];
        let catalog = build_catalog(inventories);
        assert_eq!(catalog.resources()[0].prefixed_uri, "https://example.com/doc");
    }

    #[test]
    fn relative_resource_uris_get_the_mcp_scheme() {
        let resources = vec![("notes/today".to_string(), None, None, json!({}))];
        let inventories =
            vec![SessionInventory { server_name: "alpha", tools: &[], resources: &resources }];
        let catalog = build_catalog(inventories);
        assert_eq!(catalog.resources()[0].prefixed_uri, "mcp://alpha/notes/today");
    }

    #[test]
    fn resolve_tool_round_trips() {
        let tools = vec![("echo".to_string(), None, json!({}))];
        let inventories =
            vec![SessionInventory { server_name: "alpha", tools: &tools, resources: &[] }];
        let catalog = build_catalog(inventories);
        let (server, original) = catalog.resolve_tool("alpha.echo").unwrap();
        assert_eq!(server, "alpha");
        assert_eq!(original, "echo");
    }

    #[test]
    fn unknown_prefix_is_not_found() {
        let catalog = build_catalog(Vec::<SessionInventory>::new());
        let err = catalog.resolve_tool("nope.nothing").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
