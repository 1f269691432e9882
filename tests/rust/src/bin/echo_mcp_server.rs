//! Minimal stdio MCP server used as the upstream in scenario tests. Two
//! tools: `echo`, which hands its `msg` argument straight back, and
//! `crash`, which exits the process to simulate an upstream dying.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};

#[derive(Clone)]
struct EchoServer;

impl ServerHandler for EchoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability { list_changed: Some(false) })
                .build(),
            server_info: Implementation {
                name: "echo-mcp-server".to_string(),
                version: "0.0.1".to_string(),
                ..Default::default()
            },
            instructions: None,
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let echo_schema: Arc<serde_json::Map<String, serde_json::Value>> = Arc::new(
            serde_json::from_value(serde_json::json!({
                "type": "object",
                "properties": {"msg": {"type": "string"}},
                "required": ["msg"],
            }))
            .unwrap(),
        );
        let crash_schema: Arc<serde_json::Map<String, serde_json::Value>> = Arc::new(
            serde_json::from_value(serde_json::json!({"type": "object", "properties": {}})).unwrap(),
        );
        Ok(ListToolsResult::with_all_items(vec![
            Tool::new("echo", "Returns `msg` back unchanged", echo_schema),
            Tool::new("crash", "Exits the process immediately", crash_schema),
        ]))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match params.name.as_ref() {
            "echo" => {
                let msg = params
                    .arguments
                    .as_ref()
                    .and_then(|a| a.get("msg"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Ok(CallToolResult::success(vec![Content::text(msg)]))
            }
            "crash" => std::process::exit(1),
            other => Err(McpError::invalid_params(format!("unknown tool `{other}`"), None)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = EchoServer.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
