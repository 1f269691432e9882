//! The unified outbound MCP surface: one `rmcp::ServerHandler` that
//! aggregates every upstream's tools/resources into a single namespaced
//! catalog and routes calls back to the owning session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use portal_core::aggregator::{build_catalog, Catalog, SessionInventory};
use portal_core::domain::GatewayEvent;
use portal_core::registry::Registry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, InitializeRequestParams,
    InitializeResult, ListResourcesResult, ListToolsResult, PaginatedRequestParams, ProtocolVersion,
    ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents, ResourcesCapability,
    ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use tracing::{debug, info};

use crate::supervisor::Supervisor;

const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct GatewayHandler {
    registry: Arc<Registry>,
    supervisor: Arc<Supervisor>,
}

impl GatewayHandler {
    pub fn new(registry: Arc<Registry>, supervisor: Arc<Supervisor>) -> Self {
        Self { registry, supervisor }
    }

    async fn catalog(&self) -> Catalog {
        let records = self.registry.snapshot().await;
        let inventories: Vec<_> = records
            .iter()
            .filter(|r| r.state.exposes_inventory())
            .map(|r| SessionInventory {
                server_name: r.decl.name.as_str(),
                tools: &r.tools,
                resources: &r.resources,
            })
            .collect();
        build_catalog(inventories)
    }
}

impl ServerHandler for GatewayHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability { list_changed: Some(true) })
                .enable_resources_with(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(true),
                })
                .build(),
            server_info: Implementation {
                name: "mcp-portal".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Aggregates tools and resources from every enabled MCP server this gateway \
                 discovered. Tool and resource identifiers are prefixed with `<server>.`."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        params: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        debug!(protocol_version = %params.protocol_version, "client initializing");
        Ok(InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.get_info().capabilities,
            server_info: self.get_info().server_info,
            instructions: self.get_info().instructions,
        })
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let catalog = self.catalog().await;
        let tools: Vec<Tool> = catalog
            .tools()
            .iter()
            .filter_map(|descriptor| {
                let mut tool: Tool = serde_json::from_value(descriptor.parameters.clone()).ok()?;
                tool.name = descriptor.prefixed_name.clone().into();
                Some(tool)
            })
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(tool = %params.name, "call_tool");
        let start = Instant::now();
        let catalog = self.catalog().await;
        let (server_name, original_name) = catalog
            .resolve_tool(&params.name)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let server_name = server_name.to_string();
        let original_name = original_name.to_string();

        let Some(session) = self.supervisor.session(&server_name) else {
            return Err(McpError::internal_error(
                format!("server `{server_name}` is not connected"),
                None,
            ));
        };

        let arguments = serde_json::to_value(params.arguments.unwrap_or_default()).unwrap_or_default();
        let result = session.call_tool(&original_name, arguments, DEFAULT_CALL_DEADLINE).await;

        let success = result.is_ok();
        let error = result.as_ref().err().map(|e| e.to_string());
        self.registry.record_event(GatewayEvent::ToolExecution {
            server_name: server_name.clone(),
            original: original_name.clone(),
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        });

        let raw = result.map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let content: Vec<Content> = raw
            .get("content")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        let is_error = raw.get("isError").and_then(|v| v.as_bool());

        Ok(CallToolResult { content, structured_content: None, is_error, meta: None })
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let catalog = self.catalog().await;
        let resources: Vec<Resource> = catalog
            .resources()
            .iter()
            .filter_map(|descriptor| {
                let mut resource: Resource = serde_json::from_value(descriptor.raw.clone()).ok()?;
                resource.raw.uri = descriptor.prefixed_uri.clone();
                Some(resource)
            })
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let start = Instant::now();
        let catalog = self.catalog().await;
        let (server_name, original_uri) = catalog
            .resolve_resource(&params.uri)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let server_name = server_name.to_string();
        let original_uri = original_uri.to_string();

        let Some(session) = self.supervisor.session(&server_name) else {
            return Err(McpError::internal_error(
                format!("server `{server_name}` is not connected"),
                None,
            ));
        };

        let result = session.read_resource(&original_uri, DEFAULT_CALL_DEADLINE).await;

        let success = result.is_ok();
        let error = result.as_ref().err().map(|e| e.to_string());
        self.registry.record_event(GatewayEvent::ResourceAccess {
            server_name: server_name.clone(),
            original: original_uri.clone(),
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        });

        let raw = result.map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let contents: Vec<ResourceContents> = raw
            .get("contents")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();

        Ok(ReadResourceResult { contents })
    }
}
