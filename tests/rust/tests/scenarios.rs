//! The six end-to-end scenarios driven against a real gateway with a real
//! (echo) upstream over stdio. Each test gets its own temp `$HOME` and its
//! own ephemeral port.

use std::time::Duration;

use portal_core::domain::{GatewayEvent, ServerEventKind};
use portal_scenarios::{echo_server_decl, write_json, Harness};
use rmcp::model::{CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;

fn test_client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation { name: "scenario-test".to_string(), version: "0.0.1".to_string(), ..Default::default() },
        ..Default::default()
    }
}

async fn wait_until<F>(mut predicate: F, timeout: Duration)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_and_aggregation() {
    let home = tempfile::tempdir().unwrap();
    write_json(&home.path().join(".cursor/mcp.json"), &echo_server_decl("alpha"));
    let harness = Harness::start(home).await;

    let servers = harness.rest_get("/api/v1/servers").await;
    let list = servers["servers"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "alpha");
    assert_eq!(list[0]["state"], "ready");

    let tools = harness.rest_get("/api/v1/tools").await;
    let tool_names: Vec<_> =
        tools["tools"].as_array().unwrap().iter().map(|t| t["prefixed_name"].as_str().unwrap()).collect();
    assert!(tool_names.contains(&"alpha.echo"));
}

#[tokio::test(flavor = "multi_thread")]
async fn call_routing_reaches_the_prefixed_tool() {
    let home = tempfile::tempdir().unwrap();
    write_json(&home.path().join(".cursor/mcp.json"), &echo_server_decl("alpha"));
    let harness = Harness::start(home).await;

    let mut events = harness.registry.events().subscribe();

    let transport = StreamableHttpClientTransport::from_uri(harness.mcp_url());
    let client = test_client_info().serve(transport).await.expect("client connects");

    let result = client
        .call_tool(CallToolRequestParams {
            name: "alpha.echo".to_string().into(),
            arguments: serde_json::json!({"msg": "hi"}).as_object().cloned(),
            task: None,
            meta: None,
        })
        .await
        .expect("call succeeds");

    let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.as_str());
    assert_eq!(text, Some("hi"));

    let mut saw_success = false;
    for _ in 0..20 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.expect("event within 2s");
        if let GatewayEvent::ToolExecution { server_name, original, success, .. } = event {
            if server_name == "alpha" && original == "echo" {
                assert!(success);
                saw_success = true;
                break;
            }
        }
    }
    assert!(saw_success, "expected a tool_execution event for alpha.echo");

    client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_then_recovery() {
    let home = tempfile::tempdir().unwrap();
    write_json(&home.path().join(".cursor/mcp.json"), &echo_server_decl("alpha"));
    let harness = Harness::start(home).await;

    let mut events = harness.registry.events().subscribe();

    let transport = StreamableHttpClientTransport::from_uri(harness.mcp_url());
    let client = test_client_info().serve(transport).await.expect("client connects");
    let _ = client
        .call_tool(CallToolRequestParams { name: "alpha.crash".to_string().into(), arguments: None, task: None, meta: None })
        .await;
    client.cancel().await.ok();

    let mut saw_disconnected = false;
    let mut saw_reconnection = false;
    for _ in 0..200 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.expect("event within 5s");
        match event {
            GatewayEvent::ServerEvent { event_kind: ServerEventKind::Disconnected, server_name, .. }
                if server_name.as_deref() == Some("alpha") =>
            {
                saw_disconnected = true;
            }
            GatewayEvent::ServerReconnection { server_name, success, .. } if server_name == "alpha" && success => {
                saw_reconnection = true;
            }
            _ => {}
        }
        if saw_disconnected && saw_reconnection {
            break;
        }
    }
    assert!(saw_disconnected, "expected a disconnected server_event");
    assert!(saw_reconnection, "expected a successful server_reconnection");
}

#[tokio::test(flavor = "multi_thread")]
async fn collision_precedence_cursor_beats_windsurf() {
    let home = tempfile::tempdir().unwrap();
    write_json(
        &home.path().join(".cursor/mcp.json"),
        &serde_json::json!({"mcpServers": {"alpha": {"command": portal_scenarios::echo_server_path(), "args": []}}}),
    );
    write_json(
        &home.path().join(".windsurf/mcp_servers.json"),
        &serde_json::json!({"mcpServers": {"alpha": {"command": "does-not-exist-binary", "args": []}}}),
    );
    let harness = Harness::start(home).await;

    let servers = harness.rest_get("/api/v1/servers").await;
    let list = servers["servers"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "alpha");
    assert_eq!(list[0]["state"], "ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn disable_then_reconnect() {
    let home = tempfile::tempdir().unwrap();
    write_json(&home.path().join(".cursor/mcp.json"), &echo_server_decl("alpha"));
    let harness = Harness::start(home).await;

    let response = harness.rest_post("/api/v1/servers/alpha/disable", &serde_json::Value::Null).await;
    assert_eq!(response["success"], true);

    let record = harness.supervisor.session("alpha");
    assert!(record.is_none(), "disabling should have torn the session down");

    let servers = harness.rest_get("/api/v1/servers").await;
    let list = servers["servers"].as_array().unwrap();
    assert_eq!(list[0]["state"], "stopped");
    assert_eq!(list[0]["tool_count"], 0);

    let response = harness.rest_post("/api/v1/servers/alpha/enable", &serde_json::Value::Null).await;
    assert_eq!(response["success"], true);

    wait_until(
        || {
            let snapshot = harness.supervisor.session("alpha");
            snapshot.is_some()
        },
        Duration::from_secs(2),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let servers = harness.rest_get("/api/v1/servers").await;
    let list = servers["servers"].as_array().unwrap();
    assert_eq!(list[0]["state"], "ready");
    assert_eq!(list[0]["tool_count"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn config_round_trip_is_a_no_op() {
    let home = tempfile::tempdir().unwrap();
    write_json(&home.path().join(".cursor/mcp.json"), &echo_server_decl("alpha"));
    let harness = Harness::start(home).await;

    let document = harness.rest_get("/api/v1/config").await;
    let response = harness.rest_post("/api/v1/config", &document).await;
    assert!(response.get("error").is_none());

    let servers = harness.rest_get("/api/v1/servers").await;
    assert_eq!(servers["servers"].as_array().unwrap().len(), 1);
}
