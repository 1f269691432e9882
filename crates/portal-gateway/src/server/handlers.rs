//! REST + SSE handlers for the management surface. Kept separate from
//! `mod.rs`'s router assembly, matching the lineage's split between
//! routing and handler bodies.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use portal_core::aggregator::{build_catalog, SessionInventory};
use portal_core::registry::Registry;
use portal_core::ServerStatus;
use serde::Serialize;
use serde_json::{json, Value};

use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub supervisor: Arc<Supervisor>,
    pub started_at: Instant,
}

#[derive(Serialize)]
pub struct ServersResponse {
    servers: Vec<ServerStatus>,
}

pub async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    let servers = state.registry.list_servers().await;
    Json(ServersResponse { servers })
}

pub async fn enable_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    toggle(state, &name, true).await
}

pub async fn disable_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    toggle(state, &name, false).await
}

async fn toggle(state: AppState, name: &str, enabled: bool) -> Json<Value> {
    match state.supervisor.set_enabled(name, enabled).await {
        Some(_) => Json(json!({"success": true, "message": format!("{name} updated")})),
        None => Json(json!({"success": false, "message": format!("unknown server `{name}`")})),
    }
}

pub async fn reconnect_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.supervisor.force_reconnect(&name).await {
        Json(json!({"success": true, "message": format!("{name} reconnecting")}))
    } else {
        Json(json!({"success": false, "message": format!("unknown server `{name}`")}))
    }
}

pub async fn refresh_servers(State(state): State<AppState>) -> impl IntoResponse {
    state.supervisor.refresh().await;
    let discovered_count = state.registry.list_servers().await.len();
    Json(json!({"data": {"discovered_count": discovered_count}}))
}

async fn catalog(registry: &Registry) -> portal_core::aggregator::Catalog {
    let records = registry.snapshot().await;
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

pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = catalog(&state.registry).await;
    Json(json!({"tools": catalog.tools()}))
}

pub async fn list_resources(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = catalog(&state.registry).await;
    Json(json!({"resources": catalog.resources()}))
}

pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.supervisor.read_manual_config() {
        Ok(document) => Json(document).into_response(),
        Err(err) => {
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()})))
                .into_response()
        }
    }
}

pub async fn set_config(State(state): State<AppState>, Json(document): Json<Value>) -> impl IntoResponse {
    match state.supervisor.write_manual_config(&document).await {
        Ok(updated_servers) => {
            Json(json!({"data": {"updated_servers": updated_servers}})).into_response()
        }
        Err(err) => {
            (axum::http::StatusCode::BAD_REQUEST, Json(json!({"error": err.to_string()}))).into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok", uptime: state.started_at.elapsed().as_secs() })
}

/// `/api/v1/events`: first frame is `initial_status` with the full
/// snapshot, then every subsequent event the bus delivers to this
/// subscriber, verbatim.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let initial = portal_core::GatewayEvent::InitialStatus { servers: state.registry.list_servers().await };
    let mut rx = state.registry.events().subscribe();

    let live = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await;
        Some((event, rx))
    });

    let stream = stream::once(async move { initial }).chain(live).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}
