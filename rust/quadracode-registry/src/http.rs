//! HTTP surface for the registry (spec §6), grounded on
//! `knhk-sidecar::rest_api::SidecarRestApiServer`'s axum router-plus-listener
//! wrapper.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::RegistryError;
use crate::registry::{HeartbeatRequest, ListFilter, RegisterRequest, Registry};

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match self {
            RegistryError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            RegistryError::HotpathAgent => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/agents/register", post(register))
        .route("/agents/:id/heartbeat", post(heartbeat))
        .route("/agents", get(list))
        .route("/agents/:id", get(get_agent))
        .route("/agents/:id/hotpath", post(set_hotpath))
        .route("/agents/:id", delete(remove_agent))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

async fn register(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<RegisterRequest>,
) -> Json<quadracode_types::AgentRecord> {
    Json(registry.register(req))
}

async fn heartbeat(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<String>,
    Json(mut req): Json<HeartbeatRequest>,
) -> Result<Json<quadracode_types::AgentRecord>, RegistryError> {
    req.agent_id = id;
    registry.heartbeat(req).map(Json)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    healthy_only: bool,
    #[serde(default)]
    hotpath_only: bool,
}

async fn list(
    State(registry): State<Arc<Registry>>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<quadracode_types::AgentRecord>> {
    Json(registry.list(ListFilter { healthy_only: q.healthy_only, hotpath_only: q.hotpath_only }))
}

async fn get_agent(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<String>,
) -> Result<Json<quadracode_types::AgentRecord>, RegistryError> {
    registry.get(&id).map(Json)
}

#[derive(Debug, Deserialize)]
struct HotpathBody {
    hotpath: bool,
}

async fn set_hotpath(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<String>,
    Json(body): Json<HotpathBody>,
) -> Result<Json<quadracode_types::AgentRecord>, RegistryError> {
    registry.set_hotpath(&id, body.hotpath).map(Json)
}

#[derive(Debug, Deserialize)]
struct RemoveQuery {
    #[serde(default)]
    force: bool,
}

async fn remove_agent(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<String>,
    Query(q): Query<RemoveQuery>,
) -> Result<StatusCode, RegistryError> {
    registry.remove(&id, q.force)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(State(registry): State<Arc<Registry>>) -> Json<crate::registry::RegistryStats> {
    Json(registry.stats())
}

async fn health() -> &'static str {
    "ok"
}

/// Serve the registry's HTTP surface until the process is shut down.
pub async fn serve(registry: Arc<Registry>, bind_address: &str) -> std::io::Result<()> {
    let app = router(registry);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(%bind_address, "agent registry listening");
    axum::serve(listener, app).await
}
