//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub node_id: String,
    pub uptime_seconds: u64,
    pub peers: PeerHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct PeerHealthResponse {
    pub total: usize,
    pub active: usize,
    pub down: usize,
}

/// GET /health - liveness, also used by peers to probe this node
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let total = state.registry.len();
    let down = state.registry.list_down().len();

    let status = if down == 0 { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        node_id: state.settings.node.id.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        peers: PeerHealthResponse {
            total,
            active: total - down,
            down,
        },
    })
}
