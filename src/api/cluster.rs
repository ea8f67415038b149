//! Cluster status endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::cluster::PeerNode;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ClusterStatusResponse {
    pub node_id: String,
    pub peers: Vec<PeerNode>,
}

/// GET /api/v1/peers - configured peers and their health
#[tracing::instrument(name = "http.cluster_peers", skip(state))]
pub async fn cluster_peers(State(state): State<AppState>) -> Json<ClusterStatusResponse> {
    Json(ClusterStatusResponse {
        node_id: state.settings.node.id.clone(),
        peers: state.registry.list_all(),
    })
}
