use axum::{routing::get, Router};

use crate::server::AppState;

use super::cluster::cluster_peers;
use super::health::health;
use super::logout::logout;
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        // Logout action
        .route("/logout", get(logout).post(logout))
        // Cluster status
        .nest("/api/v1", Router::new().route("/peers", get(cluster_peers)))
}
