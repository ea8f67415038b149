//! API layer - HTTP endpoint handlers organized by concern.

mod cluster;
mod health;
mod logout;
mod metrics;
mod receiver;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use cluster::{cluster_peers, ClusterStatusResponse};
pub use health::{health, HealthResponse, PeerHealthResponse};
pub use logout::{logout, session_logout_listener};
pub use metrics::prometheus_metrics;
pub use receiver::receive_invalidation;
pub use routes::api_routes;
