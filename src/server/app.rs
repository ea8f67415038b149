use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::{api_routes, receive_invalidation, session_logout_listener};

use super::middleware::{detect_logout, remote_address_filter};
use super::AppState;

/// Largest request body accepted on any route. Oversized invalidation
/// messages below this size still reach the decoder and are rejected there.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Peer-facing and administrative routes sit behind the ip filter
    let relay_routes = Router::new()
        .route(
            &state.settings.cluster.endpoint_path,
            post(receive_invalidation),
        )
        .route(
            "/session-logout-listener",
            get(session_logout_listener).post(session_logout_listener),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            remote_address_filter,
        ));

    Router::new()
        .merge(relay_routes)
        // Merge API routes
        .merge(api_routes())
        // Add middleware
        .layer(middleware::from_fn_with_state(state.clone(), detect_logout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}
