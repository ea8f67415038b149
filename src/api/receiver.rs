//! Peer-facing invalidation endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::Result;
use crate::server::AppState;

/// POST {cluster.endpoint_path} - apply an invalidation sent by a peer
#[tracing::instrument(name = "http.receive_invalidation", skip(state, body), fields(len = body.len()))]
pub async fn receive_invalidation(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let outcome = state.receiver.receive(&body)?;

    Ok((
        outcome.status_code(),
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        outcome.body(),
    )
        .into_response())
}
