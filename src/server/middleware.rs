use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::AppError;
use crate::logout::SessionLoggedOut;
use crate::session::truncate_session_id;

/// Remote address filter for relay routes.
/// Without a configured filter every caller is allowed.
pub async fn remote_address_filter(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if !state.access.remote_allowed(remote) {
        tracing::warn!(
            remote = ?remote,
            path = %req.uri().path(),
            "Request from address outside ip filter"
        );
        return AppError::Forbidden.into_response();
    }

    next.run(req).await
}

/// Read a cookie value from the request headers
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Logout detection after the handler has produced its response.
///
/// A [`SessionLoggedOut`] marker names the session explicitly. Otherwise a
/// successful or redirecting response on a configured logout path logs out
/// the session named by the session cookie.
pub async fn detect_logout(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let logout = &state.settings.logout;
    let on_logout_path = logout.paths.iter().any(|p| p == req.uri().path());
    let cookie_session = if on_logout_path {
        session_cookie(req.headers(), &logout.session_cookie)
    } else {
        None
    };

    let response = next.run(req).await;

    let marked = response
        .extensions()
        .get::<SessionLoggedOut>()
        .map(|marker| marker.0.clone());
    let status = response.status();
    let session_id = marked.or_else(|| {
        (status.is_success() || status.is_redirection())
            .then_some(cookie_session)
            .flatten()
    });

    let Some(session_id) = session_id else {
        return response;
    };

    match state.detector.on_logout(&session_id) {
        Ok(outcome) => {
            tracing::debug!(
                session_id = %truncate_session_id(&session_id),
                outcome = ?outcome,
                "Logout detected"
            );
            response
        }
        Err(e) => {
            tracing::error!(
                session_id = %truncate_session_id(&session_id),
                error = %e,
                "Local invalidation failed during logout"
            );
            AppError::SessionStore(e).into_response()
        }
    }
}
