//! Logout endpoints: administrative logout by principal, and the relay's own
//! logout action.

use axum::{
    extract::{rejection::FormRejection, Form, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::logout::SessionLoggedOut;
use crate::server::{session_cookie, AppState};

/// GET|POST /session-logout-listener - log out every session of the named principals
///
/// Parameters: repeated `username`, and `password` when one is configured.
/// They are read from the query string and, on POST, also from a
/// form-encoded body.
#[tracing::instrument(name = "http.session_logout_listener", skip_all)]
pub async fn session_logout_listener(
    State(state): State<AppState>,
    method: Method,
    Query(mut params): Query<Vec<(String, String)>>,
    form: std::result::Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<Response> {
    // On GET the form extractor reads the query string again
    if method != Method::GET && method != Method::HEAD {
        if let Ok(Form(body)) = form {
            params.extend(body);
        }
    }

    let password = params
        .iter()
        .find(|(key, _)| key == "password")
        .map(|(_, value)| value.as_str());

    if !state.access.password_matches(password) {
        tracing::warn!("Administrative logout with wrong or missing password");
        return Err(AppError::Forbidden);
    }

    let mut usernames: Vec<&str> = Vec::new();
    for (key, value) in &params {
        if key == "username" && !value.is_empty() && !usernames.contains(&value.as_str()) {
            usernames.push(value);
        }
    }

    for username in usernames {
        state.detector.on_principal_logout(username)?;
    }

    Ok(plain_ok())
}

/// GET|POST /logout - end the caller's session
///
/// Marks the response so the logout middleware invalidates and broadcasts.
#[tracing::instrument(name = "http.logout", skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie_name = &state.settings.logout.session_cookie;
    let mut response = plain_ok();

    if let Some(session_id) = session_cookie(&headers, cookie_name) {
        response.extensions_mut().insert(SessionLoggedOut(session_id));
        if let Ok(value) = format!("{cookie_name}=; Max-Age=0; Path=/").parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }

    response
}

fn plain_ok() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "OK",
    )
        .into_response()
}
