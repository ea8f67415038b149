use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::SettingsError;
use crate::receiver::ReceiveError;
use crate::session::SessionStoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Session store error: {0}")]
    SessionStore(#[from] SessionStoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ReceiveError> for AppError {
    fn from(err: ReceiveError) -> Self {
        match err {
            ReceiveError::Store(e) => AppError::SessionStore(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn internal_message(log_msg: &str, public: &str) -> String {
    if is_production() {
        public.to_string()
    } else {
        log_msg.to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = internal_message(&log_msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Settings(e) => {
                let log_msg = e.to_string();
                let client_msg = internal_message(&log_msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::SessionStore(e) => {
                let log_msg = e.to_string();
                let client_msg = internal_message(&log_msg, "Session store unavailable");
                (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_STORE_ERROR", client_msg, log_msg)
            }
            AppError::Internal(e) => {
                let client_msg = internal_message(e, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, e.clone())
            }
            // Plain text, like the receiver route's answers
            AppError::Forbidden => return (StatusCode::FORBIDDEN, "Forbidden").into_response(),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
