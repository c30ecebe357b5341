//! Closed error taxonomy (spec §7) with an `axum` response projection.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-safe message. Never echoes the underlying `anyhow` chain unless
    /// `dev_mode` is set — stack traces never leave the process otherwise.
    fn message(&self, dev_mode: bool) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) | Self::ExternalUnavailable(msg) => {
                msg.clone()
            }
            Self::RateLimited { .. } => "Too many requests, please slow down.".to_string(),
            Self::Timeout => "The request took too long and was cancelled.".to_string(),
            Self::Internal(err) => {
                if dev_mode {
                    format!("{err:#}")
                } else {
                    "An unexpected error occurred.".to_string()
                }
            }
        }
    }

    pub fn into_response_with_dev_mode(self, dev_mode: bool) -> Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status();
        let retry_after = match &self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let message = self.message(dev_mode);

        let mut response = (
            status,
            Json(json!({
                "success": false,
                "error": {
                    "message": message,
                    "status": status.as_u16(),
                },
            })),
        )
            .into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Default `IntoResponse` impl assumes production mode (`dev_mode = false`).
/// Handlers that need dev-mode stack traces call
/// `into_response_with_dev_mode` directly via the `AppState`'s config.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_dev_mode(false)
    }
}

pub type AppResult<T> = Result<T, AppError>;
