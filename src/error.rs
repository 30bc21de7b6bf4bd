use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AppError {
    /// A required field is missing or malformed; nothing was attempted.
    #[error("{0}")]
    Validation(String),

    #[error("invalid request signature")]
    InvalidSignature,

    /// The dedup store already holds the key for this action.
    #[error("{0}")]
    Duplicate(String),

    #[error("{provider} request failed: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn upstream(provider: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Upstream {
            provider,
            message: message.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature => StatusCode::FORBIDDEN,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream { .. } | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Log a failure of a best-effort side effect and carry on.
pub fn handle_error(context: &str, e: impl std::error::Error) {
    warn!(error = %e, "{context}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            AppError::Validation("missing CallSid".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InvalidSignature.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Duplicate("call already initiated".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::upstream("dyte", "timeout").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_message_names_the_provider() {
        let e = AppError::upstream("chatwoot", "502 Bad Gateway");
        assert_eq!(e.to_string(), "chatwoot request failed: 502 Bad Gateway");
    }
}
