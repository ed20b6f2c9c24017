use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// A downstream call failed. `status` is relayed, `message` is the
    /// route's generic message.
    Downstream { status: StatusCode, message: String },

    Unauthorized,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Downstream { status, message } => write!(f, "{message} ({status})"),
            ApiError::Unauthorized => write!(f, "Unauthorized"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Downstream { status, message } => (status, message),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

impl ApiError {
    pub fn downstream(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Downstream {
            status,
            message: message.into(),
        }
    }

    /// Transport failure: the downstream never answered.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::downstream(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}
