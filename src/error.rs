use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use serde_json::json;
use thiserror::Error;

use crate::llm::UpstreamError;

/// Errors a handler can answer with. Everything serializes as
/// `{"error": message}`; streaming errors that occur after response headers
/// are sent travel in-band as stream events instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid password")]
    InvalidPassword,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidPassword => StatusCode::UNAUTHORIZED,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// Bodies that cannot be read (bad JSON, wrong content type) answer 400 in
// the same error shape instead of axum's plain-text rejection.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
