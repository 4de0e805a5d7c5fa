//! HTTP error envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use closure_core::closure::SourceError;
use closure_shared::AppError;
use serde_json::json;

/// [`AppError`] rendered as `{ success: false, errors: [...] }`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        Self(AppError::Database(err.0))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (
            status,
            Json(json!({
                "success": false,
                "data": null,
                "errors": [{
                    "code": self.0.error_code(),
                    "message": self.0.message(),
                }]
            })),
        )
            .into_response()
    }
}
