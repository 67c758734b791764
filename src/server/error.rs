//! HTTP error types for the booklog server.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::store::{ErrorKind, StoreError};
use crate::runtime::handle::RuntimeError;
use crate::validate::ValidationReport;

/// Error wrapper for converting runtime errors to HTTP responses.
///
/// Error responses have the format:
/// ```json
/// { "status": "error", "kind": "not_found", "message": "..." }
/// ```
/// Validation failures also carry a `fields` list.
#[derive(Debug)]
pub struct ApiError(pub RuntimeError);

impl ApiError {
    /// A 400 for a request that could not be decoded at all.
    pub fn bad_request(field: &'static str, message: impl Into<String>) -> Self {
        ApiError(RuntimeError::Store(StoreError::Validation(
            ValidationReport::single(field, message),
        )))
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::Validation => "validation",
        ErrorKind::InvalidTransition => "invalid_transition",
        ErrorKind::Internal => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::InvalidTransition => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if kind == ErrorKind::Internal {
            tracing::error!(error = %self.0, "request failed");
        }

        let mut body = serde_json::json!({
            "status": "error",
            "kind": kind_label(kind),
            "message": self.0.to_string()
        });
        if let RuntimeError::Store(StoreError::Validation(report)) = &self.0 {
            body["fields"] = serde_json::json!(report.errors);
        }

        (status, Json(body)).into_response()
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("body", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request("id", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("query", rejection.body_text())
    }
}
