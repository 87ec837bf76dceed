//! Error taxonomy for the REST boundary.
//!
//! Three classes cross the edge: client-caused validation failures (400),
//! missing resources (404), and upstream gateway failures reported verbatim
//! (500). Everything else is handled internally and logged, never surfaced.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Errors surfaced to REST clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request is malformed or violates an operation invariant.
    #[error("{0}")]
    Validation(String),
    /// A referenced resource (pool, method, receipt) does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The RPC gateway rejected the call; the remote message is preserved.
    #[error("{0}")]
    Upstream(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };
        let message = self.to_string();
        let body = ErrorBody {
            error,
            message: &message,
        };
        (status, Json(serde_json::json!(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (
                ApiError::Upstream("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
