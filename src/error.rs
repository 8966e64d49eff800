//! HTTP error type.
//!
//! Every failure response uses one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "no file uploaded" } }
//! ```
//!
//! Codes: `bad_request` (400) and `upstream_error` (502).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself is invalid.
    #[error("{0}")]
    BadRequest(String),

    /// A backing service (storage, parser, embedder, database) failed.
    #[error("{service}: {source:#}")]
    Upstream {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn upstream(service: &'static str, source: anyhow::Error) -> Self {
        ApiError::Upstream { service, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Upstream { .. } => "upstream_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_and_code_mapping() {
        let e = ApiError::bad_request("no file uploaded");
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code(), "bad_request");
        assert_eq!(e.to_string(), "no file uploaded");

        let e = ApiError::upstream("parser", anyhow!("connection refused"));
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(e.code(), "upstream_error");
        assert_eq!(e.to_string(), "parser: connection refused");
    }

    #[test]
    fn test_upstream_message_keeps_context_chain() {
        let source = anyhow!("HTTP 503").context("embedding request failed");
        let e = ApiError::upstream("embedder", source);
        assert_eq!(e.to_string(), "embedder: embedding request failed: HTTP 503");
    }
}
