#![forbid(unsafe_code)]

//! # Attestor Gateway
//!
//! The two HTTP surfaces of a node:
//!
//! - the **peer router** (`/task/prepare`, `/task/validate`), spoken between
//!   cluster nodes with canonical codec bodies;
//! - the **API router** (`/health`, `/sources`, `/task`, `/helius/webhook`),
//!   spoken by operators, end users, and webhook providers with JSON bodies.
//!
//! Both are stateless: any node can serve either. Error responses share one
//! JSON envelope, `{ "error": <tag>, "context": <detail> }`.

use attestor_types::error::{ErrorCode, OracleError};
use attestor_types::model::ErrorBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// The external API router.
pub mod api;
/// CORS middleware shared by both routers.
pub mod cors;
/// The peer-protocol router.
pub mod peer;
/// Server bootstrap helpers.
pub mod serve;

/// An error surfaced on an HTTP boundary.
pub struct AppError {
    status: StatusCode,
    body: ErrorBody,
}

impl AppError {
    /// Maps a protocol error onto an HTTP status plus the shared envelope.
    pub fn from_oracle(err: OracleError) -> Self {
        let status = match &err {
            OracleError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorBody {
                error: err.code().to_string(),
                context: Some(err.to_string()),
            },
        }
    }

    /// The fixed 400 used when a `/task/validate` signature does not verify.
    /// The body is exactly `{"error":"Invalid signature"}`.
    pub fn invalid_signature() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "Invalid signature".to_string(),
                context: None,
            },
        }
    }

    /// A 401 with the shared envelope.
    pub fn unauthorized(context: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: "unauthorized".to_string(),
                context: Some(context.to_string()),
            },
        }
    }

    /// A 400 with the shared envelope.
    pub fn bad_request(context: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "bad_request".to_string(),
                context: Some(context),
            },
        }
    }

    /// The HTTP status this error renders as.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<OracleError> for AppError {
    fn from(err: OracleError) -> Self {
        Self::from_oracle(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
