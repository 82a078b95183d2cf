//! # ApiError
//!
//! Maps service failures to HTTP responses. Every error body has the shape
//! `{ "error": <kind>, "message": <text> }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use services::{FailureKind, ServiceError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No usable `x-owner-id` header on a request that creates a map
    #[error("missing or malformed owner id")]
    MissingOwner,

    /// Request-level input problems caught before reaching a service
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => match err.kind() {
                FailureKind::InvalidArchive
                | FailureKind::MissingDescriptor
                | FailureKind::MalformedDocument
                | FailureKind::MalformedTree
                | FailureKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
                FailureKind::NotFound => StatusCode::NOT_FOUND,
                FailureKind::NoRootNode | FailureKind::PersistenceFailed | FailureKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::MissingOwner => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Service(err) => err.kind().as_str(),
            Self::MissingOwner => "unauthorized",
            Self::BadRequest(_) => FailureKind::Invalid.as_str(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
