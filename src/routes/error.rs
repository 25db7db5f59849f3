// JSON error responses for the query surface. Nothing here is retried.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FetchError, FetchErrorKind, PersistenceError, ServiceError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{0}")]
    BadRequest(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Fetch(e) => ApiError::Fetch(e),
            ServiceError::Persistence(e) => ApiError::Persistence(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Fetch(e) => match e.kind() {
                FetchErrorKind::Auth => StatusCode::SERVICE_UNAVAILABLE,
                FetchErrorKind::Transport | FetchErrorKind::Malformed => StatusCode::BAD_GATEWAY,
            },
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable reason, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Fetch(FetchError::Timeout(_)) => "fetch_timeout",
            ApiError::Fetch(FetchError::Auth(_)) => "missing_credentials",
            ApiError::Fetch(e) => match e.kind() {
                FetchErrorKind::Transport => "fetch_transport",
                FetchErrorKind::Auth => "fetch_auth",
                FetchErrorKind::Malformed => "fetch_malformed",
            },
            ApiError::Persistence(PersistenceError::Read(_)) => "persistence_read",
            ApiError::Persistence(PersistenceError::Write(_)) => "persistence_write",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub kind: String,
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.status().as_u16(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, kind = self.kind(), "request failed");
        }
        (status, axum::Json(ErrorBody::from(&self))).into_response()
    }
}
