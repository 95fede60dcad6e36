//! Service-wide error types.
//!
//! Every failure a request can observe is a [`ServiceError`]. Handlers return
//! it as-is; the [`IntoResponse`] impl turns it into a structured JSON body so
//! no raw error ever reaches the client.

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::engine::EngineError;
use crate::lifecycle::Phase;

/// Seconds a client is told to wait before retrying an unavailable engine.
pub const RETRY_AFTER_SECS: u64 = 5;

/// Main error type for the service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("detection engine construction failed: {0}")]
    EngineConstructionFailed(#[source] EngineError),

    #[error("detection engine unavailable (phase: {phase})")]
    EngineUnavailable { phase: Phase },

    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    #[error("engine cleanup failed during shutdown: {0}")]
    ShutdownCleanupFailed(#[source] EngineError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("request not completed within {secs}s")]
    Timeout { secs: u64 },

    #[error("insufficient samples: got {got}, need at least {required}")]
    InsufficientSamples { got: usize, required: usize },

    #[error("analysis failed: {0}")]
    Analysis(#[source] EngineError),

    #[error("route {method} {path} registered twice")]
    DuplicateRoute { method: Method, path: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EngineConstructionFailed(_) => "engine_construction_failed",
            Self::EngineUnavailable { .. } => "engine_unavailable",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::ShutdownCleanupFailed(_) => "shutdown_cleanup_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Timeout { .. } => "request_timeout",
            Self::InsufficientSamples { .. } => "insufficient_samples",
            Self::Analysis(_) => "analysis_failed",
            Self::DuplicateRoute { .. } => "duplicate_route",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::EngineUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::InsufficientSamples { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineUnavailable { .. })
    }
}

/// Response extension set on every rendered [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorKind(pub &'static str);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: String,
    retryable: bool,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorKind(self.kind()));
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}
