//! Proxy error type and its HTTP rendering.
//!
//! Network failures that survive the agent's fallback policy reach the page
//! as `502 Bad Gateway`; everything is serialized as a small JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use haven_agent::EventLoopClosed;
use haven_core::{ConfigError, HavenError, NetworkError};
use haven_storage::LmdbStoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Haven(#[from] HavenError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] LmdbStoreError),

    #[error(transparent)]
    LoopClosed(#[from] EventLoopClosed),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Network(_) | ProxyError::Haven(HavenError::Network(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::LoopClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Haven(_) => "AGENT_ERROR",
            ProxyError::Config(_) => "CONFIG_ERROR",
            ProxyError::Store(_) => "STORE_ERROR",
            ProxyError::LoopClosed(_) => "AGENT_UNAVAILABLE",
            ProxyError::Network(_) => "UPSTREAM_UNAVAILABLE",
            ProxyError::BadRequest(_) => "BAD_REQUEST",
            ProxyError::Io(_) => "IO_ERROR",
            ProxyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
