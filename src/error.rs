//! Error types for the service.
//!
//! Startup failures abort the bootstrap sequence and are returned to the
//! caller. Request failures are values returned by handlers and are turned
//! into a response in exactly one place, the `IntoResponse` impl below.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Fatal errors raised while bringing the server up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database not reachable after {attempts} attempt(s): {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to bind listener on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid database configuration: {0}")]
    InvalidConfig(#[source] sqlx::Error),

    /// The connection's last lease was released and its store closed.
    #[error("database connection already closed")]
    ConnectionClosed,
}

/// Errors raised while handling a request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Carries an explicit response status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    /// The status this error will be answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Database(e) => tracing::error!(error = %e, "database error"),
            Self::Internal(e) => tracing::error!(error = ?e, "internal error"),
            Self::Status { .. } if status.is_server_error() => {
                tracing::error!(%status, message = %self, "request failed")
            }
            Self::Status { .. } => tracing::debug!(%status, message = %self, "request rejected"),
        }

        (status, self.to_string()).into_response()
    }
}

/// Response for a handler that panicked.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "internal server error".to_string()
    };
    tracing::error!(%message, "handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}
