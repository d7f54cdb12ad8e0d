//! Error handling module
//!
//! Provides unified error types and handling for the entire relay.
//!
//! The variants follow the relay's failure taxonomy: connectivity loss is recovered by the
//! listener loop, introspection failures fall back to placeholders, sink failures are logged,
//! and persistence failures abort the message for the event being handled.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Change source connectivity: {0}")]
    Connectivity(String),

    #[error("Introspection failed: {0}")]
    Introspection(String),

    #[error("Snapshot store failure: {0}")]
    Persistence(String),

    #[error("Message sink rejected delivery: {0}")]
    Sink(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Re-tag a store-side database or pool error as a persistence failure.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        AppError::Persistence(err.to_string())
    }

    /// Re-tag a catalog-side error as an introspection failure.
    pub fn introspection(err: impl std::fmt::Display) -> Self {
        AppError::Introspection(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "POOL_EXHAUSTED",
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Http(e) => {
                error!("HTTP client error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "An upstream request failed".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Json(e) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Payload is not valid JSON".to_string(),
                Some(e.to_string()),
            ),
            AppError::Connectivity(msg)
            | AppError::Introspection(msg)
            | AppError::Persistence(msg) => {
                error!("Backend error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BACKEND_UNAVAILABLE",
                    "A backend dependency is unavailable".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Sink(msg) => (
                StatusCode::BAD_GATEWAY,
                "SINK_ERROR",
                "Message delivery failed".to_string(),
                Some(msg.clone()),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                None,
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias used across the relay
pub type AppResult<T> = Result<T, AppError>;
