//! Error types for portway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors raised during startup and background work.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Request-path errors surfaced to proxy clients.
///
/// Every variant maps to a plain-text HTTP response; transport failures
/// against a backend never reach the client directly, they are retried and
/// only the exhausted form ([`RouteError::AllInstancesFailed`]) escapes.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Missing Host header")]
    MissingHostHeader,

    #[error("No service found for host: {0}")]
    ServiceNotFound(String),

    #[error("No healthy instances available")]
    NoHealthyInstances,

    #[error("All instances failed to process the request")]
    AllInstancesFailed(Option<String>),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            RouteError::MissingHostHeader => {
                (StatusCode::BAD_REQUEST, "Missing Host header".to_string())
            },
            RouteError::ServiceNotFound(host) => (
                StatusCode::NOT_FOUND,
                format!("No service found for host: {}", host),
            ),
            RouteError::NoHealthyInstances => (
                StatusCode::SERVICE_UNAVAILABLE,
                "No healthy instances available".to_string(),
            ),
            RouteError::AllInstancesFailed(last_error) => (
                StatusCode::SERVICE_UNAVAILABLE,
                match last_error {
                    Some(err) => format!("All instances failed to process the request: {}", err),
                    None => "All instances failed to process the request".to_string(),
                },
            ),
            RouteError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, body).into_response()
    }
}

impl From<crate::registry::RegistryError> for RouteError {
    fn from(err: crate::registry::RegistryError) -> Self {
        RouteError::Internal(format!("Registry error: {}", err))
    }
}

impl From<crate::routing::SelectionError> for RouteError {
    fn from(err: crate::routing::SelectionError) -> Self {
        RouteError::Internal(format!("Selection error: {}", err))
    }
}
