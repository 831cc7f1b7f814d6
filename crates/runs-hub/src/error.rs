//! Error types for the runs hub

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum HubError {
    /// A required setting is missing or malformed
    Config(String),
    BadRequest(String),
    /// Listing the backing store failed
    Store(blob_listing::BlobStoreError),
    Cache(runs_cache::CacheError),
    Io(Box<std::io::Error>),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Config(msg) => write!(f, "Configuration error: {}", msg),
            HubError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            HubError::Store(err) => write!(f, "Storage error: {}", err),
            HubError::Cache(err) => write!(f, "Cache error: {}", err),
            HubError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HubError::Store(err) => Some(err),
            HubError::Cache(err) => Some(err),
            HubError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<blob_listing::BlobStoreError> for HubError {
    fn from(err: blob_listing::BlobStoreError) -> Self {
        HubError::Store(err)
    }
}

impl From<runs_cache::CacheError> for HubError {
    fn from(err: runs_cache::CacheError) -> Self {
        HubError::Cache(err)
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for HubError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        HubError::Config(err.to_string())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            HubError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            HubError::Config(_) => {
                tracing::error!(error = %self, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            HubError::Store(_) | HubError::Cache(runs_cache::CacheError::Store(_)) => {
                tracing::error!(error = %self, "Run listing failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Failed to list runs from storage".to_string(),
                )
            }
            HubError::Cache(_) | HubError::Io(_) => {
                tracing::error!(error = %self, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
