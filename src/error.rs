use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for nodeprobe
#[derive(Error, Debug)]
pub enum NodeProbeError {
    // Stat store errors
    #[error("Stat store {path} has an unexpected format: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Stat store I/O failed on {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Node list errors
    #[error("Invalid node list: {0}")]
    InvalidNodes(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for nodeprobe operations
pub type Result<T> = std::result::Result<T, NodeProbeError>;

impl NodeProbeError {
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        NodeProbeError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NodeProbeError::Storage {
            path: path.into(),
            source,
        }
    }

    /// True for a store that exists but cannot be trusted for merging
    pub fn is_format(&self) -> bool {
        matches!(self, NodeProbeError::Format { .. })
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            NodeProbeError::InvalidRequest(_)
            | NodeProbeError::InvalidNodes(_)
            | NodeProbeError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            NodeProbeError::EndpointNotFound(_) => StatusCode::NOT_FOUND,

            // 503 Service Unavailable
            NodeProbeError::Format { .. } | NodeProbeError::Storage { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            NodeProbeError::Io(_)
            | NodeProbeError::Json(_)
            | NodeProbeError::MissingEnvVar(_)
            | NodeProbeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for NodeProbeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            NodeProbeError::InvalidRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            NodeProbeError::EndpointNotFound("1.1.1.1,80,ss".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NodeProbeError::format("stats.csv", "bad header").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            NodeProbeError::MissingEnvVar("STATS_PATH".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(NodeProbeError::InvalidConfig("bad".to_string()).is_client_error());
        assert!(!NodeProbeError::InvalidConfig("bad".to_string()).is_server_error());

        let storage = NodeProbeError::storage(
            "stats.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(storage.is_server_error());
        assert!(!storage.is_format());
        assert!(NodeProbeError::format("stats.csv", "x").is_format());
    }

    #[test]
    fn test_format_error_message_names_path() {
        let err = NodeProbeError::format("/tmp/stats.csv", "row 3 has 4 columns, expected 7");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/stats.csv"));
        assert!(msg.contains("expected 7"));
    }
}
