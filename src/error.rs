// Error types for the ufiles client.

use std::path::PathBuf;
use thiserror::Error;

/// Every failure a ufiles call can surface.
///
/// Local validation errors (`NotFound`, `InvalidInput`) are raised before
/// any request leaves the process.
#[derive(Error, Debug)]
pub enum UFilesError {
    /// A local content source does not exist.
    #[error("File {0} not found")]
    NotFound(PathBuf),

    /// Malformed caller input, e.g. a non-HTTP URL for a URL upload.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The identity service refused to issue a token, or the storage
    /// service rejected the token again right after a refresh.
    #[error("Authentication failed: {status} - {body}")]
    AuthenticationFailed { status: u16, body: String },

    /// Non-success status from the storage service.
    #[error("Remote error: {status} - {body}")]
    RemoteError { status: u16, body: String },

    /// Transport-level failure (connect, TLS, body read).
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body or metadata could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UFilesError {
    /// HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            UFilesError::AuthenticationFailed { status, .. }
            | UFilesError::RemoteError { status, .. } => Some(*status),
            UFilesError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for ufiles operations.
pub type Result<T> = std::result::Result<T, UFilesError>;
