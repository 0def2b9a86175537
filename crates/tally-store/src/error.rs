//! Error types for the resource store.

use thiserror::Error;

/// Errors that can occur when talking to the remote resource store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {resource}/{id}")]
    NotFound { resource: String, id: String },

    /// The store rejected the record.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-success status from the store.
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The store is not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Invalid response from the store.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_connect() || e.is_timeout(),
            StoreError::Status { status, .. } => *status == 429 || *status >= 500,
            StoreError::Unavailable(_) => true,
            _ => false,
        }
    }
}
