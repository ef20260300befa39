//! Error types for notesync.

use thiserror::Error;

/// Result type alias using notesync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notesync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found in the remote store
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// The remote store or blob store refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend temporarily unreachable (network loss, lagging feed, shutdown)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Blob storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Identity provider rejected or failed a sign-in/sign-out
    #[error("Identity provider error: {0}")]
    Identity(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller-triggered retry of the same operation may succeed.
    ///
    /// Nothing in notesync retries automatically; this only feeds logging and
    /// the wording shown to the user.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::Request(_) | Error::Io(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
