//! Error types for the Chunkstream server

use thiserror::Error;

/// Crate-wide result type for store operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the chunk and session stores
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Upload protocol errors
///
/// Every variant is local to the request that produced it.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to allocate session: {0}")]
    AllocationFailure(#[source] StorageError),

    #[error("Chunk body is empty")]
    EmptyBody,

    #[error("Invalid chunk index: {0}")]
    InvalidChunkIndex(String),

    /// The request could not be extracted (oversized body, malformed query)
    #[error("Request rejected: {reason}")]
    RejectedRequest {
        status: axum::http::StatusCode,
        reason: String,
    },

    #[error("Failed to write chunk {index} of {key}: {source}")]
    ChunkWriteFailure {
        key: String,
        index: u32,
        #[source]
        source: StorageError,
    },

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Chunk {index} missing for session {key}")]
    ChunkMissingOnDownload { key: String, index: u32 },

    #[error("Missing chunks: {missing:?}")]
    IncompleteUpload { missing: Vec<u32> },

    #[error("Cannot move session {key} from {from} to {to}")]
    InvalidTransition {
        key: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Metadata store error: {0}")]
    Metadata(#[source] StorageError),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::EmptyBody | Self::InvalidChunkIndex(_) => StatusCode::BAD_REQUEST,
            Self::RejectedRequest { status, .. } => *status,
            Self::SessionNotFound(_) | Self::ChunkMissingOnDownload { .. } => StatusCode::NOT_FOUND,
            Self::SessionClosed(_) | Self::IncompleteUpload { .. } | Self::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            Self::AllocationFailure(_)
            | Self::ChunkWriteFailure { .. }
            | Self::Metadata(_)
            | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
