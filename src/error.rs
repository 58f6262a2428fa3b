//! Error types for the storage client and the uploader.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by a [`BlobClient`](crate::client::BlobClient).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The service answered with a non-success status.
    #[error("{code} ({status}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The configured account key is not valid base64.
    #[error("invalid account key: {0}")]
    InvalidAccountKey(String),

    /// A blob or endpoint URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A server-side copy finished in a state other than `success`.
    #[error("copy {copy_id} ended with status {status}: {description}")]
    CopyFailed {
        copy_id: String,
        status: String,
        description: String,
    },

    /// A header name or value cannot be sent over HTTP.
    #[error("invalid header {name}: {value:?}")]
    InvalidHeader { name: String, value: String },

    /// A response was missing a header the operation depends on.
    #[error("response is missing header {0}")]
    MissingHeader(&'static str),
}

impl StorageError {
    /// Creates a service error with the given status, code, and message.
    pub fn service(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Service {
            status,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Returns the HTTP status for service errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Service { status, .. } => Some(*status),
            StorageError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether another attempt of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Service { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            StorageError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by an upload invocation.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The requested combination of blob type, size, and source is not valid.
    #[error("invalid upload request: {0}")]
    Validation(String),

    #[error("unsupported blob type {0:?}")]
    UnsupportedBlobType(String),

    #[error("error opening source file {path:?}: {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not stat file {path:?}: {source}")]
    StatSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading a page while scanning for non-zero content failed.
    #[error("could not read chunk at {offset}: {source}")]
    ScanRead {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Reading a range for upload failed.
    #[error("error reading source file {path:?} at offset {offset}: {source}")]
    RangeRead {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Writing a range to the page blob failed.
    #[error("error writing page at offset {offset} for file {path:?}: {source}")]
    RangeWrite {
        path: PathBuf,
        offset: u64,
        #[source]
        source: StorageError,
    },

    /// A remote call outside the per-range pipeline failed.
    #[error("error during {operation} for blob {blob}: {source}")]
    Storage {
        operation: &'static str,
        blob: String,
        #[source]
        source: StorageError,
    },

    /// A worker task panicked or was cancelled by the runtime.
    #[error("upload worker terminated abnormally: {0}")]
    Worker(String),
}

impl UploadError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        UploadError::Validation(message.into())
    }

    /// Byte offset the error is tagged with, if any.
    pub fn offset(&self) -> Option<u64> {
        match self {
            UploadError::ScanRead { offset, .. }
            | UploadError::RangeRead { offset, .. }
            | UploadError::RangeWrite { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// Result type alias for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
