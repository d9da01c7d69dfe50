//! Error types and handling for holecache-core operations.
//!
//! Absence is never an error in this crate: a missing document, a missing index file or
//! a missing session file all load as empty values. The variants below cover the failures
//! that remain once absence has been ruled out.
//!
//! ## Error Categories
//!
//! - **I/O Errors**: File system operations, disk access
//! - **Network Errors**: HTTP requests issued by the remote source
//! - **Storage Errors**: Retained store writes and path resolution
//! - **Index Errors**: Range index decoding (bad magic, truncation) and encoding limits
//! - **Configuration Errors**: Invalid settings or config files
//! - **Remote Errors**: Non-success answers from the forum API
//!
//! ```rust
//! use holecache_core::Error;
//!
//! let err = Error::Timeout("page request".to_string());
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "timeout");
//! ```

use thiserror::Error;

/// The main error type for holecache-core operations.
///
/// Errors keep their source chain, so `Debug` output includes the underlying
/// `std::io::Error` or `reqwest::Error` where one exists.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Connection and timeout errors are typically recoverable, while
    /// malformed requests are permanent.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Retained store operation failed.
    ///
    /// ## Common Causes
    ///
    /// - Disk space exhaustion while committing a document
    /// - Parent directory cannot be created
    /// - Invalid user namespace
    #[error("Storage error: {0}")]
    Storage(String),

    /// Range index could not be decoded or encoded.
    ///
    /// A bad magic value or a truncated file lands here. This is deliberately
    /// distinct from a missing index file, which loads as an empty index.
    #[error("Index error: {0}")]
    Index(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource was not found on the remote side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL is malformed or invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The remote API answered with a non-success status.
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// HTTP status code returned by the server.
        status: u16,
        /// Body or reason phrase returned with the status.
        message: String,
    },

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("Background task failed: {err}"))
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Retries are the remote collaborator's business; the pipeline itself never
    /// retries. This helper lets callers decide whether re-opening a stream is worthwhile.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier, for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Storage(_) => "storage",
            Self::Index(_) => "index",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Remote { .. } => "remote",
            Self::Timeout(_) => "timeout",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
