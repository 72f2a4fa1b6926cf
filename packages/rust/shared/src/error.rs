//! Error types for docenrich.
//!
//! Library crates use [`EnrichError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, broken body).
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with an unexpected status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// JSON or NDJSON decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Scoring endpoint failure or contract violation.
    #[error("scoring error: {0}")]
    Scoring(String),

    /// Batch storage API failure.
    #[error("batch API error: {0}")]
    BatchApi(String),

    /// Gzip encode/decode error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (offsets out of range, missing artifact, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Inbound request authentication failure.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Work queue is full or closed.
    #[error("queue error: {0}")]
    Queue(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
