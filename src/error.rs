//! Error types for media-dl
//!
//! Every pipeline stage has its own error enum ([`FetchError`],
//! [`DestinationError`]) and each variant maps onto one [`FailureKind`], the
//! taxonomy callers see in a [`TransferResult`](crate::types::TransferResult).
//! [`Error`] is the crate-level type for everything that happens outside a
//! running request (configuration, request validation, shutdown).

use std::path::PathBuf;
use thiserror::Error;

use crate::types::FailureKind;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_name_bytes")
        key: Option<String>,
    },

    /// The request URL is blank or not an absolute URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Output format other than mp3/mp4
    #[error("unsupported format: {0} (expected mp3 or mp4)")]
    UnsupportedFormat(String),

    /// Metadata resolution failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Destination resolution failed
    #[error("destination error: {0}")]
    Destination(#[from] DestinationError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new requests
    #[error("shutdown in progress: not accepting new requests")]
    ShuttingDown,
}

/// Errors raised by the metadata resolver
#[derive(Debug, Error)]
pub enum FetchError {
    /// No URL given
    #[error("empty URL")]
    EmptyUrl,

    /// The fetch tool could not be started (missing or not executable)
    #[error("failed to execute {program}: {message}")]
    ProcessSpawnFailed {
        /// Program that failed to start
        program: PathBuf,
        /// OS error text
        message: String,
    },

    /// The fetch tool exited nonzero (or timed out)
    #[error("fetch tool failed ({status}): {diagnostic}")]
    ToolReportedError {
        /// Exit status description (e.g. "exit status: 1")
        status: String,
        /// Verbatim error stream text
        diagnostic: String,
    },

    /// Output could not be parsed or lacks required fields
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// The URL expanded to more than one item
    #[error("URL resolved to {records} items, expected exactly one")]
    AmbiguousSource {
        /// Number of records the tool produced (0 when only the type gave it away)
        records: usize,
    },
}

impl FetchError {
    /// Failure kind surfaced to callers
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::EmptyUrl => FailureKind::ToolReportedError,
            FetchError::ProcessSpawnFailed { .. } => FailureKind::ProcessSpawnFailed,
            FetchError::ToolReportedError { .. } => FailureKind::ToolReportedError,
            FetchError::MalformedMetadata(_) => FailureKind::MalformedMetadata,
            FetchError::AmbiguousSource { .. } => FailureKind::AmbiguousSource,
        }
    }

    /// Diagnostic text for a failed result
    ///
    /// Tool diagnostics are passed through verbatim; everything else uses the
    /// error's display text.
    pub fn diagnostic(&self) -> String {
        match self {
            FetchError::ToolReportedError { diagnostic, .. } => diagnostic.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors raised by the destination resolver
#[derive(Debug, Error)]
pub enum DestinationError {
    /// Target directory missing, not a directory or not writable
    #[error("invalid target directory {path}: {reason}")]
    InvalidTargetDirectory {
        /// The directory that was rejected
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Output path already exists or is claimed by another in-flight request
    #[error("destination conflict at {path}: {reason}")]
    DestinationConflict {
        /// The contested path
        path: PathBuf,
        /// What it conflicts with
        reason: String,
    },

    /// Neither title nor id yield a usable file name
    #[error("no usable file name from title {title:?}")]
    UnnamedMedia {
        /// The unsanitized title
        title: String,
    },
}

impl DestinationError {
    /// Failure kind surfaced to callers
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DestinationError::InvalidTargetDirectory { .. } => FailureKind::InvalidTargetDirectory,
            DestinationError::DestinationConflict { .. } => FailureKind::DestinationConflict,
            DestinationError::UnnamedMedia { .. } => FailureKind::MalformedMetadata,
        }
    }
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::Fetch(e) => e.failure_kind().error_code(),
            Error::Destination(e) => e.failure_kind().error_code(),
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
        }
    }
}
