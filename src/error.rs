// src/error.rs

use thiserror::Error;

/// Core error types for mypkg
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O failure with the offending path in the message
    #[error("I/O error: {0}")]
    IoError(String),

    /// Content hash does not match the expected value
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Archive entry would land outside the extraction directory
    #[error("Illegal file path in archive: {0}")]
    PathTraversal(String),

    /// Archive or compression format unknown or without a codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Package name, version or release cannot form a canonical name
    #[error("Invalid package identity: {0}")]
    InvalidIdentity(String),

    /// A setup/build/install shell step exited unsuccessfully
    #[error("Build step '{step}' failed: {status}")]
    BuildStepFailed { step: String, status: String },

    /// Source download failure
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Malformed manifest, description or archive metadata
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Missing package, archive or source
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Destination already exists or the request matches more than one package
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Lifecycle stages requested out of order
    #[error("Invalid stage transition: {0}")]
    InvalidTransition(String),
}

/// Failure classes, in the order they abort an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source hash mismatch, unidentifiable archive, path traversal
    Integrity,
    /// Filesystem and network failures
    Io,
    /// External shell step returned non-zero
    BuildStep,
    /// Bad input: config, description, identity, lookups
    Usage,
    /// A bug in mypkg itself
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ChecksumMismatch { .. } | Error::PathTraversal(_) | Error::UnsupportedFormat(_) => {
                ErrorKind::Integrity
            }
            Error::Io(_) | Error::IoError(_) | Error::DownloadError(_) => ErrorKind::Io,
            Error::BuildStepFailed { .. } => ErrorKind::BuildStep,
            Error::InvalidIdentity(_)
            | Error::ParseError(_)
            | Error::ConfigError(_)
            | Error::NotFoundError(_)
            | Error::ConflictError(_) => ErrorKind::Usage,
            Error::InvalidTransition(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias using mypkg's Error type
pub type Result<T> = std::result::Result<T, Error>;
