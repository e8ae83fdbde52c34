//! # Error Handling
//!
//! Error types shared by every Cairn component.
//!
//! ## Taxonomy
//!
//! 1. **Lookup**: `NotFound` for manifests, `ContentNotFound` for store records
//! 2. **Validation**: `InvalidLabels`, `InvalidPrefix`, `Marshal`
//! 3. **Corruption**: `Integrity` (checksum/framing) and `MalformedBlock` (decode)
//! 4. **System**: store, I/O and configuration failures

use thiserror::Error;

/// Result type alias for Cairn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for Cairn
#[derive(Error, Debug)]
pub enum Error {
    // Manifest Errors
    #[error("manifest not found: {id}")]
    NotFound { id: String },

    #[error("invalid labels: {reason}")]
    InvalidLabels { reason: String },

    #[error("marshal error: {message}")]
    Marshal { message: String },

    // Corruption Errors
    #[error("integrity error: {details}")]
    Integrity { details: String },

    #[error("malformed manifest block {content_id}: {message}")]
    MalformedBlock { content_id: String, message: String },

    // Content Store Errors
    #[error("content not found: {id}")]
    ContentNotFound { id: String },

    #[error("invalid content prefix {prefix:?}")]
    InvalidPrefix { prefix: String },

    #[error("content store error: {message}")]
    Store { message: String },

    // System Errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Shorthand for a missing manifest
    pub fn not_found(id: impl ToString) -> Self {
        Error::NotFound { id: id.to_string() }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io { .. } => true,
            Error::Store { .. } => true,
            Error::Integrity { .. } => false,
            Error::MalformedBlock { .. } => false,
            Error::Internal { .. } => false,
            _ => true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for stored data that failed checksum or decoding
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity { .. } | Error::MalformedBlock { .. })
    }

    /// Copy of a corruption error, for replaying a memoized load failure.
    ///
    /// Only corruption errors are replayable; transient failures return `None`.
    pub fn replay(&self) -> Option<Error> {
        match self {
            Error::Integrity { details } => Some(Error::Integrity {
                details: details.clone(),
            }),
            Error::MalformedBlock { content_id, message } => Some(Error::MalformedBlock {
                content_id: content_id.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidLabels { .. } => "INVALID_LABELS",
            Error::Marshal { .. } => "MARSHAL_ERROR",
            Error::Integrity { .. } => "INTEGRITY_ERROR",
            Error::MalformedBlock { .. } => "MALFORMED_BLOCK",
            Error::ContentNotFound { .. } => "CONTENT_NOT_FOUND",
            Error::InvalidPrefix { .. } => "INVALID_PREFIX",
            Error::Store { .. } => "STORE_ERROR",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
