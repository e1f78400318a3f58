//! # Stream Error Types
//!
//! Error taxonomy shared by the decoder facade, the byte-stream adapter and
//! the demand-pull bridge.

use thiserror::Error;

/// Errors that can occur while turning a FLAC stream into PCM bytes.
#[derive(Error, Debug)]
pub enum StreamError {
    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// The decoder rejected the input source (malformed header, unsupported
    /// stream). Fatal for the instance that reported it.
    #[error("Failed to initialize decoder: {0}")]
    InitializationFailed(String),

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Operation attempted out of order (seek before metadata, decode on an
    /// unbound or disposed instance).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// No metadata found, or the operation needs data that does not exist.
    #[error("End of stream: {0}")]
    EndOfStream(String),

    /// Seek target or read size exceeds the available bounds.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Decoded samples use a layout this crate cannot pack into PCM bytes.
    #[error("Unsupported or invalid PCM format: {0}")]
    InvalidFormat(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error while opening the input source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Returns `true` if the caller can recover, e.g. by re-opening the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StreamError::EndOfStream(_) | StreamError::Io(_))
    }

    /// Returns `true` if the instance that produced this error is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::InitializationFailed(_) | StreamError::InvalidFormat(_)
        )
    }

    /// Returns `true` if this error reports a caller-side ordering mistake.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, StreamError::InvalidState(_) | StreamError::OutOfRange(_))
    }
}

impl From<StreamError> for std::io::Error {
    fn from(err: StreamError) -> Self {
        use std::io::ErrorKind;

        match err {
            StreamError::Io(e) => e,
            StreamError::EndOfStream(msg) => std::io::Error::new(ErrorKind::UnexpectedEof, msg),
            StreamError::OutOfRange(msg) => std::io::Error::new(ErrorKind::InvalidInput, msg),
            StreamError::InvalidFormat(msg) => std::io::Error::new(ErrorKind::InvalidData, msg),
            other => std::io::Error::new(ErrorKind::Other, other.to_string()),
        }
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(StreamError::EndOfStream("empty".into()).is_recoverable());
        assert!(!StreamError::EndOfStream("empty".into()).is_fatal());

        assert!(StreamError::InitializationFailed("bad marker".into()).is_fatal());
        assert!(!StreamError::InitializationFailed("bad marker".into()).is_recoverable());

        assert!(StreamError::InvalidState("seek before metadata".into()).is_usage_error());
        assert!(StreamError::OutOfRange("position overflow".into()).is_usage_error());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: std::io::Error = StreamError::EndOfStream("no data".into()).into();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        let err: std::io::Error = StreamError::OutOfRange("count".into()).into();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
