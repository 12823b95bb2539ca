//! Error types for the head tracking library.

use std::panic::Location;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected by validation, previous configuration is kept
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation called in a state where it is not allowed (API misuse)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Face tracker driven from a thread other than its producer thread
    #[error("Face tracker accessed from the wrong thread at {location}")]
    WrongThread {
        /// Call site of the offending call
        location: &'static Location<'static>,
    },

    /// Polling API used on a frame adapter created without polling
    #[error("Polling is not enabled for this frame adapter (called at {location})")]
    PollingDisabled {
        /// Call site of the offending call
        location: &'static Location<'static>,
    },

    /// Camera creation or capture failed
    #[error("Camera error: {0}")]
    Camera(String),

    /// Face detector creation or inference failed
    #[error("Face detector error: {0}")]
    FaceDetector(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic I/O error with description
    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    /// Whether the error is a programming error (wrong thread, API misuse)
    /// rather than a data or backend condition.
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::WrongThread { .. } | Self::PollingDisabled { .. } | Self::InvalidState(_)
        )
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_in_message() {
        let err = Error::PollingDisabled { location: Location::caller() };
        let message = err.to_string();
        assert!(message.contains("error.rs"), "{message}");
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_backend_errors_are_not_programming_errors() {
        assert!(!Error::FaceDetector("model".into()).is_programming_error());
        assert!(!Error::InvalidConfiguration("eyes".into()).is_programming_error());
    }
}
