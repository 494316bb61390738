//! Error types for Netreplay

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Netreplay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Errors that can occur while recording or replaying traffic
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Request URL could not be parsed or addressed
    #[error("Invalid request URL: {0}")]
    InvalidRequestUrl(String),

    /// No session has been started
    #[error("Session is not configured")]
    SessionNotConfigured,

    /// Session name cannot be used as a directory name
    #[error("Invalid session name: {0}")]
    InvalidSessionName(String),

    /// Replay was requested but no fixture exists and recording is disabled
    #[error("No fixture found for request {request}, expected file: {}", expected_path.display())]
    FixtureNotFound {
        /// `METHOD URL` of the intercepted request
        request: String,
        /// Exact path the engine looked for
        expected_path: PathBuf,
    },

    /// Fixture file exists but cannot be decoded
    #[error("Fixture corrupted at {}: {reason}", path.display())]
    FixtureCorrupt {
        /// Fixture file path
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Session directory could not be created
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreateFailed {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Session directory could not be removed
    #[error("Failed to remove directory {}: {source}", path.display())]
    DirectoryRemoveFailed {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// The live network call failed
    #[error("Live request to {url} failed: {cause}")]
    LiveRequestFailed {
        /// Target URL
        url: String,
        /// Transport error message
        cause: String,
    },

    /// Fixture could not be serialized
    #[error("Failed to encode fixture: {cause}")]
    EncodingFailed {
        /// Serializer error message
        cause: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Live transport could not be constructed
    #[error("Transport setup failed: {0}")]
    TransportSetup(String),
}

impl ReplayError {
    /// Whether the error means the test needs (re-)recording
    #[must_use]
    pub fn is_missing_fixture(&self) -> bool {
        matches!(self, Self::FixtureNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_not_found_names_path() {
        let err = ReplayError::FixtureNotFound {
            request: "GET https://api.test/items/1".to_string(),
            expected_path: PathBuf::from("/tmp/__fixtures__/t/GET_api.test_00.json"),
        };

        let message = err.to_string();
        assert!(message.contains("GET https://api.test/items/1"));
        assert!(message.contains("/tmp/__fixtures__/t/GET_api.test_00.json"));
        assert!(err.is_missing_fixture());
    }

    #[test]
    fn test_io_conversion() {
        let err: ReplayError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ReplayError::Io(_)));
        assert!(!err.is_missing_fixture());
    }
}
