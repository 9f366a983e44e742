//! Error taxonomy for the orchestration core
//!
//! Not-found, conflict, and invalid-state errors are rejected to the
//! caller without mutating state. Timeout and backend errors are terminal
//! to the current team execution and propagate to a failed run. Parse
//! errors are swallowed at the status-stream boundary.

use thiserror::Error;

/// Errors surfaced by the orchestration core
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown project, team, or execution
    #[error("not found: {0}")]
    NotFound(String),

    /// A run was requested while one is already active
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation not valid for the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Poll ceiling exceeded while waiting for a team to finish
    #[error("timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    /// Transport failure or backend-reported failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Malformed status-stream event (non-fatal, logged and skipped)
    #[error("malformed event: {0}")]
    Parse(String),

    /// Persistence failure in the execution store
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Process exit code for the CLI, one per error class
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::Conflict(_) => 3,
            Error::InvalidState(_) => 4,
            Error::Timeout { .. } => 5,
            Error::Backend(_) => 6,
            Error::Parse(_) | Error::Store(_) => 1,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        let errors = [
            Error::NotFound("x".into()),
            Error::Conflict("x".into()),
            Error::InvalidState("x".into()),
            Error::Timeout { attempts: 120 },
            Error::Backend("x".into()),
        ];

        let codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(codes, deduped);
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_timeout_display_includes_attempts() {
        let err = Error::Timeout { attempts: 120 };
        assert!(err.to_string().contains("120"));
    }
}
