//! Error handling for the reconx engine
//!
//! Only validation and setup errors cross the module boundary; per-candidate
//! misses are absorbed into partial results and cancellation is a terminal
//! status, not an error.

use thiserror::Error;

/// Main error type for recon operations
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Setup failed: {0}")]
    SetupError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ReconError {
    /// True for errors surfaced synchronously from `validate`/`start_scan`,
    /// before any execution resources are committed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReconError::InvalidInput(_)
                | ReconError::InvalidTarget(_)
                | ReconError::InvalidOption { .. }
        )
    }
}

/// Result type alias for recon operations
pub type ReconResult<T> = Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(ReconError::InvalidTarget("x".into()).is_validation());
        assert!(ReconError::InvalidOption {
            name: "threads".into(),
            reason: "expected int".into()
        }
        .is_validation());
        assert!(!ReconError::SetupError("wordlist missing".into()).is_validation());
    }
}
