//! Core error types for buildlens.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Invalid target label
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel {
        /// Offending label text
        label: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid target pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern text
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid timestamp
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Parse failure detail
        reason: String,
    },

    /// Invalid duration
    #[error("Invalid duration: {reason}")]
    InvalidDuration {
        /// Parse failure detail
        reason: String,
    },

    /// Unknown detail level
    #[error("Unknown detail level '{0}', expected one of: none, failed, all")]
    InvalidDetailLevel(String),
}
