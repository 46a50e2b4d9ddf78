//! Error types for spikeguard.
//!
//! Errors carry:
//! - Stable error codes for machine parsing
//! - Category classification for grouping
//! - Recoverability hints
//!
//! None of these errors is fatal to a running monitor. The sampler and
//! response loops absorb them into counters and log records; only startup
//! (config, permissions) turns them into an exit code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ProcessId;
use crate::spike::SpikeKind;

/// Result type alias for spikeguard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Signature store errors.
    Store,
    /// Sample acquisition errors.
    Collection,
    /// Action sink errors.
    Action,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Collection => write!(f, "collection"),
            ErrorCategory::Action => write!(f, "action"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for spikeguard.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Store errors (20-29)
    #[error("signature store full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("no signature for process {pid}")]
    StaleLookup { pid: ProcessId },

    // Collection errors (30-39)
    #[error("samples provider failed: {0}")]
    Provider(String),

    #[error("samples provider timed out after {millis}ms")]
    ProviderTimeout { millis: u64 },

    // Action errors (40-49)
    #[error("{kind} action for process {pid} withheld: cooldown not elapsed")]
    ActionCooldown { pid: ProcessId, kind: SpikeKind },

    #[error("action on process {pid} failed: {reason}")]
    ActionFailed { pid: ProcessId, reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Store errors
    /// - 30-39: Collection errors
    /// - 40-49: Action errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::CapacityExceeded { .. } => 20,
            Error::StaleLookup { .. } => 21,
            Error::Provider(_) => 30,
            Error::ProviderTimeout { .. } => 31,
            Error::ActionCooldown { .. } => 40,
            Error::ActionFailed { .. } => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::CapacityExceeded { .. } | Error::StaleLookup { .. } => ErrorCategory::Store,
            Error::Provider(_) | Error::ProviderTimeout { .. } => ErrorCategory::Collection,
            Error::ActionCooldown { .. } | Error::ActionFailed { .. } => ErrorCategory::Action,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error may clear up on a later tick.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => false,
            // Retried naturally while the provider keeps reporting the pid.
            Error::CapacityExceeded { .. } => true,
            Error::StaleLookup { .. } => true,
            Error::Provider(_) => true,
            Error::ProviderTimeout { .. } => true,
            Error::ActionCooldown { .. } => true,
            Error::ActionFailed { .. } => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Whether the error is informational rather than a failure.
    ///
    /// Withheld actions and lookups of already-exited processes are expected
    /// in normal operation.
    pub fn is_informational(&self) -> bool {
        matches!(self, Error::ActionCooldown { .. } | Error::StaleLookup { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        let cases: Vec<(Error, ErrorCategory)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config),
            (Error::CapacityExceeded { capacity: 4 }, ErrorCategory::Store),
            (Error::ProviderTimeout { millis: 250 }, ErrorCategory::Collection),
            (
                Error::ActionFailed {
                    pid: ProcessId(1),
                    reason: "permission denied".into(),
                },
                ErrorCategory::Action,
            ),
        ];
        for (err, category) in cases {
            assert_eq!(err.category(), category, "{err}");
            let code = err.code();
            let expected_base = match category {
                ErrorCategory::Config => 10,
                ErrorCategory::Store => 20,
                ErrorCategory::Collection => 30,
                ErrorCategory::Action => 40,
                ErrorCategory::Io => 60,
            };
            assert!(code >= expected_base && code < expected_base + 10);
        }
    }

    #[test]
    fn cooldown_is_informational() {
        let err = Error::ActionCooldown {
            pid: ProcessId(9),
            kind: SpikeKind::Cpu,
        };
        assert!(err.is_informational());
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "cpu action for process 9 withheld: cooldown not elapsed"
        );
    }

    #[test]
    fn capacity_message() {
        let err = Error::CapacityExceeded { capacity: 4096 };
        assert_eq!(err.to_string(), "signature store full (capacity 4096)");
        assert!(!err.is_informational());
    }

    #[test]
    fn category_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCategory::Collection).unwrap(),
            "\"collection\""
        );
    }
}
