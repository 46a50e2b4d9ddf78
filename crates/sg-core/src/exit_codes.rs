//! Exit codes for the `spikeguard` binary.
//!
//! Exit code ranges:
//! - 0-1: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use sg_common::{Error, ErrorCategory};
use sg_config::ValidationError;

/// Process exit codes. Stable for scripts and service managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-1)
    // ========================================================================
    /// Clean shutdown
    Clean = 0,

    /// Ran to completion but some actions failed
    PartialFail = 1,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Configuration missing, malformed or invalid
    ConfigError = 11,

    /// Permission denied
    PermissionError = 12,

    /// Samples provider unavailable (e.g. no procfs)
    ProviderError = 13,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// User/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PartialFail => "ERR_PARTIAL",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::ProviderError => "ERR_PROVIDER",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Collection => ExitCode::ProviderError,
            ErrorCategory::Io => match err {
                Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                    ExitCode::PermissionError
                }
                _ => ExitCode::IoError,
            },
            ErrorCategory::Store | ErrorCategory::Action => ExitCode::InternalError,
        }
    }
}

impl From<&ValidationError> for ExitCode {
    fn from(_: &ValidationError) -> Self {
        ExitCode::ConfigError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(!ExitCode::InternalError.is_user_error());
        assert_eq!(ExitCode::IoError.to_string(), "ERR_IO (21)");
    }

    #[test]
    fn errors_map_by_category() {
        assert_eq!(
            ExitCode::from(&Error::Config("bad".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::from(&Error::ProviderTimeout { millis: 5 }),
            ExitCode::ProviderError
        );
        let denied = Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(ExitCode::from(&denied), ExitCode::PermissionError);
    }
}
