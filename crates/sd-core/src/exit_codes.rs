//! Exit codes for the sd CLI.
//!
//! Exit codes communicate operation outcome without requiring output
//! parsing. They are a stable contract for automation.
//!
//! Ranges:
//! - 0-6: operational outcomes
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors

use sd_common::{Error, ErrorCategory};

/// Exit codes for sd operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: diagnosis completed, nothing alarming or fix verified.
    Clean = 0,

    /// Diagnosis produced fix options but none were executed.
    FixesProposed = 1,

    /// A fix executed but verification did not fully pass.
    FixUnverified = 2,

    /// Execution blocked by the confirmation gate.
    GateDenied = 4,

    /// Invalid arguments.
    ArgsError = 10,

    /// Configuration could not be loaded or validated.
    ConfigError = 11,

    /// Evidence collection failed outright.
    CollectionError = 12,

    /// Internal error.
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a library error to its exit code.
    pub fn from_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Gate => ExitCode::GateDenied,
            ErrorCategory::Collection => ExitCode::CollectionError,
            ErrorCategory::Execution => ExitCode::InternalError,
            ErrorCategory::Session => ExitCode::ArgsError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}
