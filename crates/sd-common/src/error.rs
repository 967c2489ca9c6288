//! Error types for System Doctor.
//!
//! The library distinguishes three error classes:
//! - Soft step failures (allowlist rejection, individual command failure
//!   during Collect) are encoded as failed step outputs, never as `Err`.
//! - Gate denials abort a fix plan and surface as [`Error::GateDenied`].
//! - Parser tolerance means malformed tool output yields empty or
//!   partial results, never an error.
//!
//! Errors serialize to structured JSON for machine consumers:
//! ```json
//! {
//!   "category": "gate",
//!   "message": "gate denied step fix_0_s1: high-impact risk requires confirmation",
//!   "recoverable": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for System Doctor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration errors (allowlist, timeouts).
    Config,
    /// Evidence collection errors.
    Collection,
    /// Confirmation gate denials.
    Gate,
    /// Fix execution errors.
    Execution,
    /// Session management errors.
    Session,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Collection => write!(f, "collection"),
            ErrorCategory::Gate => write!(f, "gate"),
            ErrorCategory::Execution => write!(f, "execution"),
            ErrorCategory::Session => write!(f, "session"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for System Doctor.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid allowlist pattern '{pattern}': {reason}")]
    InvalidAllowlistPattern { pattern: String, reason: String },

    // Collection errors
    #[error("evidence collection failed: {0}")]
    Collection(String),

    // Gate errors
    #[error("gate denied step {step_id}: {risk} risk requires confirmation")]
    GateDenied { step_id: String, risk: String },

    // Execution errors
    #[error("fix execution failed: {0}")]
    ExecutionFailed(String),

    #[error("executor failure for '{command}': {reason}")]
    Executor { command: String, reason: String },

    // Session errors
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify the error for machine consumers.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidAllowlistPattern { .. } => ErrorCategory::Config,
            Error::Collection(_) => ErrorCategory::Collection,
            Error::GateDenied { .. } => ErrorCategory::Gate,
            Error::ExecutionFailed(_) | Error::Executor { .. } => ErrorCategory::Execution,
            Error::InvalidSessionId(_) => ErrorCategory::Session,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the caller can re-drive the pipeline after this error.
    ///
    /// Gate denials are recoverable: the caller re-prompts for
    /// confirmation and retries the plan.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Error::GateDenied { .. } | Error::Executor { .. } | Error::Collection(_)
        )
    }

    /// Structured JSON rendering for agent-facing output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "category": self.category().to_string(),
            "message": self.to_string(),
            "recoverable": self.recoverable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_denied_category_and_message() {
        let err = Error::GateDenied {
            step_id: "fix_0_s1".to_string(),
            risk: "high-impact".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Gate);
        assert!(err.recoverable());
        let msg = err.to_string();
        assert!(msg.contains("fix_0_s1"));
        assert!(msg.contains("high-impact"));
    }

    #[test]
    fn test_config_error_not_recoverable() {
        let err = Error::Config("bad timeout".to_string());
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.recoverable());
    }

    #[test]
    fn test_error_json_shape() {
        let err = Error::Collection("ps missing".to_string());
        let json = err.to_json();
        assert_eq!(json["category"], "collection");
        assert_eq!(json["recoverable"], true);
        assert!(json["message"].as_str().unwrap().contains("ps missing"));
    }
}
