//! Risk tiers and finding severities.
//!
//! The risk tier of a command governs its execution timeout and the
//! confirmation the gate demands before it may run. The ordering is
//! load-bearing: fix options are offered least-invasive first, and
//! timeout selection keys off the same comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk tier assigned to a command or fix option.
///
/// Ordering: `Read < SafeWrite < HighImpact`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Risk {
    /// Read-only inspection. Never mutates system state.
    Read,
    /// Reversible mutation (service restart, cache prune, renice).
    SafeWrite,
    /// Destructive or irreversible (recursive deletion, kill, shutdown).
    HighImpact,
}

impl Risk {
    /// True if executing a step at this tier requires caller confirmation.
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, Risk::Read)
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Read => write!(f, "read"),
            Risk::SafeWrite => write!(f, "safe-write"),
            Risk::HighImpact => write!(f, "high-impact"),
        }
    }
}

/// Severity ordinal for findings.
///
/// Ordering: `Critical < Warn < Info`, so that sorting ascending puts
/// the most severe findings first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warn,
    Info,
}

impl Severity {
    /// Weight used by the diagnosis scorer for a supporting finding.
    pub fn support_weight(&self) -> f64 {
        match self {
            Severity::Critical => 1.5,
            Severity::Warn => 1.0,
            Severity::Info => 0.5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warn => write!(f, "warn"),
            Severity::Info => write!(f, "info"),
        }
    }
}
