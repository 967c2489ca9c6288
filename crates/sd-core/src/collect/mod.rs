//! Evidence collection: steps, raw outputs, and the evidence bundle.
//!
//! A diagnostic plan is a list of [`Step`]s. Running a step yields a
//! [`StepOutput`]; the per-step records of one Collect pass are combined
//! by [`parsers::build_evidence`] into an immutable [`EvidenceBundle`].
//! A fresh bundle is built per Collect call so before/after comparisons
//! during Verify are safe.

pub mod normalizer;
pub mod parsers;

use chrono::{DateTime, Utc};
use sd_common::{Risk, StepId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One command in a plan. Immutable once created; referenced by id in
/// the transcript and output maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Tool family the step belongs to (currently always "terminal").
    pub tool: String,
    pub command: String,
    pub risk: Risk,
    pub description: String,
}

impl Step {
    /// Shorthand for a terminal command step.
    pub fn terminal(
        id: impl Into<String>,
        command: impl Into<String>,
        risk: Risk,
        description: impl Into<String>,
    ) -> Self {
        Step {
            id: StepId::new(id),
            tool: "terminal".to_string(),
            command: command.into(),
            risk,
            description: description.into(),
        }
    }
}

/// Result of attempting one step. Allowlist rejections and executor
/// failures are recorded as synthetic outputs with `exit_code = -1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl StepOutput {
    /// Synthetic failed output for a step that never ran.
    pub fn rejected(reason: impl Into<String>) -> Self {
        StepOutput {
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: -1,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A step output plus collection bookkeeping, as stored in
/// [`EvidenceBundle::raw`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStepRecord {
    pub step_id: StepId,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl RawStepRecord {
    pub fn from_output(step_id: StepId, output: &StepOutput, duration_ms: u64) -> Self {
        RawStepRecord {
            step_id,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
            duration_ms,
        }
    }
}

/// Tag for a parsed point-in-time snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Proc,
    Cpu,
    Mem,
    Disk,
    Thermal,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SnapshotKind::Proc => "proc",
            SnapshotKind::Cpu => "cpu",
            SnapshotKind::Mem => "mem",
            SnapshotKind::Disk => "disk",
            SnapshotKind::Thermal => "thermal",
        };
        write!(f, "{}", s)
    }
}

/// A parsed point-in-time snapshot from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: DateTime<Utc>,
    pub kind: SnapshotKind,
    pub data: serde_json::Value,
}

/// Immutable snapshot of parsed system metrics from one Collect pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub collected_at: DateTime<Utc>,
    /// Raw per-step outputs keyed by step id.
    pub raw: BTreeMap<StepId, RawStepRecord>,
    /// Derived scalar metrics (snake_case keys).
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// One snapshot per parsed source.
    pub snapshots: Vec<Snapshot>,
}

impl EvidenceBundle {
    /// Numeric metric lookup; absent or non-numeric keys yield None.
    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|v| v.as_f64())
    }

    /// String metric lookup.
    pub fn metric_str(&self, key: &str) -> Option<&str> {
        self.metrics.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_terminal_shorthand() {
        let step = Step::terminal("uptime", "uptime", Risk::Read, "Load average");
        assert_eq!(step.id.as_str(), "uptime");
        assert_eq!(step.tool, "terminal");
        assert_eq!(step.risk, Risk::Read);
    }

    #[test]
    fn test_rejected_output_shape() {
        let out = StepOutput::rejected("command not in allowlist");
        assert_eq!(out.exit_code, -1);
        assert!(!out.success());
        assert!(out.stderr.contains("allowlist"));
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn test_metric_lookup() {
        let mut metrics = BTreeMap::new();
        metrics.insert("load1".to_string(), serde_json::json!(2.5));
        metrics.insert("temp_severity".to_string(), serde_json::json!("warn"));
        let bundle = EvidenceBundle {
            collected_at: Utc::now(),
            raw: BTreeMap::new(),
            metrics,
            snapshots: Vec::new(),
        };
        assert_eq!(bundle.metric_f64("load1"), Some(2.5));
        assert_eq!(bundle.metric_str("temp_severity"), Some("warn"));
        assert_eq!(bundle.metric_f64("missing"), None);
        assert_eq!(bundle.metric_f64("temp_severity"), None);
    }
}
