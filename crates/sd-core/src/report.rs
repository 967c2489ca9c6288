//! Outcome synthesis.
//!
//! Report folds the diagnosis and verification into the session's
//! terminal artifact. Status keys off the check pass ratio: all checks
//! pass → resolved; some pass → improved; none pass → failed. Any
//! not-fully-ok verification halves the diagnosis confidence. A
//! verification with no checks claims nothing and reports unchanged.

use crate::diagnose::DiagnosisBundle;
use crate::verify::VerificationResult;
use sd_common::Risk;
use serde::{Deserialize, Serialize};

/// Terminal status of a diagnostic session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Resolved,
    Improved,
    Unchanged,
    Failed,
}

/// An executed fix action, as listed in the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTaken {
    pub label: String,
    pub risk: Risk,
}

/// Terminal artifact of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub root_cause: String,
    pub actions_taken: Vec<ActionTaken>,
    pub results: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub confidence: f64,
}

/// Confidence multiplier when verification is not fully ok.
const DEGRADED_CONFIDENCE_FACTOR: f64 = 0.5;

/// Synthesize the outcome from diagnosis, verification, and the
/// actions that ran.
pub fn report(
    diagnosis: &DiagnosisBundle,
    verification: &VerificationResult,
    actions_taken: &[ActionTaken],
) -> Outcome {
    let passed = verification.checks.iter().filter(|c| c.ok).count();
    let total = verification.checks.len();
    let mut confidence = diagnosis.primary.score;

    let status = if total == 0 {
        OutcomeStatus::Unchanged
    } else if passed == total {
        OutcomeStatus::Resolved
    } else {
        confidence *= DEGRADED_CONFIDENCE_FACTOR;
        if passed == 0 {
            OutcomeStatus::Failed
        } else {
            OutcomeStatus::Improved
        }
    };

    Outcome {
        status,
        root_cause: diagnosis.primary.label.clone(),
        actions_taken: actions_taken.to_vec(),
        results: verification
            .checks
            .iter()
            .map(|c| format!("{}: {}", c.label, if c.ok { "OK" } else { "Failed" }))
            .collect(),
        prevention_tips: prevention_tips(&diagnosis.primary.cause_id),
        confidence,
    }
}

/// Fixed prevention tips looked up by cause-id keyword.
pub fn prevention_tips(cause_id: &str) -> Vec<String> {
    let mut tips = Vec::new();

    if cause_id.contains("disk") || cause_id.contains("log") || cause_id.contains("temp") {
        tips.push("Monitor disk usage weekly".to_string());
        tips.push("Set up automated cleanup for temporary files".to_string());
    }
    if cause_id.contains("memory") || cause_id.contains("swap") {
        tips.push("Monitor memory usage with alerts".to_string());
        tips.push("Consider adding RAM if consistently high".to_string());
    }
    if cause_id.contains("thermal") || cause_id.contains("fan") {
        tips.push("Clean dust from vents regularly".to_string());
        tips.push("Ensure proper ventilation".to_string());
    }

    tips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::EvidenceBundle;
    use crate::diagnose::ScoredDiagnosis;
    use crate::verify::CheckOutcome;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn empty_evidence() -> EvidenceBundle {
        EvidenceBundle {
            collected_at: Utc::now(),
            raw: BTreeMap::new(),
            metrics: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    fn diagnosis(cause_id: &str, score: f64) -> DiagnosisBundle {
        DiagnosisBundle {
            primary: ScoredDiagnosis {
                cause_id: cause_id.to_string(),
                label: "Primary cause".to_string(),
                score,
                supporting_findings: Vec::new(),
                disconfirming_findings: Vec::new(),
            },
            differential: Vec::new(),
            notes: String::new(),
        }
    }

    fn verification(outcomes: &[(&str, bool)]) -> VerificationResult {
        VerificationResult {
            ok: outcomes.iter().all(|(_, ok)| *ok),
            checks: outcomes
                .iter()
                .map(|(label, ok)| CheckOutcome {
                    label: label.to_string(),
                    ok: *ok,
                })
                .collect(),
            before: empty_evidence(),
            after: empty_evidence(),
        }
    }

    #[test]
    fn test_all_checks_pass_resolves() {
        let outcome = report(
            &diagnosis("log_bloat", 0.9),
            &verification(&[("disk freed", true), ("under threshold", true)]),
            &[],
        );
        assert_eq!(outcome.status, OutcomeStatus::Resolved);
        assert_eq!(outcome.confidence, 0.9);
    }

    #[test]
    fn test_partial_pass_improves_and_halves_confidence() {
        let outcome = report(
            &diagnosis("log_bloat", 0.8),
            &verification(&[("disk freed", true), ("under threshold", false)]),
            &[],
        );
        assert_eq!(outcome.status, OutcomeStatus::Improved);
        assert_eq!(outcome.confidence, 0.4);
        assert_eq!(
            outcome.results,
            vec!["disk freed: OK", "under threshold: Failed"]
        );
    }

    #[test]
    fn test_all_checks_fail_fails() {
        let outcome = report(
            &diagnosis("memory_leak", 1.0),
            &verification(&[("freed", false), ("below", false)]),
            &[],
        );
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.confidence, 0.5);
    }

    #[test]
    fn test_no_checks_reports_unchanged() {
        let outcome = report(&diagnosis("unknown", 0.6), &verification(&[]), &[]);
        assert_eq!(outcome.status, OutcomeStatus::Unchanged);
        assert_eq!(outcome.confidence, 0.6);
    }

    #[test]
    fn test_prevention_tips_by_cause_keyword() {
        assert!(!prevention_tips("disk_full").is_empty());
        assert!(!prevention_tips("log_bloat").is_empty());
        assert!(prevention_tips("memory_leak")
            .iter()
            .any(|t| t.contains("RAM")));
        assert!(prevention_tips("thermal_hardware")
            .iter()
            .any(|t| t.contains("dust")));
        assert!(prevention_tips("something_else").is_empty());
    }

    #[test]
    fn test_actions_carried_into_outcome() {
        let actions = vec![ActionTaken {
            label: "Vacuum journal logs".to_string(),
            risk: Risk::SafeWrite,
        }];
        let outcome = report(
            &diagnosis("log_bloat", 0.9),
            &verification(&[("disk freed", true)]),
            &actions,
        );
        assert_eq!(outcome.actions_taken.len(), 1);
        assert_eq!(outcome.actions_taken[0].label, "Vacuum journal logs");
    }
}
