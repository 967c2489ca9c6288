//! Before/after verification checks.
//!
//! A check is a labeled predicate over the before and after evidence
//! bundles. Overall verification is the logical AND of all checks.

use crate::collect::EvidenceBundle;
use serde::{Deserialize, Serialize};

/// A labeled predicate over before/after evidence.
pub struct Check {
    pub label: String,
    pub validate: Box<dyn Fn(&EvidenceBundle, &EvidenceBundle) -> bool>,
}

impl Check {
    pub fn new(
        label: impl Into<String>,
        validate: impl Fn(&EvidenceBundle, &EvidenceBundle) -> bool + 'static,
    ) -> Self {
        Check {
            label: label.into(),
            validate: Box::new(validate),
        }
    }

    /// Passes when the metric decreased between bundles. A metric
    /// absent on either side fails the check.
    pub fn metric_decreased(key: &str) -> Self {
        let key_owned = key.to_string();
        Check::new(format!("{} decreased", key), move |before, after| {
            match (
                before.metric_f64(&key_owned),
                after.metric_f64(&key_owned),
            ) {
                (Some(b), Some(a)) => a < b,
                _ => false,
            }
        })
    }

    /// Passes when the metric in the after bundle is below a threshold.
    pub fn metric_below(key: &str, threshold: f64) -> Self {
        let key_owned = key.to_string();
        Check::new(
            format!("{} below {}", key, threshold),
            move |_before, after| {
                after
                    .metric_f64(&key_owned)
                    .map(|v| v < threshold)
                    .unwrap_or(false)
            },
        )
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("label", &self.label).finish()
    }
}

/// One check's label and result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub label: String,
    pub ok: bool,
}

/// Result of running all checks over a before/after pair.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    /// Logical AND of all checks.
    pub ok: bool,
    pub checks: Vec<CheckOutcome>,
    pub before: EvidenceBundle,
    pub after: EvidenceBundle,
}

/// Run every check; `ok` is the AND of the individual results.
pub fn run_checks(
    before: &EvidenceBundle,
    after: &EvidenceBundle,
    checks: &[Check],
) -> VerificationResult {
    let outcomes: Vec<CheckOutcome> = checks
        .iter()
        .map(|check| CheckOutcome {
            label: check.label.clone(),
            ok: (check.validate)(before, after),
        })
        .collect();

    VerificationResult {
        ok: outcomes.iter().all(|o| o.ok),
        checks: outcomes,
        before: before.clone(),
        after: after.clone(),
    }
}

/// Default verification checks for a diagnosed cause.
pub fn default_checks_for(cause_id: &str) -> Vec<Check> {
    match cause_id {
        id if id.contains("disk") || id == "log_bloat" || id == "temp_files" => vec![
            Check::metric_decreased("disk_use_percent"),
            Check::metric_below("disk_use_percent", 90.0),
        ],
        id if id.contains("memory") || id == "swap_thrash" => vec![
            Check::metric_decreased("mem_used_percent"),
            Check::metric_below("mem_used_percent", 85.0),
        ],
        id if id.contains("cpu") => vec![Check::metric_decreased("load1")],
        id if id.contains("thermal") || id.contains("fan") => {
            vec![Check::metric_below("cpu_temp", 80.0)]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn evidence(pairs: &[(&str, f64)]) -> EvidenceBundle {
        EvidenceBundle {
            collected_at: Utc::now(),
            raw: BTreeMap::new(),
            metrics: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
                .collect(),
            snapshots: Vec::new(),
        }
    }

    #[test]
    fn test_all_checks_pass() {
        let before = evidence(&[("disk_use_percent", 95.0)]);
        let after = evidence(&[("disk_use_percent", 60.0)]);
        let checks = vec![
            Check::metric_decreased("disk_use_percent"),
            Check::metric_below("disk_use_percent", 90.0),
        ];
        let result = run_checks(&before, &after, &checks);
        assert!(result.ok);
        assert_eq!(result.checks.len(), 2);
        assert!(result.checks.iter().all(|c| c.ok));
    }

    #[test]
    fn test_one_failing_check_fails_overall() {
        let before = evidence(&[("disk_use_percent", 95.0)]);
        let after = evidence(&[("disk_use_percent", 92.0)]);
        let checks = vec![
            Check::metric_decreased("disk_use_percent"),
            Check::metric_below("disk_use_percent", 90.0),
        ];
        let result = run_checks(&before, &after, &checks);
        assert!(!result.ok);
        assert!(result.checks[0].ok);
        assert!(!result.checks[1].ok);
    }

    #[test]
    fn test_missing_metric_fails_check() {
        let before = evidence(&[]);
        let after = evidence(&[]);
        let result = run_checks(&before, &after, &[Check::metric_decreased("load1")]);
        assert!(!result.ok);
    }

    #[test]
    fn test_empty_checks_is_vacuously_ok() {
        let before = evidence(&[]);
        let after = evidence(&[]);
        let result = run_checks(&before, &after, &[]);
        assert!(result.ok);
        assert!(result.checks.is_empty());
    }

    #[test]
    fn test_default_checks_by_cause() {
        assert_eq!(default_checks_for("log_bloat").len(), 2);
        assert_eq!(default_checks_for("memory_leak").len(), 2);
        assert_eq!(default_checks_for("cpu_runaway").len(), 1);
        assert_eq!(default_checks_for("thermal_hardware").len(), 1);
        assert!(default_checks_for("unknown").is_empty());
    }

    #[test]
    fn test_custom_closure_check() {
        let before = evidence(&[("load1", 4.0)]);
        let after = evidence(&[("load1", 1.0)]);
        let halved = Check::new("load halved", |b, a| {
            match (b.metric_f64("load1"), a.metric_f64("load1")) {
                (Some(b), Some(a)) => a <= b / 2.0,
                _ => false,
            }
        });
        let result = run_checks(&before, &after, &[halved]);
        assert!(result.ok);
    }
}
