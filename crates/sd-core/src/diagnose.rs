//! Differential-diagnosis scoring.
//!
//! Candidates arrive pre-annotated with the finding titles that support
//! or disconfirm them. Scoring is a severity-weighted count of matching
//! supporting titles minus disconfirming matches, clamped to [0, 1].
//! Ties break by input order, so candidate ordering in a playbook acts
//! as a tie-break priority. Diagnosis always terminates with some
//! primary: an empty or unsupported candidate set falls back to a
//! lowest-confidence general answer.

use crate::rules::Finding;
use serde::{Deserialize, Serialize};

/// Cap on differential list length.
const DIFFERENTIAL_LIMIT: usize = 4;

/// Damping factor applied when no supporting finding matched.
const NO_SUPPORT_DAMP: f64 = 0.7;

/// A candidate root cause, pre-annotated with its evidence links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisCandidate {
    pub cause_id: String,
    pub label: String,
    /// Finding titles that raise this candidate's score.
    pub supporting: Vec<String>,
    /// Finding titles that lower it.
    #[serde(default)]
    pub disconfirming: Vec<String>,
}

impl DiagnosisCandidate {
    pub fn new(cause_id: impl Into<String>, label: impl Into<String>, supporting: &[&str]) -> Self {
        DiagnosisCandidate {
            cause_id: cause_id.into(),
            label: label.into(),
            supporting: supporting.iter().map(|s| s.to_string()).collect(),
            disconfirming: Vec::new(),
        }
    }

    pub fn with_disconfirming(mut self, disconfirming: &[&str]) -> Self {
        self.disconfirming = disconfirming.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A candidate with its computed score and the findings that drove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDiagnosis {
    pub cause_id: String,
    pub label: String,
    /// Score in [0, 1]; doubles as the diagnosis probability.
    pub score: f64,
    /// Titles of findings that matched the supporting list.
    pub supporting_findings: Vec<String>,
    /// Titles of findings that matched the disconfirming list.
    pub disconfirming_findings: Vec<String>,
}

/// Primary diagnosis plus ranked differential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisBundle {
    pub primary: ScoredDiagnosis,
    /// Remaining candidates, descending by score.
    pub differential: Vec<ScoredDiagnosis>,
    pub notes: String,
}

/// Case-insensitive containment in either direction, so a playbook can
/// reference "High CPU" and still match the "High CPU Load" finding.
fn titles_match(annotation: &str, finding_title: &str) -> bool {
    let a = annotation.to_lowercase();
    let f = finding_title.to_lowercase();
    a.contains(&f) || f.contains(&a)
}

/// Score candidates against findings and rank them.
///
/// The returned pair is (primary, differential): primary is the
/// highest-scoring candidate (first wins on ties), differential the
/// rest in descending score order, capped.
pub fn score_diagnoses(
    findings: &[Finding],
    candidates: &[DiagnosisCandidate],
) -> (ScoredDiagnosis, Vec<ScoredDiagnosis>) {
    if candidates.is_empty() {
        return (unknown_fallback(), Vec::new());
    }

    let mut scored: Vec<ScoredDiagnosis> = candidates
        .iter()
        .map(|candidate| {
            let mut score = 0.0;
            let mut supporting_findings = Vec::new();
            let mut disconfirming_findings = Vec::new();

            for finding in findings {
                if candidate
                    .supporting
                    .iter()
                    .any(|s| titles_match(s, &finding.title))
                {
                    score += finding.severity.support_weight();
                    supporting_findings.push(finding.title.clone());
                }
                if candidate
                    .disconfirming
                    .iter()
                    .any(|d| titles_match(d, &finding.title))
                {
                    score -= 1.0;
                    disconfirming_findings.push(finding.title.clone());
                }
            }

            if supporting_findings.is_empty() {
                score *= NO_SUPPORT_DAMP;
            }

            ScoredDiagnosis {
                cause_id: candidate.cause_id.clone(),
                label: candidate.label.clone(),
                score: score.clamp(0.0, 1.0),
                supporting_findings,
                disconfirming_findings,
            }
        })
        .collect();

    // Stable sort: equal scores keep input order, so the first-listed
    // candidate wins ties.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let primary = scored.remove(0);
    scored.truncate(DIFFERENTIAL_LIMIT);
    (primary, scored)
}

fn unknown_fallback() -> ScoredDiagnosis {
    ScoredDiagnosis {
        cause_id: "unknown".to_string(),
        label: "Unable to determine cause".to_string(),
        score: 0.0,
        supporting_findings: Vec::new(),
        disconfirming_findings: Vec::new(),
    }
}

/// Free-text summary of the findings behind a diagnosis.
pub fn diagnosis_notes(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "No significant issues detected.".to_string();
    }

    let critical: Vec<&str> = findings
        .iter()
        .filter(|f| f.severity == sd_common::Severity::Critical)
        .map(|f| f.title.as_str())
        .collect();
    let warnings: Vec<&str> = findings
        .iter()
        .filter(|f| f.severity == sd_common::Severity::Warn)
        .map(|f| f.title.as_str())
        .collect();

    let mut notes = String::new();
    if !critical.is_empty() {
        notes.push_str(&format!("Critical: {}. ", critical.join(", ")));
    }
    if !warnings.is_empty() {
        notes.push_str(&format!("Warnings: {}.", warnings.join(", ")));
    }

    if notes.is_empty() {
        "Issues detected. Review findings for details.".to_string()
    } else {
        notes.trim_end().to_string()
    }
}

/// Built-in candidate tables keyed by playbook.
///
/// Unknown playbooks get the general table so diagnosis always has
/// candidates to rank.
pub fn candidates_for_playbook(playbook: &str) -> Vec<DiagnosisCandidate> {
    match playbook {
        "hot" => vec![
            DiagnosisCandidate::new(
                "cpu_runaway",
                "Runaway CPU process",
                &["Runaway Process Detected", "High CPU Load"],
            ),
            DiagnosisCandidate::new(
                "thermal_hardware",
                "Hardware thermal issue",
                &["High Temperature", "Critical Temperature"],
            ),
            DiagnosisCandidate::new("fan_blocked", "Blocked cooling fan", &["High Temperature"]),
        ],
        "slow" => vec![
            DiagnosisCandidate::new("high_memory", "High memory usage", &["High Memory Usage"]),
            DiagnosisCandidate::new("disk_io", "Disk I/O bottleneck", &["High CPU Load"]),
            DiagnosisCandidate::new(
                "cpu_pressure",
                "CPU pressure",
                &["High CPU Load", "Critical CPU Load"],
            ),
        ],
        "disk" => vec![
            DiagnosisCandidate::new("log_bloat", "Large log files", &["Disk Nearly Full"]),
            DiagnosisCandidate::new(
                "temp_files",
                "Temporary files accumulation",
                &["Disk Nearly Full"],
            ),
            DiagnosisCandidate::new(
                "docker_bloat",
                "Docker data accumulation",
                &["Disk Nearly Full"],
            ),
        ],
        "memory" => vec![
            DiagnosisCandidate::new(
                "memory_leak",
                "Memory leak in a running process",
                &["High Memory Usage", "Critical Memory", "Runaway Process Detected"],
            ),
            DiagnosisCandidate::new(
                "swap_thrash",
                "Swap thrashing",
                &["High Memory Usage", "High CPU Load"],
            ),
            DiagnosisCandidate::new(
                "undersized_ram",
                "Workload exceeds installed RAM",
                &["High Memory Usage"],
            )
            .with_disconfirming(&["Runaway Process Detected"]),
        ],
        _ => vec![
            DiagnosisCandidate::new(
                "cpu_pressure",
                "CPU pressure",
                &["High CPU Load", "Critical CPU Load"],
            ),
            DiagnosisCandidate::new("high_memory", "High memory usage", &["High Memory Usage"]),
            DiagnosisCandidate::new("log_bloat", "Large log files", &["Disk Nearly Full"]),
            DiagnosisCandidate::new(
                "thermal_hardware",
                "Hardware thermal issue",
                &["High Temperature"],
            ),
        ],
    }
}
