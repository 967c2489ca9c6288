//! Symptom triage and playbook matching.
//!
//! Intent text is lower-cased and scanned against a fixed table of
//! symptom keywords. Every matching category is collected, not just the
//! first. The suggested plan starts from a baseline of cheap read-only
//! inspection steps and appends symptom-specific probes; triage never
//! yields an empty plan.

use crate::collect::Step;
use sd_common::Risk;
use serde::{Deserialize, Serialize};

/// Symptom categories and the keywords that select them, in priority
/// order: the first matching category names the playbook.
const SYMPTOM_PATTERNS: &[(&str, &[&str])] = &[
    (
        "hot",
        &["hot", "running hot", "temperature", "overheat", "fan", "thermal", "cpu hot"],
    ),
    ("slow", &["slow", "lag", "performance", "speed", "responsive"]),
    ("disk", &["disk", "space", "full", "storage", "capacity"]),
    ("memory", &["memory", "ram", "leak", "swapping", "oom"]),
    ("network", &["network", "wifi", "internet", "connection", "port"]),
    ("docker", &["docker", "container", "image"]),
    ("build", &["build", "compile", "error", "failed"]),
];

/// Result of symptom triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    /// Playbook to use; `general` when nothing matched.
    pub matched_playbook: String,
    /// All matching symptom categories.
    pub symptom_keywords: Vec<String>,
    /// Baseline inspection plan plus symptom-specific steps.
    pub suggested_steps: Vec<Step>,
}

/// Baseline set of cheap, read-only inspection steps.
pub fn base_inspect_steps() -> Vec<Step> {
    vec![
        Step::terminal("uptime", "uptime", Risk::Read, "Load average"),
        Step::terminal("loadavg", "cat /proc/loadavg", Risk::Read, "Load details"),
        Step::terminal(
            "ps",
            "ps -eo pid,ppid,pcpu,pmem,comm --sort=-pcpu | head -n 20",
            Risk::Read,
            "Top processes",
        ),
        Step::terminal("free", "free -h", Risk::Read, "Memory usage"),
        Step::terminal("df", "df -h", Risk::Read, "Disk usage"),
    ]
}

/// Classify intent text into symptoms and an inspection plan.
pub fn triage(intent: &str) -> TriageResult {
    let lower = intent.to_lowercase();

    let symptom_keywords: Vec<String> = SYMPTOM_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(symptom, _)| symptom.to_string())
        .collect();

    let mut suggested_steps = base_inspect_steps();

    let matched = |s: &str| symptom_keywords.iter().any(|k| k == s);

    if matched("hot") || matched("slow") {
        suggested_steps.push(Step::terminal(
            "sensors",
            "sensors",
            Risk::Read,
            "Temperature sensors",
        ));
    }

    if matched("disk") {
        suggested_steps.push(Step::terminal(
            "du",
            "du -sh /var/log /tmp",
            Risk::Read,
            "Largest usual suspects",
        ));
    }

    TriageResult {
        matched_playbook: symptom_keywords
            .first()
            .cloned()
            .unwrap_or_else(|| "general".to_string()),
        symptom_keywords,
        suggested_steps,
    }
}
