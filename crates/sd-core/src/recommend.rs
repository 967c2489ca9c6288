//! Fix recommendation and the confirmation gate.
//!
//! Recommendation wraps fix templates into concrete step plans and
//! sorts the options ascending by risk so the least invasive fix is
//! offered first. The gate is a pure policy function consulted before
//! every execution step; its high-impact contract (exact literal
//! `"YES"`, case-sensitive, untrimmed) is deliberate anti-accidental-
//! execution friction.

use crate::collect::{EvidenceBundle, Step};
use crate::diagnose::DiagnosisBundle;
use crate::plan::Plan;
use sd_common::Risk;
use serde::{Deserialize, Serialize};

/// A candidate fix strategy before it is bound to a diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixTemplate {
    pub label: String,
    pub why: String,
    pub risk: Risk,
    pub commands: Vec<String>,
}

impl FixTemplate {
    pub fn new(
        label: impl Into<String>,
        why: impl Into<String>,
        risk: Risk,
        commands: &[&str],
    ) -> Self {
        FixTemplate {
            label: label.into(),
            why: why.into(),
            risk,
            commands: commands.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A concrete, executable fix option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOption {
    pub id: String,
    pub label: String,
    pub why: String,
    pub risk: Risk,
    pub plan: Plan,
    pub expected_outcome: Vec<String>,
}

/// Wrap templates into fix options, sorted ascending by risk.
///
/// The sort is stable, so templates of equal risk keep their given
/// order.
pub fn recommend(diagnosis: &DiagnosisBundle, templates: &[FixTemplate]) -> Vec<FixOption> {
    let mut options: Vec<FixOption> = templates
        .iter()
        .enumerate()
        .map(|(i, template)| {
            let steps: Vec<Step> = template
                .commands
                .iter()
                .enumerate()
                .map(|(j, cmd)| {
                    Step::terminal(
                        format!("fix_{}_s{}", i, j),
                        cmd.clone(),
                        template.risk,
                        template.label.clone(),
                    )
                })
                .collect();

            FixOption {
                id: format!("fix_{}", i),
                label: template.label.clone(),
                why: template.why.clone(),
                risk: template.risk,
                plan: Plan::fix(
                    diagnosis.primary.label.clone(),
                    diagnosis.primary.cause_id.clone(),
                    template.why.clone(),
                    steps,
                ),
                expected_outcome: vec![format!("Resolve {}", diagnosis.primary.label)],
            }
        })
        .collect();

    options.sort_by_key(|o| o.risk);
    options
}

/// Confirmation text required for high-impact steps.
pub const HIGH_IMPACT_CONFIRMATION: &str = "YES";

/// The confirmation policy.
///
/// - `read`: always allowed.
/// - `safe-write`: allowed iff `confirmed`.
/// - `high-impact`: allowed iff `confirmed` and the typed text equals
///   the exact literal `"YES"` (case-sensitive, no trimming).
pub fn gate(step: &Step, confirmed: bool, confirmation_text: Option<&str>) -> bool {
    match step.risk {
        Risk::Read => true,
        Risk::SafeWrite => confirmed,
        Risk::HighImpact => confirmed && confirmation_text == Some(HIGH_IMPACT_CONFIRMATION),
    }
}

/// Built-in fix templates for a diagnosed cause.
///
/// Templates that target a specific process render the top CPU
/// consumer's pid from the evidence; without one those templates are
/// omitted rather than emitting an unrunnable command.
pub fn fix_templates_for(cause_id: &str, evidence: &EvidenceBundle) -> Vec<FixTemplate> {
    let top_pid = evidence
        .metric_f64("top_cpu_pid")
        .map(|p| p as u32);

    match cause_id {
        "log_bloat" => vec![
            FixTemplate::new(
                "Inspect log usage",
                "Confirm logs are what fills the disk before deleting anything.",
                Risk::Read,
                &["du -sh /var/log /tmp"],
            ),
            FixTemplate::new(
                "Vacuum journal logs",
                "Journald retains weeks of logs by default; vacuuming reclaims space immediately.",
                Risk::SafeWrite,
                &["journalctl --vacuum-time=7d"],
            ),
        ],
        "temp_files" => vec![
            FixTemplate::new(
                "Inspect temp usage",
                "Measure /tmp before clearing it.",
                Risk::Read,
                &["du -sh /var/log /tmp"],
            ),
            FixTemplate::new(
                "Clear temporary files",
                "Removes everything under /tmp; running jobs holding temp files will lose them.",
                Risk::HighImpact,
                &["rm -rf /tmp/*"],
            ),
        ],
        "docker_bloat" => vec![FixTemplate::new(
            "Prune docker data",
            "Unused images, stopped containers, and dangling volumes commonly dominate disk use.",
            Risk::SafeWrite,
            &["docker system prune -f"],
        )],
        "cpu_runaway" | "cpu_pressure" => {
            let mut templates = Vec::new();
            if let Some(pid) = top_pid {
                templates.push(FixTemplate::new(
                    "Renice runaway process",
                    "Lowers the offender's priority without killing it.",
                    Risk::SafeWrite,
                    &[format!("renice -n 10 -p {}", pid).as_str()],
                ));
                templates.push(FixTemplate::new(
                    "Terminate runaway process",
                    "Stops the offender outright; unsaved work in it is lost.",
                    Risk::HighImpact,
                    &[format!("kill -TERM {}", pid).as_str()],
                ));
            }
            templates
        }
        "high_memory" | "memory_leak" | "swap_thrash" => {
            let mut templates = vec![FixTemplate::new(
                "Cycle swap",
                "Forces swapped pages back to RAM, clearing thrash loops.",
                Risk::SafeWrite,
                &["swapoff -a && swapon -a"],
            )];
            if let Some(pid) = top_pid {
                templates.push(FixTemplate::new(
                    "Terminate top consumer",
                    "Frees the leaked memory by stopping the offender.",
                    Risk::HighImpact,
                    &[format!("kill -TERM {}", pid).as_str()],
                ));
            }
            templates
        }
        "thermal_hardware" | "fan_blocked" => vec![FixTemplate::new(
            "Re-read sensors",
            "Confirms whether temperatures recover once load drops.",
            Risk::Read,
            &["sensors"],
        )],
        "disk_io" => vec![FixTemplate::new(
            "Flush filesystem buffers",
            "Forces dirty pages to disk, shortening the I/O backlog.",
            Risk::SafeWrite,
            &["sync"],
        )],
        _ => Vec::new(),
    }
}
