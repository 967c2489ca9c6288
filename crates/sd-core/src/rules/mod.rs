//! Deterministic rule engine over collected evidence.
//!
//! A rule is a pure predicate expression over the metrics map plus an
//! emission template. Rules live in an explicit [`RuleRegistry`] owned
//! by the caller (no process-wide singletons), so sessions can run with
//! different rule sets. Findings come out ordered by severity, stable
//! within a severity by registration order, which keeps downstream
//! diagnosis scoring reproducible for identical input.

use crate::collect::{EvidenceBundle, StepOutput};
use regex::Regex;
use sd_common::{Severity, StepId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Predicate expression evaluated over the evidence metrics map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RuleExpr {
    Gt { key: String, value: f64 },
    Gte { key: String, value: f64 },
    Lt { key: String, value: f64 },
    Lte { key: String, value: f64 },
    Eq { key: String, value: serde_json::Value },
    Neq { key: String, value: serde_json::Value },
    And { exprs: Vec<RuleExpr> },
    Or { exprs: Vec<RuleExpr> },
    Exists { key: String },
    Matches { key: String, pattern: String },
}

impl RuleExpr {
    /// Evaluate against a metrics map. Absent numeric keys read as 0;
    /// an invalid `matches` pattern evaluates to false.
    pub fn evaluate(&self, metrics: &BTreeMap<String, serde_json::Value>) -> bool {
        let num = |key: &str| metrics.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);

        match self {
            RuleExpr::Gt { key, value } => num(key) > *value,
            RuleExpr::Gte { key, value } => num(key) >= *value,
            RuleExpr::Lt { key, value } => num(key) < *value,
            RuleExpr::Lte { key, value } => num(key) <= *value,
            RuleExpr::Eq { key, value } => metrics.get(key) == Some(value),
            RuleExpr::Neq { key, value } => metrics.get(key) != Some(value),
            RuleExpr::And { exprs } => exprs.iter().all(|e| e.evaluate(metrics)),
            RuleExpr::Or { exprs } => exprs.iter().any(|e| e.evaluate(metrics)),
            RuleExpr::Exists { key } => metrics.contains_key(key),
            RuleExpr::Matches { key, pattern } => {
                let Some(value) = metrics.get(key).and_then(|v| v.as_str()) else {
                    return false;
                };
                match Regex::new(pattern) {
                    Ok(re) => re.is_match(value),
                    Err(_) => false,
                }
            }
        }
    }
}

/// What a rule emits when its predicate holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEmit {
    pub severity: Severity,
    pub title: String,
    pub explanation: String,
    pub confidence: f64,
    /// Metric to reference as evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_key: Option<String>,
    /// Step output to excerpt as evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
}

/// A named, pure predicate rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub when: RuleExpr,
    pub emit: RuleEmit,
}

/// Builder for a rule with optional evidence references.
pub fn create_rule(
    id: impl Into<String>,
    when: RuleExpr,
    severity: Severity,
    title: impl Into<String>,
    explanation: impl Into<String>,
    confidence: f64,
    metric_key: Option<&str>,
) -> Rule {
    Rule {
        id: id.into(),
        when,
        emit: RuleEmit {
            severity,
            title: title.into(),
            explanation: explanation.into(),
            confidence,
            metric_key: metric_key.map(String::from),
            step_id: None,
        },
    }
}

/// Reference from a finding back to the evidence that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_key: Option<String>,
    pub excerpt: String,
}

/// An evidence-backed observation produced by a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub explanation: String,
    pub evidence_refs: Vec<EvidenceRef>,
    pub confidence: f64,
}

/// Registry of rules, preserving registration order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in rule set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for rule in default_rules() {
            registry.register(rule);
        }
        registry
    }

    /// Register a rule. A rule with a duplicate id replaces the
    /// original in place, keeping its registration position.
    pub fn register(&mut self, rule: Rule) {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// All rules in registration order.
    pub fn all_rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Excerpt cap for step-output evidence references.
const EXCERPT_LEN: usize = 200;

/// Run every rule against the evidence, collecting emitted findings.
///
/// Rules run in registration order; a rule that fails to evaluate is
/// skipped, never fatal. The result is sorted by severity (critical
/// first), stable within a severity.
pub fn generate_findings(
    rules: &[Rule],
    evidence: &EvidenceBundle,
    step_outputs: &BTreeMap<StepId, StepOutput>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for rule in rules {
        if !rule.when.evaluate(&evidence.metrics) {
            continue;
        }

        let mut evidence_refs = Vec::new();
        if let Some(ref step_id) = rule.emit.step_id {
            match step_outputs.get(step_id) {
                Some(output) => evidence_refs.push(EvidenceRef {
                    step_id: Some(step_id.clone()),
                    metric_key: None,
                    excerpt: truncate_chars(&output.stdout, EXCERPT_LEN),
                }),
                None => warn!(rule = %rule.id, step = %step_id, "evidence step missing"),
            }
        }
        if let Some(ref key) = rule.emit.metric_key {
            if let Some(value) = evidence.metrics.get(key) {
                evidence_refs.push(EvidenceRef {
                    step_id: None,
                    metric_key: Some(key.clone()),
                    excerpt: value.to_string(),
                });
            }
        }

        findings.push(Finding {
            id: format!("finding_{}", rule.id),
            severity: rule.emit.severity,
            title: rule.emit.title.clone(),
            explanation: rule.emit.explanation.clone(),
            evidence_refs,
            confidence: rule.emit.confidence,
        });
    }

    findings.sort_by_key(|f| f.severity);
    findings
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Built-in rule set covering CPU load, memory, disk, thermal, and
/// runaway-process conditions.
pub fn default_rules() -> Vec<Rule> {
    vec![
        create_rule(
            "cpu_sustained_overload",
            RuleExpr::Gte {
                key: "load1".into(),
                value: 2.0,
            },
            Severity::Warn,
            "High CPU Load",
            "System load exceeds number of CPU cores, indicating CPU pressure.",
            0.9,
            Some("load1"),
        ),
        create_rule(
            "cpu_critical_overload",
            RuleExpr::Gte {
                key: "load1".into(),
                value: 4.0,
            },
            Severity::Critical,
            "Critical CPU Load",
            "System is severely overloaded. Processes may be starved.",
            0.95,
            Some("load1"),
        ),
        create_rule(
            "mem_high_usage",
            RuleExpr::Gte {
                key: "mem_used_percent".into(),
                value: 85.0,
            },
            Severity::Warn,
            "High Memory Usage",
            "Memory usage is above 85%. System may be thrashing.",
            0.85,
            Some("mem_used_percent"),
        ),
        create_rule(
            "mem_critical",
            RuleExpr::Gte {
                key: "mem_used_percent".into(),
                value: 95.0,
            },
            Severity::Critical,
            "Critical Memory",
            "Memory is nearly exhausted. Risk of OOM kills.",
            0.95,
            Some("mem_used_percent"),
        ),
        create_rule(
            "disk_near_full",
            RuleExpr::Gte {
                key: "disk_use_percent".into(),
                value: 85.0,
            },
            Severity::Warn,
            "Disk Nearly Full",
            "Disk usage above 85%. May cause write failures.",
            0.9,
            Some("disk_use_percent"),
        ),
        create_rule(
            "disk_critical",
            RuleExpr::Gte {
                key: "disk_use_percent".into(),
                value: 95.0,
            },
            Severity::Critical,
            "Disk Critical",
            "Disk is critically full. Immediate cleanup needed.",
            0.95,
            Some("disk_use_percent"),
        ),
        create_rule(
            "thermal_high",
            RuleExpr::Gte {
                key: "cpu_temp".into(),
                value: 80.0,
            },
            Severity::Warn,
            "High Temperature",
            "CPU temperature above 80°C. Risk of throttling.",
            0.85,
            Some("cpu_temp"),
        ),
        create_rule(
            "thermal_critical",
            RuleExpr::Gte {
                key: "cpu_temp".into(),
                value: 90.0,
            },
            Severity::Critical,
            "Critical Temperature",
            "CPU temperature above 90°C. Risk of thermal damage.",
            0.95,
            Some("cpu_temp"),
        ),
        create_rule(
            "runaway_process",
            RuleExpr::Gt {
                key: "top_cpu_percent".into(),
                value: 100.0,
            },
            Severity::Warn,
            "Runaway Process Detected",
            "A single process using >100% CPU (multi-core).",
            0.9,
            Some("top_cpu_percent"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn evidence_with(pairs: &[(&str, serde_json::Value)]) -> EvidenceBundle {
        EvidenceBundle {
            collected_at: Utc::now(),
            raw: BTreeMap::new(),
            metrics: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            snapshots: Vec::new(),
        }
    }

    #[test]
    fn test_expr_comparisons() {
        let metrics: BTreeMap<String, serde_json::Value> =
            [("load1".to_string(), serde_json::json!(2.5))].into();
        assert!(RuleExpr::Gt {
            key: "load1".into(),
            value: 2.0
        }
        .evaluate(&metrics));
        assert!(!RuleExpr::Gte {
            key: "load1".into(),
            value: 3.0
        }
        .evaluate(&metrics));
        // Absent keys read as 0.
        assert!(RuleExpr::Lt {
            key: "missing".into(),
            value: 1.0
        }
        .evaluate(&metrics));
    }

    #[test]
    fn test_expr_and_or_exists() {
        let metrics: BTreeMap<String, serde_json::Value> = [
            ("a".to_string(), serde_json::json!(5.0)),
            ("label".to_string(), serde_json::json!("warn")),
        ]
        .into();
        let both = RuleExpr::And {
            exprs: vec![
                RuleExpr::Gte {
                    key: "a".into(),
                    value: 5.0,
                },
                RuleExpr::Exists {
                    key: "label".into(),
                },
            ],
        };
        assert!(both.evaluate(&metrics));
        let either = RuleExpr::Or {
            exprs: vec![
                RuleExpr::Gt {
                    key: "a".into(),
                    value: 100.0,
                },
                RuleExpr::Matches {
                    key: "label".into(),
                    pattern: "^warn$".into(),
                },
            ],
        };
        assert!(either.evaluate(&metrics));
    }

    #[test]
    fn test_expr_matches_invalid_pattern_is_false() {
        let metrics: BTreeMap<String, serde_json::Value> =
            [("label".to_string(), serde_json::json!("warn"))].into();
        assert!(!RuleExpr::Matches {
            key: "label".into(),
            pattern: "[unclosed".into()
        }
        .evaluate(&metrics));
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let mut registry = RuleRegistry::new();
        for rule in default_rules() {
            registry.register(rule);
        }
        let ids: Vec<&str> = registry.all_rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids[0], "cpu_sustained_overload");
        assert_eq!(*ids.last().unwrap(), "runaway_process");
        assert!(registry.get("disk_near_full").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_registry_replaces_duplicate_in_place() {
        let mut registry = RuleRegistry::with_defaults();
        let before = registry.len();
        let mut replacement = default_rules().remove(0);
        replacement.emit.title = "Replaced".to_string();
        registry.register(replacement);
        assert_eq!(registry.len(), before);
        assert_eq!(registry.get("cpu_sustained_overload").unwrap().emit.title, "Replaced");
        assert_eq!(registry.all_rules()[0].id, "cpu_sustained_overload");
    }

    #[test]
    fn test_generate_findings_disk_nearly_full() {
        let evidence = evidence_with(&[("disk_use_percent", serde_json::json!(95.0))]);
        let findings = generate_findings(&default_rules(), &evidence, &BTreeMap::new());
        let titles: Vec<&str> = findings.iter().map(|f| f.title.as_str()).collect();
        assert!(titles.contains(&"Disk Nearly Full"));
        assert!(titles.contains(&"Disk Critical"));
        // Critical sorts before warn.
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_generate_findings_quiet_system_is_empty() {
        let evidence = evidence_with(&[
            ("load1", serde_json::json!(0.3)),
            ("mem_used_percent", serde_json::json!(40.0)),
            ("disk_use_percent", serde_json::json!(50.0)),
        ]);
        let findings = generate_findings(&default_rules(), &evidence, &BTreeMap::new());
        assert!(findings.is_empty());
    }

    #[test]
    fn test_generate_findings_metric_evidence_ref() {
        let evidence = evidence_with(&[("load1", serde_json::json!(2.5))]);
        let findings = generate_findings(&default_rules(), &evidence, &BTreeMap::new());
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.title, "High CPU Load");
        assert_eq!(finding.id, "finding_cpu_sustained_overload");
        assert_eq!(finding.evidence_refs.len(), 1);
        assert_eq!(finding.evidence_refs[0].metric_key.as_deref(), Some("load1"));
        assert_eq!(finding.evidence_refs[0].excerpt, "2.5");
    }

    #[test]
    fn test_generate_findings_step_excerpt_capped() {
        let mut rule = create_rule(
            "noisy",
            RuleExpr::Exists {
                key: "load1".into(),
            },
            Severity::Info,
            "Noisy Step",
            "Step output attached.",
            0.5,
            None,
        );
        rule.emit.step_id = Some(StepId::new("ps"));

        let evidence = evidence_with(&[("load1", serde_json::json!(0.5))]);
        let outputs: BTreeMap<StepId, StepOutput> = [(
            StepId::new("ps"),
            StepOutput {
                stdout: "x".repeat(500),
                stderr: String::new(),
                exit_code: 0,
            },
        )]
        .into();

        let findings = generate_findings(&[rule], &evidence, &outputs);
        assert_eq!(findings[0].evidence_refs[0].excerpt.len(), 200);
    }

    #[test]
    fn test_runaway_process_rule_fires_above_100() {
        let evidence = evidence_with(&[("top_cpu_percent", serde_json::json!(180.0))]);
        let findings = generate_findings(&default_rules(), &evidence, &BTreeMap::new());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Runaway Process Detected");
    }
}
