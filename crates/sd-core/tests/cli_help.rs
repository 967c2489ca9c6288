//! CLI smoke tests for the sd binary.
//!
//! Only read-only subcommands run here; nothing in this file touches
//! system state.

use assert_cmd::Command;
use predicates::prelude::*;

fn sd() -> Command {
    Command::cargo_bin("sd").expect("sd binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    sd().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("triage"))
        .stdout(predicate::str::contains("rules"))
        .stdout(predicate::str::contains("classify"));
}

#[test]
fn test_version_flag() {
    sd().arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sd"));
}

#[test]
fn test_classify_read_command() {
    sd().args(["classify", "df", "--human-readable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("normalized: df -h"))
        .stdout(predicate::str::contains("risk: read"));
}

#[test]
fn test_classify_high_impact_command() {
    sd().args(["classify", "rm", "-rf", "/tmp/x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("risk: high-impact"));
}

#[test]
fn test_triage_hot_intent_shows_sensors_step() {
    sd().args(["triage", "laptop running hot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Playbook: hot"))
        .stdout(predicate::str::contains("sensors"));
}

#[test]
fn test_triage_json_output_parses() {
    let output = sd()
        .args(["triage", "disk is full", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(parsed["matched_playbook"], "disk");
    assert!(parsed["suggested_steps"].as_array().unwrap().len() >= 6);
}

#[test]
fn test_rules_lists_builtin_rule_ids() {
    sd().arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("cpu_sustained_overload"))
        .stdout(predicate::str::contains("disk_near_full"))
        .stdout(predicate::str::contains("runaway_process"));
}

#[test]
fn test_unknown_subcommand_fails() {
    sd().arg("frobnicate").assert().failure();
}
