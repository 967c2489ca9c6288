//! Tolerant parsers for standard inspection tool output.
//!
//! Every parser here is a pure function, total over malformed input:
//! a best-effort partial parse (or an empty result) rather than an
//! error, since absence of one tool's output is an expected condition.
//! Missing inputs simply produce no snapshot or metric for that kind.

use super::{EvidenceBundle, RawStepRecord, Snapshot, SnapshotKind};
use chrono::Utc;
use regex::Regex;
use sd_common::StepId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One row of a process-table listing, sorted descending by CPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub command: String,
}

/// Load averages plus the extra fields /proc/loadavg carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadAverages {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runnable: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_threads: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pid: Option<u32>,
}

/// Memory totals in bytes, converted from human-readable sizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub shared_bytes: u64,
    pub cache_bytes: u64,
    pub available_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_used_bytes: Option<u64>,
}

/// One filesystem row of a disk-usage listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskRow {
    pub filesystem: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub use_percent: f64,
    pub mount_point: String,
}

/// Thermal readings extracted by tolerant pattern matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThermalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cpu_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_rpm: Option<u32>,
}

impl ThermalInfo {
    pub fn is_empty(&self) -> bool {
        self.max_cpu_temp.is_none() && self.fan_rpm.is_none()
    }
}

/// Parse a human-readable size (`4.2G`, `512M`, `3Gi`, `1024`) into
/// bytes. Suffixes are binary powers of 1024.
pub fn parse_size(s: &str) -> Option<u64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let numeric_end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(trimmed.len());
    let (num_str, suffix) = trimmed.split_at(numeric_end);
    let value: f64 = num_str.replace(',', ".").parse().ok()?;

    let multiplier: u64 = match suffix.trim().trim_end_matches(['i', 'B', 'b']) {
        "" => 1,
        "K" | "k" => 1024,
        "M" | "m" => 1024 * 1024,
        "G" | "g" => 1024 * 1024 * 1024,
        "T" | "t" => 1024_u64.pow(4),
        _ => return None,
    };

    Some((value * multiplier as f64) as u64)
}

/// Parse a process-table listing into entries sorted descending by CPU.
///
/// Handles `ps -eo pid,ppid,pcpu,pmem,comm` style output with or
/// without a USER column; rows that do not parse are skipped.
pub fn parse_ps(content: &str) -> Vec<ProcessEntry> {
    let mut lines = content.lines();

    // Column positions come from the header when one is present.
    let mut pid_col = 0;
    let mut cpu_col = 2;
    let mut mem_col = 3;
    let mut user_col: Option<usize> = None;
    let mut cmd_col = 4;

    let mut first_data_line: Option<&str> = None;
    if let Some(first) = lines.next() {
        let upper = first.to_uppercase();
        if upper.contains("PID") {
            let headers: Vec<&str> = first.split_whitespace().collect();
            for (i, h) in headers.iter().enumerate() {
                match h.to_uppercase().as_str() {
                    "PID" => pid_col = i,
                    "%CPU" | "PCPU" | "CPU" => cpu_col = i,
                    "%MEM" | "PMEM" | "MEM" => mem_col = i,
                    "USER" => user_col = Some(i),
                    "COMMAND" | "COMM" | "CMD" => cmd_col = i,
                    _ => {}
                }
            }
        } else {
            first_data_line = Some(first);
        }
    }

    let mut entries = Vec::new();
    for line in first_data_line.into_iter().chain(lines) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= cpu_col.max(mem_col).max(pid_col) {
            continue;
        }
        let Ok(pid) = fields[pid_col].parse::<u32>() else {
            continue;
        };
        let Ok(cpu_percent) = fields[cpu_col].parse::<f64>() else {
            continue;
        };
        let Ok(mem_percent) = fields[mem_col].parse::<f64>() else {
            continue;
        };
        let command = if cmd_col < fields.len() {
            fields[cmd_col..].join(" ")
        } else {
            fields.last().map(|s| s.to_string()).unwrap_or_default()
        };
        entries.push(ProcessEntry {
            pid,
            user: user_col.and_then(|i| fields.get(i)).map(|s| s.to_string()),
            cpu_percent,
            mem_percent,
            command,
        });
    }

    entries.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}

/// Parse `/proc/loadavg` content: `0.52 0.58 0.59 1/467 2012`.
pub fn parse_loadavg(content: &str) -> Option<LoadAverages> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }

    let load1 = fields[0].parse().ok()?;
    let load5 = fields[1].parse().ok()?;
    let load15 = fields[2].parse().ok()?;

    let (runnable, total_threads) = fields
        .get(3)
        .and_then(|f| f.split_once('/'))
        .map(|(r, t)| (r.parse().ok(), t.parse().ok()))
        .unwrap_or((None, None));

    Some(LoadAverages {
        load1,
        load5,
        load15,
        runnable,
        total_threads,
        last_pid: fields.get(4).and_then(|f| f.parse().ok()),
    })
}

/// Parse `uptime` output, tolerating both `load average:` and the
/// BSD-style `load averages:` spelling and comma-separated values.
pub fn parse_uptime(content: &str) -> Option<LoadAverages> {
    let idx = content.find("load average")?;
    let tail = &content[idx..];
    let after_colon = tail.split_once(':')?.1;

    let loads: Vec<f64> = after_colon
        .split([',', ' '])
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .take(3)
        .collect();
    if loads.len() < 3 {
        return None;
    }

    Some(LoadAverages {
        load1: loads[0],
        load5: loads[1],
        load15: loads[2],
        runnable: None,
        total_threads: None,
        last_pid: None,
    })
}

/// Parse `free -h` style output into byte counts.
///
/// Expects a `Mem:` row (total, used, free, shared, buff/cache,
/// available) and an optional `Swap:` row.
pub fn parse_free(content: &str) -> Option<MemoryInfo> {
    let mut info: Option<MemoryInfo> = None;

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        match fields[0].trim_end_matches(':') {
            "Mem" if fields.len() >= 3 => {
                let mut mem = MemoryInfo {
                    total_bytes: parse_size(fields[1])?,
                    used_bytes: parse_size(fields[2])?,
                    ..Default::default()
                };
                mem.free_bytes = fields.get(3).and_then(|f| parse_size(f)).unwrap_or(0);
                mem.shared_bytes = fields.get(4).and_then(|f| parse_size(f)).unwrap_or(0);
                mem.cache_bytes = fields.get(5).and_then(|f| parse_size(f)).unwrap_or(0);
                mem.available_bytes = fields.get(6).and_then(|f| parse_size(f)).unwrap_or(0);
                info = Some(mem);
            }
            "Swap" if fields.len() >= 3 => {
                if let Some(ref mut mem) = info {
                    mem.swap_total_bytes = parse_size(fields[1]);
                    mem.swap_used_bytes = parse_size(fields[2]);
                }
            }
            _ => {}
        }
    }

    info
}

/// Parse `df -h` style output into per-filesystem rows.
///
/// The mount point is the last field and the use percentage the
/// second-to-last, which survives filesystems with spaces in names.
pub fn parse_df(content: &str) -> Vec<DiskRow> {
    let mut rows = Vec::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        let use_percent_str = fields[fields.len() - 2];
        if !use_percent_str.ends_with('%') {
            continue;
        }
        let Ok(use_percent) = use_percent_str.trim_end_matches('%').parse::<f64>() else {
            continue;
        };
        let (Some(size_bytes), Some(used_bytes), Some(available_bytes)) = (
            parse_size(fields[1]),
            parse_size(fields[2]),
            parse_size(fields[3]),
        ) else {
            continue;
        };
        rows.push(DiskRow {
            filesystem: fields[0].to_string(),
            size_bytes,
            used_bytes,
            available_bytes,
            use_percent,
            mount_point: fields[fields.len() - 1].to_string(),
        });
    }

    rows
}

/// Extract the maximum reported temperature and fan speed from sensor
/// output. Absence of any match yields an empty result, not an error.
pub fn parse_sensors(content: &str) -> ThermalInfo {
    // Unwraps on literal patterns cannot fail.
    let temp_re = Regex::new(r"([+-]?\d+(?:\.\d+)?)\s*°?C\b").expect("static regex");
    let fan_re = Regex::new(r"(\d+)\s*RPM").expect("static regex");

    // First plausible reading per line is the current value; later
    // matches on the same line are high/crit threshold annotations.
    let max_cpu_temp = content
        .lines()
        .filter_map(|line| {
            temp_re
                .captures_iter(line)
                .filter_map(|c| c[1].parse::<f64>().ok())
                .find(|t| (0.0..=150.0).contains(t))
        })
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));

    let fan_rpm = fan_re
        .captures_iter(content)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .max();

    ThermalInfo {
        max_cpu_temp,
        fan_rpm,
    }
}

/// Severity label for a CPU temperature reading.
///
/// Thresholds: critical ≥ 90 °C, warn ≥ 80 °C.
pub fn temp_severity(temp: f64) -> &'static str {
    if temp >= 90.0 {
        "critical"
    } else if temp >= 80.0 {
        "warn"
    } else {
        "normal"
    }
}

/// Combine raw step outputs into an evidence bundle.
///
/// Runs whichever parser has matching input present; sources are
/// recognized by step id first, content sniffing second. Missing or
/// failed steps contribute no snapshot or metric for their kind.
pub fn build_evidence(outputs: &BTreeMap<StepId, RawStepRecord>) -> EvidenceBundle {
    let collected_at = Utc::now();
    let mut metrics: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut snapshots = Vec::new();

    let mut push_snapshot = |snapshots: &mut Vec<Snapshot>, kind, data| {
        snapshots.push(Snapshot {
            ts: collected_at,
            kind,
            data,
        });
    };

    for (step_id, record) in outputs {
        if record.exit_code != 0 || record.stdout.is_empty() {
            continue;
        }
        let stdout = record.stdout.as_str();

        match sniff_kind(step_id.as_str(), stdout) {
            Some(SnapshotKind::Cpu) => {
                let parsed = parse_loadavg(stdout).or_else(|| parse_uptime(stdout));
                if let Some(load) = parsed {
                    metrics.insert("load1".into(), serde_json::json!(load.load1));
                    metrics.insert("load5".into(), serde_json::json!(load.load5));
                    metrics.insert("load15".into(), serde_json::json!(load.load15));
                    if let Ok(data) = serde_json::to_value(&load) {
                        push_snapshot(&mut snapshots, SnapshotKind::Cpu, data);
                    }
                }
            }
            Some(SnapshotKind::Proc) => {
                let entries = parse_ps(stdout);
                if !entries.is_empty() {
                    metrics.insert("proc_count".into(), serde_json::json!(entries.len()));
                    let top = &entries[0];
                    metrics.insert("top_cpu_percent".into(), serde_json::json!(top.cpu_percent));
                    metrics.insert("top_cpu_pid".into(), serde_json::json!(top.pid));
                    metrics.insert(
                        "top_cpu_command".into(),
                        serde_json::json!(top.command.clone()),
                    );
                    if let Ok(data) = serde_json::to_value(&entries) {
                        push_snapshot(&mut snapshots, SnapshotKind::Proc, data);
                    }
                }
            }
            Some(SnapshotKind::Mem) => {
                if let Some(mem) = parse_free(stdout) {
                    if mem.total_bytes > 0 {
                        let used_pct =
                            (mem.used_bytes as f64 / mem.total_bytes as f64 * 1000.0).round()
                                / 10.0;
                        metrics.insert("mem_used_percent".into(), serde_json::json!(used_pct));
                    }
                    if let (Some(swap_total), Some(swap_used)) =
                        (mem.swap_total_bytes, mem.swap_used_bytes)
                    {
                        if swap_total > 0 {
                            let swap_pct =
                                (swap_used as f64 / swap_total as f64 * 1000.0).round() / 10.0;
                            metrics
                                .insert("swap_used_percent".into(), serde_json::json!(swap_pct));
                        }
                    }
                    if let Ok(data) = serde_json::to_value(&mem) {
                        push_snapshot(&mut snapshots, SnapshotKind::Mem, data);
                    }
                }
            }
            Some(SnapshotKind::Disk) => {
                let rows = parse_df(stdout);
                if !rows.is_empty() {
                    // Root mount preferred; otherwise the fullest filesystem.
                    let root = rows.iter().find(|r| r.mount_point == "/");
                    let pick = root.or_else(|| {
                        rows.iter().max_by(|a, b| {
                            a.use_percent
                                .partial_cmp(&b.use_percent)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                    });
                    if let Some(row) = pick {
                        metrics
                            .insert("disk_use_percent".into(), serde_json::json!(row.use_percent));
                    }
                    if let Ok(data) = serde_json::to_value(&rows) {
                        push_snapshot(&mut snapshots, SnapshotKind::Disk, data);
                    }
                }
            }
            Some(SnapshotKind::Thermal) => {
                let thermal = parse_sensors(stdout);
                if !thermal.is_empty() {
                    if let Some(temp) = thermal.max_cpu_temp {
                        metrics.insert("cpu_temp".into(), serde_json::json!(temp));
                        metrics.insert(
                            "temp_severity".into(),
                            serde_json::json!(temp_severity(temp)),
                        );
                    }
                    if let Some(rpm) = thermal.fan_rpm {
                        metrics.insert("fan_rpm".into(), serde_json::json!(rpm));
                    }
                    if let Ok(data) = serde_json::to_value(&thermal) {
                        push_snapshot(&mut snapshots, SnapshotKind::Thermal, data);
                    }
                }
            }
            None => {
                debug!(step_id = %step_id, "no parser matched step output");
            }
        }
    }

    EvidenceBundle {
        collected_at,
        raw: outputs.clone(),
        metrics,
        snapshots,
    }
}

/// Recognize which parser a step output belongs to.
fn sniff_kind(step_id: &str, stdout: &str) -> Option<SnapshotKind> {
    match step_id {
        "uptime" | "loadavg" => return Some(SnapshotKind::Cpu),
        "ps" => return Some(SnapshotKind::Proc),
        "free" => return Some(SnapshotKind::Mem),
        "df" => return Some(SnapshotKind::Disk),
        "sensors" => return Some(SnapshotKind::Thermal),
        _ => {}
    }

    // Content sniffing for caller-supplied plans with custom step ids.
    if stdout.contains("load average") || parse_loadavg(stdout).is_some() {
        Some(SnapshotKind::Cpu)
    } else if stdout.contains("Mem:") {
        Some(SnapshotKind::Mem)
    } else if stdout.contains("Filesystem") || stdout.contains("Mounted on") {
        Some(SnapshotKind::Disk)
    } else if stdout.contains("°C") || stdout.contains("RPM") {
        Some(SnapshotKind::Thermal)
    } else if stdout.to_uppercase().contains("PID") {
        Some(SnapshotKind::Proc)
    } else {
        None
    }
}
