//! Command normalization and risk classification.
//!
//! Normalization makes allowlist and risk matching spelling-insensitive:
//! whitespace runs collapse to single spaces and a small table of
//! equivalent long flag spellings canonicalizes to their short forms.
//! Risk classification pattern-matches the normalized command against a
//! fixed verb table; unknown commands default to `SafeWrite` because
//! under-classifying risk is the unsafe direction.

use sd_common::Risk;
use sd_config::CommandAllowlist;

/// Result of normalizing a raw command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub normalized: String,
}

/// Long-form flag spellings and their canonical short forms.
///
/// Deliberately small: only spellings of the inspection/fix tools this
/// engine plans with. Unknown flags pass through untouched.
const FLAG_SPELLINGS: &[(&str, &str)] = &[
    ("--human-readable", "-h"),
    ("--human", "-h"),
    ("--all", "-a"),
    ("--force", "-f"),
    ("--recursive", "-r"),
];

/// Canonicalize a command string. Pure and total: never fails.
pub fn normalize_command(raw: &str) -> NormalizedCommand {
    let normalized = raw
        .split_whitespace()
        .map(|token| {
            FLAG_SPELLINGS
                .iter()
                .find(|(long, _)| *long == token)
                .map(|(_, short)| *short)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" ");
    NormalizedCommand { normalized }
}

/// Verbs whose invocations never mutate system state.
const READ_VERBS: &[&str] = &[
    "uptime", "cat", "ps", "free", "df", "du", "sensors", "top", "uname", "who", "whoami", "ls",
    "head", "tail", "grep", "wc", "sort", "date", "echo", "iostat", "vmstat", "lscpu", "lsblk",
];

/// Verbs marking destructive or irreversible commands, matched as
/// whole tokens anywhere in the (possibly piped) command.
const HIGH_IMPACT_VERBS: &[&str] = &[
    "rm", "rmdir", "fdisk", "dd", "shutdown", "reboot", "halt", "poweroff", "kill", "killall",
    "pkill",
];

/// First tokens of reversible package/service mutations.
const SAFE_WRITE_VERBS: &[&str] = &[
    "apt", "apt-get", "yum", "dnf", "brew", "npm", "pip", "systemctl", "service", "docker",
    "journalctl", "renice", "sync", "swapon", "swapoff", "sysctl",
];

/// Classify a command into a risk tier.
///
/// Checked most-destructive first so a pipeline containing a kill verb
/// never classifies as read.
pub fn classify_risk(command: &str) -> Risk {
    let normalized = normalize_command(command).normalized;

    let destructive = normalized
        .split(|c: char| c.is_whitespace() || c == '|' || c == ';' || c == '&')
        .any(|token| HIGH_IMPACT_VERBS.contains(&token) || token.starts_with("mkfs"));
    if destructive {
        return Risk::HighImpact;
    }

    // A pipeline is read-risk only when every segment starts with a
    // read verb.
    let all_read = normalized.split('|').all(|segment| {
        segment
            .split_whitespace()
            .next()
            .map(|verb| READ_VERBS.contains(&verb))
            .unwrap_or(false)
    });
    if all_read {
        return Risk::Read;
    }

    if let Some(first) = normalized.split_whitespace().next() {
        if SAFE_WRITE_VERBS.contains(&first) {
            // `docker ps`-style inspections read; everything else under
            // these verbs mutates.
            if first == "docker"
                && (normalized.starts_with("docker ps") || normalized.starts_with("docker stats"))
            {
                return Risk::Read;
            }
            return Risk::SafeWrite;
        }
    }

    Risk::SafeWrite
}

/// Allowlist membership test over the normalized command.
///
/// A hard gate independent of risk tier: a read-risk command not on the
/// allowlist is still rejected.
pub fn is_allowed(command: &str, allowlist: &CommandAllowlist) -> bool {
    allowlist.matches(&normalize_command(command).normalized)
}
