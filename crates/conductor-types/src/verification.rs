use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a verification command came from, spec.md §4.6 command selection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSourceKind {
    Memory,
    Detected,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSource {
    pub source: CommandSourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Result of running one check (lint, typecheck, test, or a custom step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub passed: bool,
    pub truncated: bool,
}

/// Per-check-failure digest, spec.md §4.6 failure summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub failed_checks: Vec<String>,
    pub suspected_files: Vec<String>,
    pub suggested_next_actions: Vec<String>,
}

/// Output of one verification pass. `command_sources` is keyed by task name
/// (`lint`, `typecheck`, `test`, or a custom step name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<FailureSummary>,
    pub command_sources: BTreeMap<String, CommandSource>,
}

impl VerificationReport {
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_checks_filters_passing() {
        let report = VerificationReport {
            passed: false,
            checks: vec![
                CheckResult {
                    name: "lint".into(),
                    command: "eslint .".into(),
                    exit_code: Some(0),
                    duration_ms: 10,
                    stdout_path: "lint.out".into(),
                    stderr_path: "lint.err".into(),
                    passed: true,
                    truncated: false,
                },
                CheckResult {
                    name: "test".into(),
                    command: "npm test".into(),
                    exit_code: Some(1),
                    duration_ms: 20,
                    stdout_path: "test.out".into(),
                    stderr_path: "test.err".into(),
                    passed: false,
                    truncated: false,
                },
            ],
            failure_signature: None,
            failure_summary: None,
            command_sources: BTreeMap::new(),
        };
        assert_eq!(report.failed_checks().len(), 1);
        assert_eq!(report.failed_checks()[0].name, "test");
    }
}
