use std::sync::OnceLock;

use regex::Regex;

use crate::external::CommandExecution;
use crate::profile::Task;

const STDERR_TAIL_KIB: usize = 2048;
const MAX_KEY_ERROR_LINES: usize = 10;
const FALLBACK_LINE_COUNT: usize = 5;

/// Per-check digest: key error lines, a stderr tail snippet, and files the
/// errors point at. Assembled into `FailureSummary` by the caller, one per
/// failed check (spec.md §4.6).
pub struct CheckDigest {
    pub key_errors: Vec<String>,
    pub stderr_tail: String,
    pub suspected_files: Vec<String>,
}

pub fn digest_failure(execution: &CommandExecution) -> CheckDigest {
    CheckDigest {
        key_errors: extract_key_errors(&execution.stderr),
        stderr_tail: tail(&execution.stderr, STDERR_TAIL_KIB),
        suspected_files: extract_suspected_files(&execution.stderr),
    }
}

fn extract_key_errors(stderr: &str) -> Vec<String> {
    let pattern = key_error_pattern();
    let matched: Vec<String> = stderr
        .lines()
        .filter(|line| pattern.is_match(line))
        .take(MAX_KEY_ERROR_LINES)
        .map(str::to_string)
        .collect();

    if !matched.is_empty() {
        return matched;
    }

    stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .rev()
        .take(FALLBACK_LINE_COUNT)
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}

fn key_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(Error:|error TS|^\s*at |FAIL|FAILED)").unwrap())
}

fn suspected_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9_\-/.]+\.(?:ts|tsx|js|jsx|json|md)):(?:\d+|\(\d+)").unwrap()
    })
}

fn extract_suspected_files(stderr: &str) -> Vec<String> {
    let pattern = suspected_file_pattern();
    let mut files = Vec::new();
    for capture in pattern.captures_iter(stderr) {
        let path = capture[1].to_string();
        if path.contains("node_modules") {
            continue;
        }
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

fn tail(text: &str, max_bytes: usize) -> String {
    let bytes = text.as_bytes();
    let start = bytes.len().saturating_sub(max_bytes);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

/// Per-task next-step suggestion, spec.md §4.6's fixed templates.
pub fn suggested_action(task: Task) -> &'static str {
    match task {
        Task::Lint => "fix lint errors",
        Task::Typecheck => "fix type errors",
        Task::Test => "fix failing tests, check stack traces",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_typescript_error_lines() {
        let stderr = "src/index.ts:10:5 - error TS2322: Type mismatch\nnote: see docs\n";
        let errors = extract_key_errors(stderr);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("error TS2322"));
    }

    #[test]
    fn falls_back_to_last_lines_when_no_pattern_matches() {
        let stderr = "line one\nline two\nline three\n";
        let errors = extract_key_errors(stderr);
        assert_eq!(errors, vec!["line one", "line two", "line three"]);
    }

    #[test]
    fn suspected_files_excludes_node_modules() {
        let stderr = "src/app.ts:12 boom\nnode_modules/pkg/index.js:3 noise\n";
        let files = extract_suspected_files(stderr);
        assert_eq!(files, vec!["src/app.ts".to_string()]);
    }

    #[test]
    fn suggested_actions_match_fixed_templates() {
        assert_eq!(suggested_action(Task::Lint), "fix lint errors");
        assert_eq!(suggested_action(Task::Test), "fix failing tests, check stack traces");
    }
}
