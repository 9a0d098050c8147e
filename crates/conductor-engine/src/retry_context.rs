use std::path::Path;
use std::sync::OnceLock;

use conductor_errors::{OrchestratorError, PatchErrorDetails, PatchErrorEntry};
use regex::Regex;
use sha2::{Digest, Sha256};

const MAX_ERRORS: usize = 6;
const MAX_HUNKS: usize = 3;
const MAX_BLOCK_BYTES: usize = 6 * 1024;
const WINDOW_LINES: usize = 20;
const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Builds the block prepended to the next step's user message after a
/// patch-apply failure, spec.md §4.7: up to 6 normalized errors, up to 3
/// failed-hunk ±20-line windows, the whole block capped at 6 KiB with an
/// explicit truncation marker. Falls back to stderr pattern hints when the
/// patch tool reported no structured errors.
pub fn build_patch_retry_context(details: &PatchErrorDetails, repo_root: &Path) -> String {
    let block = if details.errors.is_empty() {
        stderr_pattern_hints(&details.stderr)
    } else {
        let mut block = String::from("Patch application failed with the following errors:\n");
        for entry in details.errors.iter().take(MAX_ERRORS) {
            block.push_str(&format_entry(entry));
            block.push('\n');
        }

        let mut hunks_shown = 0;
        for entry in &details.errors {
            if hunks_shown >= MAX_HUNKS {
                break;
            }
            let (Some(file), Some(line)) = (&entry.file, entry.line) else {
                continue;
            };
            if let Some(window) = read_window(repo_root, file, line) {
                block.push_str(&format!("\n--- {file} around line {line} ---\n{window}\n"));
                hunks_shown += 1;
            }
        }
        block
    };

    truncate_block(block)
}

/// A stable, bounded fingerprint for a patch-apply failure, used to detect
/// whether a retry hit the same error again rather than comparing the full
/// (and potentially huge) error text directly.
pub fn apply_failure_fingerprint(error: &OrchestratorError) -> String {
    let mut hasher = Sha256::new();
    hasher.update(error.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn format_entry(entry: &PatchErrorEntry) -> String {
    let mut line = format!("- [{}] {}", entry.kind, entry.message);
    if let Some(file) = &entry.file {
        line.push_str(&format!(" ({file}"));
        if let Some(number) = entry.line {
            line.push_str(&format!(":{number}"));
        }
        line.push(')');
    }
    if let Some(suggestion) = &entry.suggestion {
        line.push_str(&format!(" — suggestion: {suggestion}"));
    }
    line
}

fn read_window(repo_root: &Path, file: &str, line: u32) -> Option<String> {
    let contents = std::fs::read_to_string(repo_root.join(file)).ok()?;
    let lines: Vec<&str> = contents.lines().collect();
    let center = line.saturating_sub(1) as usize;
    let start = center.saturating_sub(WINDOW_LINES);
    let end = (center + WINDOW_LINES + 1).min(lines.len());
    if start >= end {
        return None;
    }
    Some(lines[start..end].join("\n"))
}

fn key_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(Error:|error TS|^\s*at |FAIL|FAILED)").expect("static regex"))
}

fn stderr_pattern_hints(stderr: &str) -> String {
    let pattern = key_line_pattern();
    let hints: Vec<&str> = stderr.lines().filter(|line| pattern.is_match(line)).take(10).collect();
    if hints.is_empty() {
        let mut tail: Vec<&str> = stderr.lines().rev().filter(|l| !l.trim().is_empty()).take(5).collect();
        tail.reverse();
        format!(
            "Patch tool reported no structured errors; stderr tail:\n{}",
            tail.join("\n")
        )
    } else {
        format!(
            "Patch tool reported no structured errors; matching lines:\n{}",
            hints.join("\n")
        )
    }
}

fn truncate_block(block: String) -> String {
    if block.len() <= MAX_BLOCK_BYTES {
        return block;
    }
    let mut cut = MAX_BLOCK_BYTES.saturating_sub(TRUNCATION_MARKER.len());
    while cut > 0 && !block.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = block[..cut].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_errors::PatchErrorType;

    fn entry(kind: &str, file: Option<&str>, line: Option<u32>) -> PatchErrorEntry {
        PatchErrorEntry {
            kind: kind.into(),
            file: file.map(String::from),
            line,
            message: format!("{kind} failed"),
            suggestion: None,
        }
    }

    #[test]
    fn structured_errors_are_numbered_and_windowed() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("lib.rs");
        let contents: String = (1..=60).map(|n| format!("line {n}\n")).collect();
        std::fs::write(&file_path, contents).unwrap();

        let details = PatchErrorDetails {
            errors: vec![entry("context_mismatch", Some("lib.rs"), Some(30))],
            stderr: String::new(),
        };

        let block = build_patch_retry_context(&details, dir.path());
        assert!(block.contains("context_mismatch"));
        assert!(block.contains("--- lib.rs around line 30 ---"));
        assert!(block.contains("line 30"));
        assert!(block.contains("line 10"));
        assert!(!block.contains("line 5\n"));
    }

    #[test]
    fn more_than_six_errors_truncated_to_six_entries() {
        let errors: Vec<PatchErrorEntry> = (0..10).map(|i| entry(&format!("kind{i}"), None, None)).collect();
        let details = PatchErrorDetails {
            errors,
            stderr: String::new(),
        };
        let block = build_patch_retry_context(&details, Path::new("."));
        assert_eq!(block.matches("- [kind").count(), 6);
    }

    #[test]
    fn no_structured_errors_falls_back_to_stderr_hints() {
        let details = PatchErrorDetails {
            errors: Vec::new(),
            stderr: "some noise\nError: context line 5 did not match\nmore noise".into(),
        };
        let block = build_patch_retry_context(&details, Path::new("."));
        assert!(block.contains("Error: context line 5 did not match"));
        assert!(!block.contains("some noise"));
    }

    #[test]
    fn long_block_is_truncated_with_marker() {
        let padded_errors: Vec<PatchErrorEntry> = (0..6)
            .map(|i| {
                let mut e = entry(&format!("kind{i}"), None, None);
                e.message = "x".repeat(2000);
                e
            })
            .collect();
        let details = PatchErrorDetails {
            errors: padded_errors,
            stderr: String::new(),
        };
        let block = build_patch_retry_context(&details, Path::new("."));
        assert!(block.len() <= MAX_BLOCK_BYTES);
        assert!(block.ends_with(TRUNCATION_MARKER));
    }

    #[allow(dead_code)]
    fn assert_type(_: PatchErrorType) {}

    #[test]
    fn fingerprint_is_stable_and_distinguishes_messages() {
        let a = OrchestratorError::config("boom");
        let b = OrchestratorError::config("boom");
        let c = OrchestratorError::config("different");
        assert_eq!(apply_failure_fingerprint(&a), apply_failure_fingerprint(&b));
        assert_ne!(apply_failure_fingerprint(&a), apply_failure_fingerprint(&c));
    }
}
