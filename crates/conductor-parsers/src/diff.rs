use conductor_types::DiffParseResult;
use regex::Regex;
use std::sync::OnceLock;

use crate::sanitize::sanitize;

fn begin_end_markers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<BEGIN_DIFF>(.*?)<END_DIFF>").expect("static marker regex")
    })
}

fn fenced_diff_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```diff\n(.*?)```").expect("static fence regex"))
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^@@ .*? @@").expect("static hunk regex"))
}

fn has_hunk_header(text: &str) -> bool {
    hunk_header().is_match(text)
}

fn has_file_header(text: &str) -> bool {
    if text.lines().any(|l| l.starts_with("diff --git")) {
        return true;
    }
    let mut seen_minus = false;
    for line in text.lines() {
        if line.starts_with("--- ") {
            seen_minus = true;
        } else if seen_minus && line.starts_with("+++ ") {
            return true;
        }
    }
    false
}

fn is_diff_grammar_line(line: &str) -> bool {
    line.starts_with("diff --git")
        || line.starts_with("index ")
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || hunk_header().is_match(line)
        || line.starts_with('+')
        || line.starts_with('-')
        || line.starts_with(' ')
        || line.starts_with("\\ No newline")
}

/// Strategy 3: scan for the first line that could open a diff, then
/// accumulate while subsequent lines match diff grammar, stopping at the
/// first foreign line.
fn heuristic_scan(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|line| {
        line.starts_with("diff --git") || line.starts_with("--- a/")
    })?;

    // "--- a/" must be immediately followed by "+++ b/" to count as a start.
    if lines[start].starts_with("--- a/") {
        let next = lines.get(start + 1)?;
        if !next.starts_with("+++ b/") {
            return None;
        }
    }

    let mut collected = Vec::new();
    for line in &lines[start..] {
        if is_diff_grammar_line(line) {
            collected.push(*line);
        } else {
            break;
        }
    }
    if collected.is_empty() {
        None
    } else {
        Some(collected.join("\n"))
    }
}

/// Extracts a unified diff from free-form model output, trying the three
/// strategies in fixed priority order and returning the first that
/// validates (file header AND hunk header present).
pub fn extract_diff(raw: &str) -> Option<DiffParseResult> {
    let text = sanitize(raw);

    if let Some(caps) = begin_end_markers().captures(&text) {
        let inner = caps[1].trim();
        if has_file_header(inner) && has_hunk_header(inner) {
            return Some(DiffParseResult::new(inner.to_string(), 1.0));
        }
    }

    if let Some(caps) = fenced_diff_block().captures(&text) {
        let inner = caps[1].trim();
        if has_file_header(inner) && has_hunk_header(inner) {
            return Some(DiffParseResult::new(inner.to_string(), 0.9));
        }
    }

    if let Some(candidate) = heuristic_scan(&text) {
        if has_file_header(&candidate) && has_hunk_header(&candidate) {
            return Some(DiffParseResult::new(candidate, 0.7));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_markers_win_at_full_confidence() {
        let input = "[INFO] start\n<BEGIN_DIFF>\ndiff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n<END_DIFF>\n[INFO] end";
        let result = extract_diff(input).expect("diff should be found");
        assert_eq!(result.confidence, 1.0);
        assert!(result.diff_text.starts_with("diff --git a/f b/f"));
        assert!(!result.diff_text.contains("[INFO]"));
        assert!(!result.diff_text.contains("BEGIN_DIFF"));
    }

    #[test]
    fn fenced_block_used_when_no_markers() {
        let input = "here you go:\n```diff\ndiff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n```\nthanks";
        let result = extract_diff(input).expect("diff should be found");
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn heuristic_scan_stops_at_foreign_line() {
        let input = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\nthat's it, let me know if this works";
        let result = extract_diff(input).expect("diff should be found");
        assert_eq!(result.confidence, 0.7);
        assert!(!result.diff_text.contains("let me know"));
    }

    #[test]
    fn no_hunk_header_yields_no_result() {
        let input = "diff --git a/f b/f\n--- a/f\n+++ b/f\nno hunks here";
        assert!(extract_diff(input).is_none());
    }

    #[test]
    fn plain_prose_yields_no_result() {
        assert!(extract_diff("I looked at the code and it seems fine.").is_none());
    }
}
