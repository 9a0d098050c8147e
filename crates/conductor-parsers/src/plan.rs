use regex::Regex;
use std::sync::OnceLock;

use crate::sanitize::sanitize;

fn numbered_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(?:\.\d+)*[.)]?\s+(.*)$").expect("static numbered regex"))
}

fn bullet_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*]\s+(.*)$").expect("static bullet regex"))
}

/// `{steps[], 0.8}` if any step was found, per spec.md §4.2 plan extraction.
pub fn extract_plan(raw: &str) -> Option<(Vec<String>, f64)> {
    let text = sanitize(raw);
    let mut steps = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(caps) = numbered_line().captures(trimmed) {
            steps.push(caps[1].trim().to_string());
        } else if let Some(caps) = bullet_line().captures(trimmed) {
            steps.push(caps[1].trim().to_string());
        }
    }
    if steps.is_empty() {
        None
    } else {
        Some((steps, 0.8))
    }
}
