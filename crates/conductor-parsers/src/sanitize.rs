use regex::Regex;
use std::sync::OnceLock;

fn ansi_csi_sgr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static ANSI regex"))
}

/// Normalizes CRLF/CR to LF and strips ANSI CSI SGR sequences (`ESC [ … m`).
/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(input: &str) -> String {
    let normalized = normalize_newlines(input);
    ansi_csi_sgr().replace_all(&normalized, "").into_owned()
}

pub fn normalize_newlines(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}
