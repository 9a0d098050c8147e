use std::sync::OnceLock;

use regex::Regex;

/// Redaction applied before subprocess output chunks are forwarded to the
/// event sink (spec.md §4.1: captured output is "optionally forwarded to the
/// event sink (redacted)"). Keeps the trace readable for audit/debugging
/// while keeping obvious secrets out of `trace.jsonl`.
pub fn redact(text: &str) -> String {
    let patterns = patterns();
    let mut out = text.to_string();
    for (pattern, replacement) in patterns {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    out
}

fn patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)(sk-[a-z0-9]{20,})").unwrap(),
                "sk-(redacted)",
            ),
            (
                Regex::new(r"(?i)(Bearer\s+)[A-Za-z0-9._\-]{10,}").unwrap(),
                "Bearer (redacted)",
            ),
            (
                Regex::new(r#"(?i)("?(?:api[_-]?key|token|secret|password)"?\s*[:=]\s*"?)[^\s"',]{6,}"#).unwrap(),
                "$1(redacted)",
            ),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_openai_style_api_key() {
        let input = "Authorization: sk-abcdefghijklmnopqrstuvwxyz0123456789";
        let out = redact(input);
        assert!(out.contains("sk-(redacted)"));
        assert!(!out.contains("abcdefghijklmnop"));
    }

    #[test]
    fn redacts_bearer_token() {
        let input = "curl -H 'Authorization: Bearer abcd1234efgh5678'";
        let out = redact(input);
        assert!(out.contains("Bearer (redacted)"));
    }

    #[test]
    fn redacts_key_value_secret() {
        let input = r#"{"api_key": "super-secret-value-123"}"#;
        let out = redact(input);
        assert!(out.contains("(redacted)"));
        assert!(!out.contains("super-secret-value-123"));
    }

    #[test]
    fn leaves_ordinary_text_untouched() {
        let input = "running tests... 12 passed, 0 failed";
        assert_eq!(redact(input), input);
    }
}
