use conductor_types::Usage;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn input_output_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)input\s*=\s*(\d+)\s*,\s*output\s*=\s*(\d+)").expect("static regex")
    })
}

fn prose_tokens_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*input tokens?,\s*(\d+)\s*output tokens?").expect("static regex")
    })
}

fn in_out_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*in,\s*(\d+)\s*out").expect("static regex"))
}

fn prompt_completion_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)prompt_tokens:\s*(\d+)\s*,\s*completion_tokens:\s*(\d+)")
            .expect("static regex")
    })
}

fn usage_from_object(obj: &serde_json::Map<String, Value>) -> Option<Usage> {
    let as_u64 = |key: &str| obj.get(key).and_then(Value::as_u64);

    let (input, output) = if let (Some(i), Some(o)) = (as_u64("input_tokens"), as_u64("output_tokens")) {
        (i, o)
    } else if let (Some(i), Some(o)) = (as_u64("inputTokens"), as_u64("outputTokens")) {
        (i, o)
    } else if let (Some(i), Some(o)) = (as_u64("prompt_tokens"), as_u64("completion_tokens")) {
        (i, o)
    } else {
        return None;
    };

    let total = as_u64("total_tokens").or_else(|| as_u64("totalTokens"));
    Some(Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: total,
    })
}

fn from_structured_json(raw: &str) -> Option<Usage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    for key in ["usage", "stats"] {
        if let Some(obj) = value.get(key).and_then(Value::as_object) {
            if let Some(usage) = usage_from_object(obj) {
                return Some(usage);
            }
        }
    }
    // The whole payload may itself be the usage object.
    value.as_object().and_then(usage_from_object)
}

fn from_free_text(raw: &str) -> Option<Usage> {
    for pattern in [
        input_output_pattern(),
        prose_tokens_pattern(),
        in_out_pattern(),
        prompt_completion_pattern(),
    ] {
        if let Some(caps) = pattern.captures(raw) {
            let input: u64 = caps[1].parse().ok()?;
            let output: u64 = caps[2].parse().ok()?;
            return Some(Usage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: None,
            });
        }
    }
    None
}

/// Extracts token usage from vendor output, spec.md §4.2. Returns `None`
/// when both input and output token counts would be zero.
pub fn extract_usage(raw: &str) -> Option<Usage> {
    let usage = from_structured_json(raw).or_else(|| from_free_text(raw))?;
    if usage.input_tokens == 0 && usage.output_tokens == 0 {
        None
    } else {
        Some(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_snake_case_usage_field() {
        let raw = r#"{"content":"hi","usage":{"input_tokens":10,"output_tokens":5,"total_tokens":15}}"#;
        let usage = extract_usage(raw).expect("usage should be found");
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, Some(15));
    }

    #[test]
    fn reads_openai_style_prompt_completion_tokens() {
        let raw = r#"{"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let usage = extract_usage(raw).expect("usage should be found");
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, None);
    }

    #[test]
    fn falls_back_to_free_text_input_output() {
        let usage = extract_usage("done. input=42, output=7").expect("usage should be found");
        assert_eq!(usage.input_tokens, 42);
        assert_eq!(usage.output_tokens, 7);
    }

    #[test]
    fn falls_back_to_in_out_shorthand() {
        let usage = extract_usage("cost: 3 in, 1 out").expect("usage should be found");
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 1);
    }

    #[test]
    fn zero_both_is_absent() {
        let raw = r#"{"usage":{"input_tokens":0,"output_tokens":0}}"#;
        assert!(extract_usage(raw).is_none());
    }

    #[test]
    fn no_usage_information_is_absent() {
        assert!(extract_usage("just a normal reply").is_none());
    }
}
