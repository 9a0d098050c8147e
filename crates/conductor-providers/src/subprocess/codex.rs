use std::time::Duration;

use conductor_process::EnvPolicy;
use regex::Regex;

use super::{IdlePromptProfile, VendorCallbacks};

/// Argv/idle-profile for a Codex-style CLI: `--json` streams newline-
/// delimited thread/turn/item events, so a Codex-mode driver runs in
/// structured mode and never needs the diff-enforcement prompt injection.
/// Grounded on `atomize-hq-codex-wrapper`'s `codex` crate invocation shape.
pub struct CodexCallbacks {
    pub binary: String,
    pub model: Option<String>,
    pub json_events: bool,
}

impl CodexCallbacks {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: None,
            json_events: true,
        }
    }
}

impl VendorCallbacks for CodexCallbacks {
    fn binary(&self) -> &str {
        &self.binary
    }

    fn build_args(&self, json_mode: bool, caller_args: &[String]) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        args.extend(caller_args.iter().cloned());
        if json_mode && self.json_events {
            args.push("--json".to_string());
        }
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }

    fn managed_flags(&self) -> &[&str] {
        &["--json", "--model"]
    }

    fn idle_prompt_profile(&self) -> IdlePromptProfile {
        // Codex's exec mode prints a final `tokens used:` summary line once
        // the turn is complete; waiting for that line is more reliable than
        // a generic prompt-ending heuristic.
        IdlePromptProfile {
            name: "codex",
            pattern: Regex::new(r"(?i)tokens used:").expect("static regex"),
            silence: Duration::from_secs(2),
        }
    }

    fn env_policy(&self) -> EnvPolicy {
        EnvPolicy::new().allow("CODEX_HOME").allow("OPENAI_API_KEY")
    }

    fn supports_json_mode(&self) -> bool {
        self.json_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_adds_json_flag() {
        let callbacks = CodexCallbacks::new("codex");
        let args = callbacks.build_args(true, &[]);
        assert!(args.contains(&"--json".to_string()));
    }

    #[test]
    fn text_mode_omits_json_flag() {
        let callbacks = CodexCallbacks::new("codex");
        let args = callbacks.build_args(false, &[]);
        assert!(!args.contains(&"--json".to_string()));
    }

    #[test]
    fn model_override_is_appended() {
        let mut callbacks = CodexCallbacks::new("codex");
        callbacks.model = Some("o4-mini".into());
        let args = callbacks.build_args(true, &[]);
        assert_eq!(args.last().map(String::as_str), Some("o4-mini"));
    }

    #[test]
    fn caller_args_are_inserted_after_exec() {
        let callbacks = CodexCallbacks::new("codex");
        let args = callbacks.build_args(false, &["--cd".to_string(), "/tmp".to_string()]);
        assert_eq!(args, vec!["exec", "--cd", "/tmp"]);
    }
}
