use std::time::Duration;

use conductor_process::EnvPolicy;
use regex::Regex;

use super::{IdlePromptProfile, VendorCallbacks};

/// Argv/idle-profile for a Claude-Code-style CLI, which never runs in a
/// structured JSON mode for this workspace's purposes and instead emits a
/// confirmation-style prompt ending in `❯` (or plain `>` when colors are
/// disabled) once it's waiting on the next turn. Grounded on
/// `atomize-hq-codex-wrapper`'s `claude_code` crate.
pub struct ClaudeCodeCallbacks {
    pub binary: String,
    pub allowed_tools: Vec<String>,
}

impl ClaudeCodeCallbacks {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            allowed_tools: Vec::new(),
        }
    }
}

impl VendorCallbacks for ClaudeCodeCallbacks {
    fn binary(&self) -> &str {
        &self.binary
    }

    fn build_args(&self, _json_mode: bool, caller_args: &[String]) -> Vec<String> {
        let mut args = vec!["--print".to_string()];
        args.extend(caller_args.iter().cloned());
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.allowed_tools.join(","));
        }
        args
    }

    fn managed_flags(&self) -> &[&str] {
        &["--print", "--allowedTools"]
    }

    fn idle_prompt_profile(&self) -> IdlePromptProfile {
        IdlePromptProfile {
            name: "claude-code",
            pattern: Regex::new(r"(❯|>)\s*$").expect("static regex"),
            silence: Duration::from_millis(600),
        }
    }

    fn env_policy(&self) -> EnvPolicy {
        EnvPolicy::new().allow("ANTHROPIC_API_KEY").allow("CLAUDE_CONFIG_DIR")
    }

    fn supports_json_mode(&self) -> bool {
        false
    }

    fn postprocess(&self, captured: String) -> String {
        // Strip the confirmation-prompt glyph this profile waits on so it
        // doesn't pollute diff/usage extraction downstream.
        captured.trim_end_matches(['❯', '>', ' ', '\n']).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_flag_always_present() {
        let callbacks = ClaudeCodeCallbacks::new("claude");
        assert!(callbacks.build_args(false, &[]).contains(&"--print".to_string()));
    }

    #[test]
    fn allowed_tools_joined_with_commas() {
        let mut callbacks = ClaudeCodeCallbacks::new("claude");
        callbacks.allowed_tools = vec!["Edit".into(), "Bash".into()];
        let args = callbacks.build_args(false, &[]);
        assert_eq!(args.last().map(String::as_str), Some("Edit,Bash"));
    }

    #[test]
    fn postprocess_strips_trailing_prompt_glyph() {
        let callbacks = ClaudeCodeCallbacks::new("claude");
        let stripped = callbacks.postprocess("done with the change\n❯ ".to_string());
        assert_eq!(stripped, "done with the change");
    }
}
