use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Lint,
    Typecheck,
    Test,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Lint => "lint",
            Task::Typecheck => "typecheck",
            Task::Test => "test",
        }
    }

    /// `How to run {task}` — the memory-query title used to look up a
    /// remembered command for this task.
    pub fn memory_title(&self) -> String {
        format!("How to run {}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestScope {
    Targeted,
    Full,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoConfig {
    pub enable_lint: bool,
    pub enable_typecheck: bool,
    pub enable_tests: bool,
    pub test_scope: TestScope,
    /// Caps how many of `enabled_tasks()`'s commands `run_auto` actually
    /// executes in one pass, in lint/typecheck/test order.
    pub max_commands_per_iteration: u32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            enable_lint: true,
            enable_typecheck: true,
            enable_tests: true,
            test_scope: TestScope::Targeted,
            max_commands_per_iteration: 8,
        }
    }
}

impl AutoConfig {
    /// The tasks this config enables, in a fixed order (lint, typecheck, test).
    pub fn enabled_tasks(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        if self.enable_lint {
            tasks.push(Task::Lint);
        }
        if self.enable_typecheck {
            tasks.push(Task::Typecheck);
        }
        if self.enable_tests {
            tasks.push(Task::Test);
        }
        tasks
    }
}

/// A single step in `custom` mode: an already-fully-specified command.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CustomStep {
    pub name: String,
    pub command: Vec<String>,
    pub timeout_ms: u64,
}

impl CustomStep {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Auto,
    Custom,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct VerificationProfile {
    pub enabled: bool,
    pub mode: ProfileMode,
    pub steps: Vec<CustomStep>,
    pub auto: AutoConfig,
}

impl VerificationProfile {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: ProfileMode::Auto,
            steps: Vec::new(),
            auto: AutoConfig::default(),
        }
    }
}

impl Default for VerificationProfile {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ProfileMode::Auto,
            steps: Vec::new(),
            auto: AutoConfig::default(),
        }
    }
}
