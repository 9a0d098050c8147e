use async_trait::async_trait;
use conductor_errors::OrchestratorError;
use serde::{Deserialize, Serialize};

use crate::profile::Task;

/// The repo's default commands per task, as reported by an external
/// toolchain detector (spec.md §6 "Toolchain detector (consumed)").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    pub package_manager: String,
    pub uses_turbo: bool,
    pub test_cmd: Option<Vec<String>>,
    pub lint_cmd: Option<Vec<String>>,
    pub typecheck_cmd: Option<Vec<String>>,
}

impl ToolchainInfo {
    pub fn command_for(&self, task: Task) -> Option<Vec<String>> {
        match task {
            Task::Lint => self.lint_cmd.clone(),
            Task::Typecheck => self.typecheck_cmd.clone(),
            Task::Test => self.test_cmd.clone(),
        }
    }
}

#[async_trait]
pub trait ToolchainDetector: Send + Sync {
    async fn detect(&self, repo_root: &str) -> Result<ToolchainInfo, OrchestratorError>;
}

/// Narrows a root command to one scoped over the packages touched by the
/// current step, when the profile's test scope is `targeted`.
#[async_trait]
pub trait TargetingManager: Send + Sync {
    async fn targeted_command(
        &self,
        task: Task,
        touched_files: &[String],
    ) -> Result<Option<Vec<String>>, OrchestratorError>;
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub title: String,
    pub content: String,
    pub updated_at: String,
    pub stale: bool,
}

/// `find(queries[], limit) -> entry[][]` (spec.md §6 "Memory query (consumed)").
#[async_trait]
pub trait ProceduralMemory: Send + Sync {
    async fn find(&self, queries: &[String], limit: usize) -> Result<Vec<Vec<MemoryEntry>>, OrchestratorError>;
}

/// Rejects commands the caller hasn't allowlisted, independent of whether
/// the command source was memory, detection, or a custom step.
pub trait CommandPolicy: Send + Sync {
    fn allows(&self, command: &[String]) -> bool;
}

/// Allows every command. The default when no caller-supplied policy narrows
/// what may run — sandboxing itself is out of scope (spec.md §1 Non-goals);
/// this trait only gates which command strings are considered at all.
pub struct AllowAllPolicy;

impl CommandPolicy for AllowAllPolicy {
    fn allows(&self, _command: &[String]) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub truncated: bool,
}

/// Executes a command under whatever sandboxing/resource policy the caller
/// enforces (spec.md §6 "Safe-Command Runner"). `conductor-verify` defines
/// the contract only; it never shells out on its own.
#[async_trait]
pub trait SafeCommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &[String],
        classification: &str,
        timeout: std::time::Duration,
    ) -> Result<CommandExecution, OrchestratorError>;
}
