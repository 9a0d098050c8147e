use std::path::PathBuf;

use async_trait::async_trait;
use conductor_errors::OrchestratorError;
use conductor_types::{ProviderRequest, StepExecutionState};

/// One unit of work from the external planner, spec.md §1 "planner LLM
/// prompting templates" (out of scope here — only the interface lives in
/// this crate).
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub index: u32,
    pub instruction: String,
}

/// Builds the fused context window for one step — spec.md §4.7 "Build
/// fused context for the step (external context builder)". `retry_context`
/// carries the patch-tool or verification retry block to prepend when this
/// is a retry of a step that already failed once.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build(
        &self,
        step: &PlannedStep,
        state: &StepExecutionState,
        retry_context: Option<&str>,
    ) -> Result<ProviderRequest, OrchestratorError>;
}

/// What applying a diff actually changed, needed to scope the following
/// verification pass to touched files.
#[derive(Debug, Clone)]
pub struct PatchApplyOutcome {
    pub touched_files: Vec<PathBuf>,
}

/// The external patch-application tool, spec.md §1 "the engine invokes it
/// and interprets its structured error report, but does not implement
/// three-way merge". Failures surface as `OrchestratorError::Patch` so the
/// engine can read `details` for the retry-context builder.
#[async_trait]
pub trait PatchTool: Send + Sync {
    async fn apply(&self, diff_text: &str, repo_root: &str) -> Result<PatchApplyOutcome, OrchestratorError>;
}

/// The external planner, spec.md §1 "the planner LLM prompting templates"
/// (out of scope — only the interface lives here). `replan` is invoked on
/// escalation, spec.md §4.7 "escalate (planner re-entry)".
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, goal: &str) -> Result<Vec<PlannedStep>, OrchestratorError>;

    async fn replan(
        &self,
        goal: &str,
        state: &StepExecutionState,
        reason: &str,
    ) -> Result<Vec<PlannedStep>, OrchestratorError>;
}
