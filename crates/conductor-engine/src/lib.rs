#![forbid(unsafe_code)]
//! Run engine: the plan/step/verify/decide state machine that drives one
//! run to completion, spec.md §4.7.

mod collaborators;
mod config;
mod decision;
mod engine;
mod noop;
mod retry_context;

pub use collaborators::{ContextBuilder, PatchApplyOutcome, PatchTool, PlannedStep, Planner};
pub use config::RunEngineConfig;
pub use decision::{decide_after_failure, decide_on_escalation, Decision, EscalationThresholds};
pub use engine::{RunEngine, RunReport};
pub use noop::is_diagnostic_step;
pub use retry_context::{apply_failure_fingerprint, build_patch_retry_context};
