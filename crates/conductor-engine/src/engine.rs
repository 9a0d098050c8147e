use std::path::{Path, PathBuf};
use std::sync::Arc;

use conductor_errors::OrchestratorError;
use conductor_providers::ProviderAdapter;
use conductor_retry::{call_with_retry, AbortSignal, RetryContext};
use conductor_types::{
    Event, EventKind, EventPayload, EventSink, RunId, RunStatus, StepExecutionState,
    VerificationMode, VerificationReport,
};
use conductor_verify::VerificationRunner;
use tracing::{debug, warn};

use crate::collaborators::{ContextBuilder, PatchTool, PlannedStep, Planner};
use crate::config::RunEngineConfig;
use crate::decision::{decide_after_failure, decide_on_escalation, Decision};
use crate::noop::is_diagnostic_step;
use crate::retry_context::{apply_failure_fingerprint, build_patch_retry_context};

/// Outcome of driving one run to completion, spec.md §4.7 "Emit
/// `RunFinished` with `{status, summary}` on every exit path".
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: String,
    pub state: StepExecutionState,
}

/// Ties the plan/step/verify/decide state machine together for one run.
/// Every collaborator the engine doesn't own outright (planner, context
/// builder, patch tool, provider adapter, verification runner) is injected,
/// per spec.md §1's external-collaborator boundary.
pub struct RunEngine<'a> {
    pub run_id: RunId,
    pub repo_root: String,
    pub sink: Arc<dyn EventSink>,
    pub abort: AbortSignal,
    pub provider: Arc<dyn ProviderAdapter>,
    pub provider_id: String,
    pub context_builder: &'a dyn ContextBuilder,
    pub patch_tool: &'a dyn PatchTool,
    pub planner: &'a dyn Planner,
    pub verification_runner: VerificationRunner<'a>,
    pub config: RunEngineConfig,
}

impl<'a> RunEngine<'a> {
    /// Runs the full state machine for `goal`. Never propagates an error:
    /// every failure path is converted into a `RunFinished { Failure, .. }`
    /// report, matching spec.md §4.7's "every exit path, including crashes".
    pub async fn run(&self, goal: &str) -> RunReport {
        self.emit(
            EventKind::RunStarted,
            EventPayload::RunStarted {
                task_id: self.run_id.to_string(),
                goal: goal.to_string(),
            },
        );

        let mut state = StepExecutionState::new();

        let mut steps = match self.planner.plan(goal).await {
            Ok(steps) => steps,
            Err(error) => return self.finish(state, RunStatus::Failure, format!("planning failed: {error}")),
        };

        let mut step_index = 0usize;
        let mut retry_context: Option<String> = None;
        let mut last_failure_signature: Option<String> = None;
        let mut escalations_used = 0u32;

        loop {
            if step_index >= steps.len() {
                let summary = format!("completed {} step(s)", state.steps_completed);
                return self.finish(state, RunStatus::Success, summary);
            }
            if state.steps_completed >= self.config.max_steps {
                return self.finish(state, RunStatus::Failure, "exceeded max step budget".to_string());
            }

            let step = steps[step_index].clone();

            let request = match self
                .context_builder
                .build(&step, &state, retry_context.as_deref())
                .await
            {
                Ok(request) => request,
                Err(error) => return self.finish(state, RunStatus::Failure, format!("context build failed: {error}")),
            };

            let response = match self.call_provider(&request).await {
                Ok(response) => response,
                Err(error) => return self.finish(state, RunStatus::Failure, format!("provider call failed: {error}")),
            };

            let diff = response.text.as_deref().and_then(conductor_parsers::extract_diff);

            let Some(diff) = diff else {
                if is_diagnostic_step(&step.instruction) {
                    state.record_step_completed();
                    state.record_valid_diff();
                    step_index += 1;
                    retry_context = None;
                    continue;
                }

                state.record_invalid_diff();
                match decide_after_failure(&state, self.config.thresholds, false) {
                    Decision::Repair => {
                        retry_context = Some(
                            "The previous response did not include a diff. Respond with the \
                             full unified diff wrapped in <BEGIN_DIFF>/<END_DIFF> markers."
                                .to_string(),
                        );
                        continue;
                    }
                    Decision::Escalate => {
                        match self
                            .escalate(goal, &state, "repeated invalid diff", &mut steps, &mut step_index, &mut escalations_used)
                            .await
                        {
                            Some(report) => return report,
                            None => {
                                retry_context = None;
                                continue;
                            }
                        }
                    }
                    _ => return self.finish(state, RunStatus::Failure, "terminated after repeated invalid diffs".to_string()),
                }
            };

            match self.patch_tool.apply(&diff.diff_text, &self.repo_root).await {
                Ok(outcome) => {
                    let patch_path = PathBuf::from(format!(
                        "patches/{:03}-step.patch",
                        state.applied_patch_paths.len() + 1
                    ));
                    state.record_patch_applied(patch_path, outcome.touched_files);
                    state.record_valid_diff();

                    let touched: Vec<String> = state
                        .touched_files
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect();

                    self.emit(
                        EventKind::VerificationStarted,
                        EventPayload::VerificationStarted {
                            mode: VerificationMode::Auto,
                        },
                    );
                    let report = match self
                        .verification_runner
                        .run(&self.config.verification_profile, &touched)
                        .await
                    {
                        Ok(report) => report,
                        Err(error) => {
                            return self.finish(state, RunStatus::Failure, format!("verification failed to run: {error}"))
                        }
                    };
                    self.emit(
                        EventKind::VerificationFinished,
                        EventPayload::VerificationFinished {
                            passed: report.passed,
                            failed_checks: report.failed_checks().iter().map(|c| c.name.clone()).collect(),
                        },
                    );

                    if report.passed {
                        state.record_step_completed();
                        step_index += 1;
                        retry_context = None;
                        last_failure_signature = None;
                        continue;
                    }

                    let repeated = report.failure_signature.is_some() && report.failure_signature == last_failure_signature;
                    last_failure_signature = report.failure_signature.clone();

                    match decide_after_failure(&state, self.config.thresholds, repeated) {
                        Decision::Repair => {
                            retry_context = Some(render_verification_retry_context(&report));
                            continue;
                        }
                        Decision::Escalate => {
                            match self
                                .escalate(
                                    goal,
                                    &state,
                                    "verification kept failing",
                                    &mut steps,
                                    &mut step_index,
                                    &mut escalations_used,
                                )
                                .await
                            {
                                Some(result) => return result,
                                None => {
                                    retry_context = None;
                                    last_failure_signature = None;
                                    continue;
                                }
                            }
                        }
                        _ => {
                            return self.finish(
                                state,
                                RunStatus::Failure,
                                "terminated after repeated verification failures".to_string(),
                            )
                        }
                    }
                }
                Err(error) => {
                    let fingerprint = apply_failure_fingerprint(&error);
                    let repeated = state.last_apply_error_fingerprint.as_deref() == Some(fingerprint.as_str());
                    state.record_apply_failure(fingerprint.clone());

                    let retry_block = if let OrchestratorError::Patch { details: Some(details), .. } = &error {
                        build_patch_retry_context(details, Path::new(&self.repo_root))
                    } else {
                        format!("Patch application failed: {error}")
                    };

                    match decide_after_failure(&state, self.config.thresholds, repeated) {
                        Decision::Repair => {
                            retry_context = Some(retry_block);
                            continue;
                        }
                        Decision::Escalate => {
                            match self
                                .escalate(
                                    goal,
                                    &state,
                                    "repeated patch apply failure",
                                    &mut steps,
                                    &mut step_index,
                                    &mut escalations_used,
                                )
                                .await
                            {
                                Some(result) => return result,
                                None => {
                                    retry_context = None;
                                    continue;
                                }
                            }
                        }
                        _ => {
                            return self.finish(
                                state,
                                RunStatus::Failure,
                                "terminated after repeated patch apply failures".to_string(),
                            )
                        }
                    }
                }
            }
        }
    }

    async fn call_provider(
        &self,
        request: &conductor_types::ProviderRequest,
    ) -> Result<conductor_types::ProviderResponse, OrchestratorError> {
        let ctx = RetryContext {
            run_id: self.run_id.clone(),
            provider: self.provider_id.clone(),
            model: None,
            sink: self.sink.clone(),
            abort: self.abort.clone(),
            per_call_timeout: self.config.per_call_timeout,
        };
        let provider = Arc::clone(&self.provider);
        call_with_retry(&ctx, &self.config.retry_schedule, |_attempt| {
            let provider = Arc::clone(&provider);
            let request = request.clone();
            async move { provider.generate(&request).await }
        })
        .await
    }

    /// Consults the escalation budget, then either re-plans from the
    /// current state (replacing the remaining step queue) or hands back a
    /// terminal `RunReport` when the budget is exhausted or replanning
    /// itself fails.
    async fn escalate(
        &self,
        goal: &str,
        state: &StepExecutionState,
        reason: &str,
        steps: &mut Vec<PlannedStep>,
        step_index: &mut usize,
        escalations_used: &mut u32,
    ) -> Option<RunReport> {
        if decide_on_escalation(*escalations_used, self.config.max_escalations) == Decision::Terminate {
            return Some(self.finish(
                state.clone(),
                RunStatus::Failure,
                format!("terminated: {reason}, escalation budget exhausted"),
            ));
        }
        *escalations_used += 1;
        warn!(run_id = %self.run_id, reason, "escalating: re-entering planner");
        match self.planner.replan(goal, state, reason).await {
            Ok(new_steps) => {
                debug!(run_id = %self.run_id, steps = new_steps.len(), "replan produced new steps");
                *steps = new_steps;
                *step_index = 0;
                None
            }
            Err(error) => Some(self.finish(state.clone(), RunStatus::Failure, format!("replan failed: {error}"))),
        }
    }

    fn finish(&self, state: StepExecutionState, status: RunStatus, summary: String) -> RunReport {
        debug!(run_id = %self.run_id, ?status, %summary, "run finished");
        self.emit(
            EventKind::RunFinished,
            EventPayload::RunFinished {
                status,
                summary: summary.clone(),
            },
        );
        RunReport { status, summary, state }
    }

    fn emit(&self, kind: EventKind, payload: EventPayload) {
        self.sink
            .emit(Event::new(self.run_id.clone(), kind, payload, chrono::Utc::now()));
    }
}

fn render_verification_retry_context(report: &VerificationReport) -> String {
    match &report.failure_summary {
        Some(summary) => format!(
            "Verification failed ({}). Suspected files: {}. Suggested actions: {}.",
            summary.failed_checks.join(", "),
            if summary.suspected_files.is_empty() {
                "none identified".to_string()
            } else {
                summary.suspected_files.join(", ")
            },
            summary.suggested_next_actions.join("; ")
        ),
        None => "Verification failed; no structured failure summary was available.".to_string(),
    }
}
