use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use conductor_errors::OrchestratorError;
use conductor_types::{CheckResult, FailureSummary, VerificationReport};

use crate::external::{
    CommandExecution, CommandPolicy, ProceduralMemory, SafeCommandRunner, TargetingManager,
    ToolchainDetector,
};
use crate::profile::{ProfileMode, VerificationProfile};
use crate::selection::select_command;
use crate::signature::failure_signature;
use crate::summary::{digest_failure, suggested_action};

/// Ties command selection, execution, and summarization together for one
/// verification pass, scoped to the files touched by the current step
/// (spec.md §4.7 "Verify via the Verification Runner scoped to touched
/// files").
pub struct VerificationRunner<'a> {
    pub memory: &'a dyn ProceduralMemory,
    pub policy: &'a dyn CommandPolicy,
    pub detector: &'a dyn ToolchainDetector,
    pub targeting: &'a dyn TargetingManager,
    pub command_runner: &'a dyn SafeCommandRunner,
    pub repo_root: String,
    pub tool_logs_dir: PathBuf,
}

impl<'a> VerificationRunner<'a> {
    pub async fn run(
        &self,
        profile: &VerificationProfile,
        touched_files: &[String],
    ) -> Result<VerificationReport, OrchestratorError> {
        if !profile.enabled {
            return Ok(VerificationReport {
                passed: true,
                checks: Vec::new(),
                failure_signature: None,
                failure_summary: None,
                command_sources: BTreeMap::new(),
            });
        }

        match profile.mode {
            ProfileMode::Auto => self.run_auto(profile, touched_files).await,
            ProfileMode::Custom => self.run_custom(profile).await,
        }
    }

    async fn run_auto(
        &self,
        profile: &VerificationProfile,
        touched_files: &[String],
    ) -> Result<VerificationReport, OrchestratorError> {
        let mut checks = Vec::new();
        let mut sources = BTreeMap::new();
        let mut failed_executions: Vec<(String, CommandExecution)> = Vec::new();

        for task in profile
            .auto
            .enabled_tasks()
            .into_iter()
            .take(profile.auto.max_commands_per_iteration as usize)
        {
            let Some(selection) = select_command(
                task,
                &profile.auto,
                touched_files,
                self.memory,
                self.policy,
                self.detector,
                self.targeting,
                &self.repo_root,
            )
            .await?
            else {
                continue;
            };

            sources.insert(task.as_str().to_string(), selection.source);

            let execution = self
                .command_runner
                .run(&selection.command, "test", std::time::Duration::from_secs(600))
                .await?;

            let passed = execution.exit_code == 0;
            checks.push(self.to_check_result(task.as_str(), &selection.command, &execution, passed));
            if !passed {
                failed_executions.push((task.as_str().to_string(), execution));
            }
        }

        self.finish(checks, failed_executions, sources, |name| {
            let task = match name {
                "lint" => crate::profile::Task::Lint,
                "typecheck" => crate::profile::Task::Typecheck,
                _ => crate::profile::Task::Test,
            };
            suggested_action(task).to_string()
        })
    }

    async fn run_custom(&self, profile: &VerificationProfile) -> Result<VerificationReport, OrchestratorError> {
        let mut checks = Vec::new();
        let mut sources = BTreeMap::new();
        let mut failed_executions: Vec<(String, CommandExecution)> = Vec::new();

        for step in &profile.steps {
            sources.insert(
                step.name.clone(),
                conductor_types::CommandSource {
                    source: conductor_types::CommandSourceKind::Custom,
                    fallback_reason: None,
                },
            );

            let execution = self.command_runner.run(&step.command, "test", step.timeout()).await?;
            let passed = execution.exit_code == 0;
            checks.push(self.to_check_result(&step.name, &step.command, &execution, passed));
            if !passed {
                failed_executions.push((step.name.clone(), execution));
            }
        }

        self.finish(checks, failed_executions, sources, |_name| {
            "re-run the failing step and inspect its output".to_string()
        })
    }

    fn to_check_result(
        &self,
        name: &str,
        command: &[String],
        execution: &CommandExecution,
        passed: bool,
    ) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            command: command.join(" "),
            exit_code: Some(execution.exit_code),
            duration_ms: execution.duration_ms,
            stdout_path: self.tool_logs_dir.join(format!("{name}.stdout")),
            stderr_path: self.tool_logs_dir.join(format!("{name}.stderr")),
            passed,
            truncated: execution.truncated,
        }
    }

    fn finish(
        &self,
        checks: Vec<CheckResult>,
        failed_executions: Vec<(String, CommandExecution)>,
        command_sources: BTreeMap<String, conductor_types::CommandSource>,
        suggest: impl Fn(&str) -> String,
    ) -> Result<VerificationReport, OrchestratorError> {
        if failed_executions.is_empty() {
            return Ok(VerificationReport {
                passed: true,
                checks,
                failure_signature: None,
                failure_summary: None,
                command_sources,
            });
        }

        let refs: Vec<(&str, &CommandExecution)> =
            failed_executions.iter().map(|(name, exec)| (name.as_str(), exec)).collect();
        let signature = failure_signature(&refs);

        let mut suspected_files = Vec::new();
        let mut suggested_next_actions = Vec::new();
        for (name, execution) in &failed_executions {
            let digest = digest_failure(execution);
            for file in digest.suspected_files {
                if !suspected_files.contains(&file) {
                    suspected_files.push(file);
                }
            }
            suggested_next_actions.push(suggest(name));
        }

        Ok(VerificationReport {
            passed: false,
            checks,
            failure_signature: Some(signature),
            failure_summary: Some(FailureSummary {
                failed_checks: failed_executions.iter().map(|(name, _)| name.clone()).collect(),
                suspected_files,
                suggested_next_actions,
            }),
            command_sources,
        })
    }
}

/// Serializes `command_sources` to `verification_command_source.json`.
pub fn write_command_sources(
    path: &Path,
    sources: &BTreeMap<String, conductor_types::CommandSource>,
) -> Result<(), OrchestratorError> {
    let json = serde_json::to_string_pretty(sources)?;
    std::fs::write(path, json)?;
    Ok(())
}
