use conductor_errors::OrchestratorError;
use conductor_types::{CommandSource, CommandSourceKind};

use crate::external::{CommandPolicy, ProceduralMemory, TargetingManager, ToolchainDetector, ToolchainInfo};
use crate::profile::{AutoConfig, Task, TestScope};

/// A selected command plus the bookkeeping spec.md §4.6 wants recorded in
/// `verification_command_source.json`.
pub struct Selection {
    pub command: Vec<String>,
    pub source: CommandSource,
}

/// Picks the command to run for one auto-mode task: memory → detected → skip
/// (`None`), per spec.md §4.6's priority order.
pub async fn select_command(
    task: Task,
    auto: &AutoConfig,
    touched_files: &[String],
    memory: &dyn ProceduralMemory,
    policy: &dyn CommandPolicy,
    detector: &dyn ToolchainDetector,
    targeting: &dyn TargetingManager,
    repo_root: &str,
) -> Result<Option<Selection>, OrchestratorError> {
    if let Some(selection) = from_memory(task, memory, policy).await? {
        return Ok(Some(selection));
    }

    let toolchain = detector.detect(repo_root).await?;
    if let Some(mut selection) =
        from_detected(task, auto, touched_files, &toolchain, targeting).await?
    {
        if let Some(reason) = memory_fallback_reason(task, memory, policy).await? {
            selection.source.fallback_reason = Some(reason);
        }
        return Ok(Some(selection));
    }

    Ok(None)
}

/// Re-derives why memory didn't win, purely to annotate the `detected`
/// source that's about to be used instead. Memory lookups are expected to be
/// cheap (process-local or small RPCs), so re-querying here instead of
/// threading a reason value through every return path keeps `from_memory`
/// a plain priority check.
async fn memory_fallback_reason(
    task: Task,
    memory: &dyn ProceduralMemory,
    policy: &dyn CommandPolicy,
) -> Result<Option<String>, OrchestratorError> {
    let queries = vec![task.memory_title()];
    let results = memory.find(&queries, 10).await?;
    let Some(entries) = results.into_iter().next() else {
        return Ok(None);
    };
    let chosen = entries
        .iter()
        .filter(|entry| !entry.stale)
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at));
    let Some(entry) = chosen else {
        return Ok(None);
    };
    let command: Vec<String> = entry.content.split_whitespace().map(str::to_string).collect();
    if !command.is_empty() && !policy.allows(&command) {
        return Ok(Some("memory command rejected by tool policy".into()));
    }
    Ok(None)
}

async fn from_memory(
    task: Task,
    memory: &dyn ProceduralMemory,
    policy: &dyn CommandPolicy,
) -> Result<Option<Selection>, OrchestratorError> {
    let queries = vec![task.memory_title()];
    let results = memory.find(&queries, 10).await?;
    let Some(entries) = results.into_iter().next() else {
        return Ok(None);
    };

    let chosen = entries
        .iter()
        .filter(|entry| !entry.stale)
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at));

    let Some(entry) = chosen else {
        return Ok(None);
    };

    let command: Vec<String> = entry.content.split_whitespace().map(str::to_string).collect();
    if command.is_empty() {
        return Ok(None);
    }

    if !policy.allows(&command) {
        // Dropped, not used: falls through to the `detected` source on the
        // next priority level in `select_command`.
        tracing::warn!(task = task.as_str(), "memory command rejected by policy");
        return Ok(None);
    }

    Ok(Some(Selection {
        command,
        source: CommandSource {
            source: CommandSourceKind::Memory,
            fallback_reason: None,
        },
    }))
}

async fn from_detected(
    task: Task,
    auto: &AutoConfig,
    touched_files: &[String],
    toolchain: &ToolchainInfo,
    targeting: &dyn TargetingManager,
) -> Result<Option<Selection>, OrchestratorError> {
    let Some(root_command) = toolchain.command_for(task) else {
        return Ok(None);
    };

    if matches!(auto.test_scope, TestScope::Targeted) && !touched_files.is_empty() {
        if let Some(targeted) = targeting.targeted_command(task, touched_files).await? {
            return Ok(Some(Selection {
                command: targeted,
                source: CommandSource {
                    source: CommandSourceKind::Detected,
                    fallback_reason: None,
                },
            }));
        }
    }

    Ok(Some(Selection {
        command: root_command,
        source: CommandSource {
            source: CommandSourceKind::Detected,
            fallback_reason: None,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{AllowAllPolicy, CommandExecution, MemoryEntry};
    use async_trait::async_trait;

    struct FixedMemory(Vec<MemoryEntry>);

    #[async_trait]
    impl ProceduralMemory for FixedMemory {
        async fn find(&self, _queries: &[String], _limit: usize) -> Result<Vec<Vec<MemoryEntry>>, OrchestratorError> {
            Ok(vec![self.0.clone()])
        }
    }

    struct EmptyMemory;

    #[async_trait]
    impl ProceduralMemory for EmptyMemory {
        async fn find(&self, _queries: &[String], _limit: usize) -> Result<Vec<Vec<MemoryEntry>>, OrchestratorError> {
            Ok(vec![vec![]])
        }
    }

    struct FixedToolchain(ToolchainInfo);

    #[async_trait]
    impl ToolchainDetector for FixedToolchain {
        async fn detect(&self, _repo_root: &str) -> Result<ToolchainInfo, OrchestratorError> {
            Ok(self.0.clone())
        }
    }

    struct NoTargeting;

    #[async_trait]
    impl TargetingManager for NoTargeting {
        async fn targeted_command(
            &self,
            _task: Task,
            _touched_files: &[String],
        ) -> Result<Option<Vec<String>>, OrchestratorError> {
            Ok(None)
        }
    }

    struct RejectAll;
    impl CommandPolicy for RejectAll {
        fn allows(&self, _command: &[String]) -> bool {
            false
        }
    }

    fn toolchain_with_test_cmd() -> ToolchainInfo {
        ToolchainInfo {
            package_manager: "npm".into(),
            uses_turbo: false,
            test_cmd: Some(vec!["npm".into(), "test".into()]),
            lint_cmd: None,
            typecheck_cmd: None,
        }
    }

    #[tokio::test]
    async fn memory_entry_wins_when_fresh() {
        let memory = FixedMemory(vec![MemoryEntry {
            title: "How to run test".into(),
            content: "npm run test:unit".into(),
            updated_at: "2026-01-01".into(),
            stale: false,
        }]);
        let policy = AllowAllPolicy;
        let toolchain = FixedToolchain(toolchain_with_test_cmd());
        let targeting = NoTargeting;

        let selection = select_command(
            Task::Test,
            &AutoConfig::default(),
            &[],
            &memory,
            &policy,
            &toolchain,
            &targeting,
            "/repo",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(selection.command, vec!["npm", "run", "test:unit"]);
        assert_eq!(selection.source.source, CommandSourceKind::Memory);
    }

    #[tokio::test]
    async fn falls_back_to_detected_when_memory_empty() {
        let memory = EmptyMemory;
        let policy = AllowAllPolicy;
        let toolchain = FixedToolchain(toolchain_with_test_cmd());
        let targeting = NoTargeting;

        let selection = select_command(
            Task::Test,
            &AutoConfig::default(),
            &[],
            &memory,
            &policy,
            &toolchain,
            &targeting,
            "/repo",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(selection.command, vec!["npm", "test"]);
        assert_eq!(selection.source.source, CommandSourceKind::Detected);
    }

    #[tokio::test]
    async fn skips_task_when_no_source_resolves() {
        let memory = EmptyMemory;
        let policy = AllowAllPolicy;
        let toolchain = FixedToolchain(ToolchainInfo {
            package_manager: "npm".into(),
            uses_turbo: false,
            test_cmd: None,
            lint_cmd: None,
            typecheck_cmd: None,
        });
        let targeting = NoTargeting;

        let selection = select_command(
            Task::Test,
            &AutoConfig::default(),
            &[],
            &memory,
            &policy,
            &toolchain,
            &targeting,
            "/repo",
        )
        .await
        .unwrap();

        assert!(selection.is_none());
    }

    #[tokio::test]
    async fn policy_rejection_falls_through_to_detected() {
        let memory = FixedMemory(vec![MemoryEntry {
            title: "How to run test".into(),
            content: "rm -rf /".into(),
            updated_at: "2026-01-01".into(),
            stale: false,
        }]);
        let policy = RejectAll;
        let toolchain = FixedToolchain(toolchain_with_test_cmd());
        let targeting = NoTargeting;

        let selection = select_command(
            Task::Test,
            &AutoConfig::default(),
            &[],
            &memory,
            &policy,
            &toolchain,
            &targeting,
            "/repo",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(selection.source.source, CommandSourceKind::Detected);
        assert!(selection.source.fallback_reason.is_some());
    }

    #[allow(dead_code)]
    fn unused_execution_type_reference(_: CommandExecution) {}
}
