use std::path::{Path, PathBuf};

use conductor_errors::OrchestratorError;

/// The per-run directory layout from spec.md §6:
/// `<repoRoot>/.orchestrator/runs/<runId>/`.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// Creates the run directory tree atomically (best-effort: directories
    /// are created, but the run is only considered "started" once
    /// `manifest.json` has been written — see `conductor-engine`).
    pub fn create(repo_root: &Path, run_id: &str) -> Result<Self, OrchestratorError> {
        let root = repo_root.join(".orchestrator").join("runs").join(run_id);
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("patches"))?;
        std::fs::create_dir_all(root.join("tool_logs"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn effective_config_path(&self) -> PathBuf {
        self.root.join("effective-config.json")
    }

    pub fn trace_path(&self) -> PathBuf {
        self.root.join("trace.jsonl")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("summary.txt")
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.root.join("patches")
    }

    /// `NNN-step-slug.patch`, numbered in apply order.
    pub fn patch_path(&self, sequence: u32, step_slug: &str) -> PathBuf {
        self.patches_dir().join(format!("{sequence:03}-{step_slug}.patch"))
    }

    pub fn tool_logs_dir(&self) -> PathBuf {
        self.root.join("tool_logs")
    }

    pub fn subprocess_log_path(&self, adapter_id: &str) -> PathBuf {
        self.tool_logs_dir().join(format!("subprocess_{adapter_id}.log"))
    }

    pub fn command_stdout_path(&self, command_slug: &str) -> PathBuf {
        self.tool_logs_dir().join(format!("{command_slug}.stdout"))
    }

    pub fn command_stderr_path(&self, command_slug: &str) -> PathBuf {
        self.tool_logs_dir().join(format!("{command_slug}.stderr"))
    }

    pub fn verification_command_source_path(&self) -> PathBuf {
        self.root.join("verification_command_source.json")
    }

    pub fn failure_summary_json_path(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("failure_summary_iter_{iteration}.json"))
    }

    pub fn failure_summary_txt_path(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("failure_summary_iter_{iteration}.txt"))
    }

    pub fn fused_context_json_path(&self, step: u32, slug: &str) -> PathBuf {
        self.root.join(format!("fused_context_step_{step}_{slug}.json"))
    }

    pub fn fused_context_txt_path(&self, step: u32, slug: &str) -> PathBuf {
        self.root.join(format!("fused_context_step_{step}_{slug}.txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_expected_subdirectories() {
        let temp = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(temp.path(), "run-1").unwrap();
        assert!(layout.patches_dir().is_dir());
        assert!(layout.tool_logs_dir().is_dir());
        assert!(layout.root().ends_with("run-1"));
    }

    #[test]
    fn patch_path_is_numbered_and_slugged() {
        let temp = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(temp.path(), "run-1").unwrap();
        let path = layout.patch_path(3, "fix-imports");
        assert_eq!(path.file_name().unwrap(), "003-fix-imports.patch");
    }
}
