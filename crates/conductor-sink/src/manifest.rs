use std::path::Path;
use std::sync::Mutex;

use conductor_errors::OrchestratorError;
use conductor_types::RunArtifactsManifest;

/// Owns `manifest.json` for the lifetime of a run: holds the in-memory
/// manifest behind a `Mutex` and rewrites the whole file on every push,
/// since entries are added one at a time and the file is small.
pub struct ManifestWriter {
    path: std::path::PathBuf,
    manifest: Mutex<RunArtifactsManifest>,
}

impl ManifestWriter {
    pub fn create(path: &Path, run_id: impl Into<String>) -> Result<Self, OrchestratorError> {
        let manifest = RunArtifactsManifest::new(run_id);
        let writer = Self {
            path: path.to_path_buf(),
            manifest: Mutex::new(manifest),
        };
        writer.persist()?;
        Ok(writer)
    }

    /// Loads an existing `manifest.json`, for resuming inspection of a
    /// finished or in-progress run.
    pub fn load(path: &Path) -> Result<Self, OrchestratorError> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: RunArtifactsManifest = serde_json::from_str(&raw)?;
        Ok(Self {
            path: path.to_path_buf(),
            manifest: Mutex::new(manifest),
        })
    }

    pub fn push(&self, relative_path: std::path::PathBuf, kind: impl Into<String>) -> Result<(), OrchestratorError> {
        {
            let mut manifest = self.manifest.lock().unwrap_or_else(|p| p.into_inner());
            manifest.push(relative_path, kind);
        }
        self.persist()
    }

    pub fn snapshot(&self) -> RunArtifactsManifest {
        self.manifest.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn persist(&self) -> Result<(), OrchestratorError> {
        let manifest = self.manifest.lock().unwrap_or_else(|p| p.into_inner());
        let json = serde_json::to_string_pretty(&*manifest)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
