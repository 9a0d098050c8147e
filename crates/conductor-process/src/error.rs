use std::time::Duration;

use conductor_errors::OrchestratorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PTY allocation failed for `{command}`: {source}; a different runtime version may be required")]
    PtyUnavailable {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("child process timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("captured output exceeded cap of {cap} bytes")]
    CaptureOverflow { cap: usize },
    #[error("failed to write to child stdin: {0}")]
    StdinWrite(#[source] std::io::Error),
    #[error("child stdin is unavailable")]
    StdinUnavailable,
    #[error("child stdout is unavailable")]
    StdoutUnavailable,
    #[error("child stderr is unavailable")]
    StderrUnavailable,
    #[error("read-until predicate never matched before child exited")]
    ExitedBeforeMatch,
    #[error("failed to join output task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ProcessError> for OrchestratorError {
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::Timeout { elapsed } => OrchestratorError::Timeout { elapsed },
            other => OrchestratorError::Process {
                message: other.to_string(),
            },
        }
    }
}
