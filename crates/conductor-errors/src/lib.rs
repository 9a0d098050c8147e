#![forbid(unsafe_code)]
//! Shared error taxonomy for the orchestration engine, spec.md §7.
//!
//! Every crate in the workspace that can fail converts its own errors into
//! [`OrchestratorError`] at its public boundary (`#[from]` where the
//! conversion is lossless, explicit mapping otherwise). [`classify`] is the
//! single pure function the retry engine and run engine consult to decide
//! whether an error is worth retrying.

use std::time::Duration;

use thiserror::Error;

/// Structured detail carried by a patch-tool failure, spec.md §6 patch-tool
/// contract. Mirrors `{kind, file?, line?, message, suggestion?}`.
#[derive(Debug, Clone)]
pub struct PatchErrorEntry {
    pub kind: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PatchErrorType {
    Validation,
    Execution,
}

#[derive(Debug, Clone)]
pub struct PatchErrorDetails {
    pub errors: Vec<PatchErrorEntry>,
    pub stderr: String,
}

/// The kind-not-class-name taxonomy from spec.md §7.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    #[error("operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("provider error: {message}")]
    Provider {
        message: String,
        /// Whether this source-less provider error is worth retrying —
        /// e.g. a 5xx or a malformed response body is, a 4xx other than 429
        /// is not. Ignored when `source` is set; classification follows the
        /// wrapped cause instead.
        retriable: bool,
        #[source]
        source: Option<Box<OrchestratorError>>,
    },

    #[error("patch {error_type:?} error: {message}")]
    Patch {
        error_type: PatchErrorType,
        message: String,
        details: Option<PatchErrorDetails>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("process supervisor error: {message}")]
    Process { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        OrchestratorError::Config {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        OrchestratorError::Provider {
            message: message.into(),
            retriable: true,
            source: None,
        }
    }

    /// A provider error known not to be worth retrying (e.g. a 4xx other
    /// than 429 — the request itself is malformed, retrying changes nothing).
    pub fn provider_terminal(message: impl Into<String>) -> Self {
        OrchestratorError::Provider {
            message: message.into(),
            retriable: false,
            source: None,
        }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        OrchestratorError::Timeout { elapsed }
    }

    /// Inspects the error (and, for `Network`-wrapping cases, its message)
    /// for the connection-reset/timeout/refused family so classification
    /// does not depend on a particular HTTP client's error type.
    fn mentions_transient_network_code(&self) -> bool {
        const CODES: [&str; 3] = ["ECONNRESET", "ETIMEDOUT", "ECONNREFUSED"];
        let text = self.to_string();
        CODES.iter().any(|code| text.contains(code))
    }
}

/// Whether an error is worth retrying, spec.md §4.3 classification. Pure
/// function over [`OrchestratorError`], per spec.md §9 design notes.
pub fn classify(error: &OrchestratorError) -> Classification {
    match error {
        OrchestratorError::Config { .. } => Classification::Terminal,
        OrchestratorError::RateLimit { .. } => Classification::Retriable,
        OrchestratorError::Timeout { .. } => Classification::Retriable,
        OrchestratorError::Network(_) => Classification::Retriable,
        OrchestratorError::Provider { source, retriable, .. } => {
            if let Some(inner) = source {
                classify(inner)
            } else if *retriable {
                Classification::Retriable
            } else {
                Classification::Terminal
            }
        }
        OrchestratorError::Patch { .. } => Classification::Terminal,
        OrchestratorError::Process { .. } => {
            if error.mentions_transient_network_code() {
                Classification::Retriable
            } else {
                Classification::Terminal
            }
        }
        OrchestratorError::Io(_) => Classification::Terminal,
        OrchestratorError::Json(_) => Classification::Terminal,
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Classification {
    Retriable,
    Terminal,
}

impl Classification {
    pub fn is_retriable(self) -> bool {
        matches!(self, Classification::Retriable)
    }
}
