use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a single run, assigned by the caller that starts it.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        RunId(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        RunId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum SubprocessStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    Auto,
    Custom,
}

/// The closed set of event kinds from spec.md §6. `type` + `payload` are
/// flattened onto [`Event`] at serialization time rather than tagged, so the
/// wire shape matches `{schemaVersion, type, timestamp, runId, payload}`
/// exactly; see [`Event::to_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RunStarted,
    RunFinished,
    ProviderRequestStarted,
    ProviderRequestFinished,
    SubprocessSpawned,
    SubprocessOutputChunked,
    SubprocessExited,
    SubprocessParsed,
    VerificationStarted,
    VerificationFinished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStarted => "RunStarted",
            EventKind::RunFinished => "RunFinished",
            EventKind::ProviderRequestStarted => "ProviderRequestStarted",
            EventKind::ProviderRequestFinished => "ProviderRequestFinished",
            EventKind::SubprocessSpawned => "SubprocessSpawned",
            EventKind::SubprocessOutputChunked => "SubprocessOutputChunked",
            EventKind::SubprocessExited => "SubprocessExited",
            EventKind::SubprocessParsed => "SubprocessParsed",
            EventKind::VerificationStarted => "VerificationStarted",
            EventKind::VerificationFinished => "VerificationFinished",
        }
    }
}

/// Per-kind payload. Each variant's fields mirror the payload column of the
/// event table in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    RunStarted {
        #[serde(rename = "taskId")]
        task_id: String,
        goal: String,
    },
    RunFinished {
        status: RunStatus,
        summary: String,
    },
    ProviderRequestStarted {
        provider: String,
        model: Option<String>,
    },
    ProviderRequestFinished {
        provider: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        success: bool,
        retries: u32,
        error: Option<String>,
    },
    SubprocessSpawned {
        command: String,
        cwd: String,
        pid: u32,
        pty: bool,
    },
    SubprocessOutputChunked {
        pid: u32,
        stream: SubprocessStream,
        chunk: String,
    },
    SubprocessExited {
        pid: u32,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        signal: Option<String>,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        error: Option<String>,
    },
    SubprocessParsed {
        kind: ParsedKind,
        confidence: f64,
    },
    VerificationStarted {
        mode: VerificationMode,
    },
    VerificationFinished {
        passed: bool,
        #[serde(rename = "failedChecks")]
        failed_checks: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsedKind {
    Diff,
    Plan,
    Text,
}

/// An immutable trace record. `schema_version` is fixed at 1 for this
/// contract; bumping it is a breaking wire change, not something a caller
/// configures.
#[derive(Debug, Clone)]
pub struct Event {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub run_id: RunId,
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl Event {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(run_id: RunId, kind: EventKind, payload: EventPayload, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            timestamp: now,
            run_id,
            kind,
            payload,
        }
    }

    /// Renders the event as the JSONL-ready wire object:
    /// `{schemaVersion, type, timestamp, runId, payload}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "schemaVersion": self.schema_version,
            "type": self.kind.as_str(),
            "timestamp": self.timestamp.to_rfc3339(),
            "runId": self.run_id.0,
            "payload": self.payload,
        })
    }
}

/// Narrow contract every crate that emits events depends on, so the retry
/// engine, process supervisor, and provider adapters don't need to know how
/// (or whether) events are persisted — `conductor-sink` is the one
/// implementation that writes them to `trace.jsonl`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_matches_wire_shape() {
        let event = Event::new(
            RunId::from("run-1"),
            EventKind::RunStarted,
            EventPayload::RunStarted {
                task_id: "task-1".into(),
                goal: "fix the bug".into(),
            },
            Utc::now(),
        );
        let json = event.to_json();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["type"], "RunStarted");
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["payload"]["goal"], "fix the bug");
    }

    #[test]
    fn event_kind_names_are_stable() {
        assert_eq!(EventKind::SubprocessExited.as_str(), "SubprocessExited");
        assert_eq!(EventKind::VerificationFinished.as_str(), "VerificationFinished");
    }
}
