use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use conductor_errors::OrchestratorError;
use conductor_types::{Event, EventSink};

/// Append-only JSONL writer for `trace.jsonl`. The `Mutex` around the file
/// handle is the advisory lock spec.md §3 calls for: this process is the
/// sole owner of the run directory, so serializing writers in-process is
/// sufficient — there is no cross-process contention to guard against.
pub struct FileEventSink {
    file: Mutex<File>,
}

impl FileEventSink {
    pub fn create(trace_path: &Path) -> Result<Self, OrchestratorError> {
        let file = OpenOptions::new().create(true).append(true).open(trace_path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Writes one line, flushing immediately so a crash mid-run leaves a
    /// complete trace up to the last successfully emitted event.
    fn write_line(&self, line: &str) -> Result<(), OrchestratorError> {
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

impl EventSink for FileEventSink {
    fn emit(&self, event: Event) {
        let line = event.to_json().to_string();
        if let Err(error) = self.write_line(&line) {
            tracing::error!(%error, "failed to append event to trace.jsonl");
        }
    }
}
