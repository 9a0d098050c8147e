pub mod claude_code;
pub mod codex;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_errors::OrchestratorError;
use conductor_process::{EnvPolicy, ProcessSupervisor, SpawnMode, SpawnRequest};
use conductor_types::{
    Event, EventKind, EventPayload, EventSink, ParsedKind, ProviderMessage, ProviderRequest,
    ProviderResponse, RunId, SubprocessStream,
};
use regex::Regex;

use crate::adapter::{AdapterCapabilities, ProviderAdapter};

/// A named idle-detection regex plus the silence window used with it,
/// resolving spec.md §9 open question (a) as a compatibility-profile table
/// rather than one hard-coded pattern.
#[derive(Clone)]
pub struct IdlePromptProfile {
    pub name: &'static str,
    pub pattern: Regex,
    pub silence: Duration,
}

impl IdlePromptProfile {
    /// Matches a trailing shell-prompt-like character. False-positives on
    /// legitimate output ending in `>`, `$`, `#`, or `%` are the accepted
    /// trade-off of staying vendor-agnostic; vendor adapters should supply
    /// their own profile when this bites.
    pub fn permissive() -> Self {
        Self {
            name: "permissive",
            pattern: Regex::new(r"[>$#%]\s*$").expect("static regex"),
            silence: Duration::from_millis(800),
        }
    }
}

/// Diff-enforcement instruction appended to the prompt when an adapter
/// isn't running its vendor's native JSON/structured mode, spec.md §4.4.
pub const DIFF_ENFORCEMENT_INSTRUCTION: &str = "\n\nRespond with the full unified diff of your change wrapped exactly between <BEGIN_DIFF> and <END_DIFF> markers, and nothing else inside those markers.";

/// Vendor-specific behavior a `SubprocessDriver` composes with rather than
/// subclassing, per spec.md §9's preference for composition over
/// inheritance: argv assembly, the idle-prompt profile to read with, and any
/// vendor-specific post-processing of captured output.
pub trait VendorCallbacks: Send + Sync {
    fn binary(&self) -> &str;

    /// Vendor-specific base argv plus `caller_args` plus any flags this
    /// adapter manages internally (model, json mode, ...). Callers must have
    /// already been checked against [`VendorCallbacks::managed_flags`] —
    /// this method does not re-check for collisions.
    fn build_args(&self, json_mode: bool, caller_args: &[String]) -> Vec<String>;

    /// Flag tokens this adapter manages internally. A caller-supplied arg
    /// matching one of these is rejected with a config error, spec.md §4.4
    /// step 1 / spec.md §8's "argv check rejects callers who include the
    /// adapter's managed flags".
    fn managed_flags(&self) -> &[&str] {
        &[]
    }

    fn idle_prompt_profile(&self) -> IdlePromptProfile {
        IdlePromptProfile::permissive()
    }

    fn env_policy(&self) -> EnvPolicy {
        EnvPolicy::new()
    }

    /// Whether this vendor binary understands a native structured-output
    /// mode, in which case the diff-enforcement prompt injection is skipped.
    fn supports_json_mode(&self) -> bool {
        false
    }

    /// Vendor-specific cleanup of captured stdout before diff/usage
    /// extraction, e.g. stripping a vendor's own prompt echo.
    fn postprocess(&self, captured: String) -> String {
        captured
    }
}

fn render_prompt(messages: &[ProviderMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("[{:?}] {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Reusable driver around one vendor CLI binary: spawns it, feeds the
/// rendered prompt on stdin, waits for the idle profile to fire, and turns
/// captured output into a [`ProviderResponse`] — spec.md §4.4's "subprocess
/// adapters composed from a reusable driver plus vendor callbacks".
pub struct SubprocessDriver<C: VendorCallbacks> {
    pub callbacks: C,
    pub cwd: PathBuf,
    pub run_id: RunId,
    pub sink: Arc<dyn EventSink>,
    pub capture_cap: usize,
    pub total_timeout: Duration,
}

impl<C: VendorCallbacks> SubprocessDriver<C> {
    pub async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, OrchestratorError> {
        let json_mode = request.json_mode && self.callbacks.supports_json_mode();
        let mut prompt = render_prompt(&request.messages);
        if !json_mode {
            prompt.push_str(DIFF_ENFORCEMENT_INSTRUCTION);
        }

        if let Some(collision) = request
            .caller_args
            .iter()
            .find(|arg| self.callbacks.managed_flags().contains(&arg.as_str()))
        {
            return Err(OrchestratorError::config(format!(
                "{}: caller-supplied arg {collision:?} collides with a managed flag",
                self.callbacks.binary()
            )));
        }

        let args = self.callbacks.build_args(json_mode, &request.caller_args);
        let spawn_request = SpawnRequest {
            program: self.callbacks.binary().to_string(),
            args: args.clone(),
            cwd: self.cwd.clone(),
            env: self.callbacks.env_policy(),
            mode: SpawnMode::Pipe,
            capture_cap: self.capture_cap,
        };

        let mut supervisor = ProcessSupervisor::spawn(spawn_request)
            .await
            .map_err(|source| OrchestratorError::Process { message: source.to_string() })?;

        let command_display = format!("{} {}", self.callbacks.binary(), args.join(" "));
        self.emit(
            EventKind::SubprocessSpawned,
            EventPayload::SubprocessSpawned {
                command: command_display,
                cwd: self.cwd.display().to_string(),
                pid: supervisor.pid(),
                pty: supervisor.mode() == SpawnMode::Pty,
            },
        );

        supervisor
            .write(prompt.as_bytes())
            .await
            .map_err(|source| OrchestratorError::Process { message: source.to_string() })?;
        supervisor.end_input();

        let profile = self.callbacks.idle_prompt_profile();
        let started = std::time::Instant::now();
        let captured = supervisor
            .read_until_heuristic(profile.silence, |buf| profile.pattern.is_match(buf), self.total_timeout)
            .await
            .map_err(|source| OrchestratorError::Process { message: source.to_string() })?;

        self.emit(
            EventKind::SubprocessOutputChunked,
            EventPayload::SubprocessOutputChunked {
                pid: supervisor.pid(),
                stream: SubprocessStream::Stdout,
                chunk: conductor_sink::redact(&captured),
            },
        );

        let outcome = supervisor
            .kill()
            .await
            .map_err(|source| OrchestratorError::Process { message: source.to_string() })?;
        self.emit(
            EventKind::SubprocessExited,
            EventPayload::SubprocessExited {
                pid: supervisor.pid(),
                exit_code: outcome.exit_code,
                signal: outcome.signal,
                duration_ms: started.elapsed().as_millis() as u64,
                error: outcome.error,
            },
        );

        let text = self.callbacks.postprocess(captured);

        let diff = conductor_parsers::extract_diff(&text);
        if let Some(diff) = &diff {
            self.emit(
                EventKind::SubprocessParsed,
                EventPayload::SubprocessParsed {
                    kind: ParsedKind::Diff,
                    confidence: diff.confidence,
                },
            );
        }

        let usage = conductor_parsers::extract_usage(&text);

        Ok(ProviderResponse {
            text: Some(diff.map(|d| d.diff_text).unwrap_or(text)),
            tool_calls: Vec::new(),
            usage,
            raw: serde_json::json!({ "stdout": self.callbacks.binary() }),
        })
    }

    fn emit(&self, kind: EventKind, payload: EventPayload) {
        self.sink
            .emit(Event::new(self.run_id.clone(), kind, payload, chrono::Utc::now()));
    }
}

#[async_trait]
impl<C: VendorCallbacks + Send + Sync> ProviderAdapter for SubprocessDriver<C>
where
    C: 'static,
{
    fn id(&self) -> &str {
        self.callbacks.binary()
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supports_json_mode: self.callbacks.supports_json_mode(),
            supports_tool_calls: false,
            supports_streaming: false,
        }
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, OrchestratorError> {
        SubprocessDriver::generate(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<Event>>);
    impl RecordingSink {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }
    }
    impl EventSink for RecordingSink {
        fn emit(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct EchoCallbacks;
    impl VendorCallbacks for EchoCallbacks {
        fn binary(&self) -> &str {
            "cat"
        }
        fn build_args(&self, _json_mode: bool, caller_args: &[String]) -> Vec<String> {
            caller_args.to_vec()
        }
        fn managed_flags(&self) -> &[&str] {
            &["--model"]
        }
        fn idle_prompt_profile(&self) -> IdlePromptProfile {
            IdlePromptProfile {
                name: "test",
                pattern: Regex::new(r"END_DIFF>").unwrap(),
                silence: Duration::from_millis(200),
            }
        }
    }

    #[tokio::test]
    async fn drives_echo_binary_and_extracts_injected_diff() {
        let sink = Arc::new(RecordingSink::new());
        let driver = SubprocessDriver {
            callbacks: EchoCallbacks,
            cwd: std::env::temp_dir(),
            run_id: RunId::from("run-1"),
            sink: sink.clone(),
            capture_cap: 1 << 20,
            total_timeout: Duration::from_secs(5),
        };

        let request = ProviderRequest::new(vec![ProviderMessage::user(
            "<BEGIN_DIFF>\ndiff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n<END_DIFF>",
        )]);

        let response = driver.generate(&request).await.expect("generate should succeed");
        let text = response.text.expect("text present");
        assert!(text.starts_with("diff --git a/f b/f"));

        let events = sink.0.lock().unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::SubprocessSpawned));
        assert!(events.iter().any(|e| e.kind == EventKind::SubprocessExited));
    }

    #[tokio::test]
    async fn captured_output_is_redacted_before_reaching_the_sink() {
        let sink = Arc::new(RecordingSink::new());
        let driver = SubprocessDriver {
            callbacks: EchoCallbacks,
            cwd: std::env::temp_dir(),
            run_id: RunId::from("run-1"),
            sink: sink.clone(),
            capture_cap: 1 << 20,
            total_timeout: Duration::from_secs(5),
        };

        let request = ProviderRequest::new(vec![ProviderMessage::user(
            "api_key: sk-abcdefghijklmnopqrstuvwxyz0123456789\n<END_DIFF>",
        )]);
        driver.generate(&request).await.expect("generate should succeed");

        let events = sink.0.lock().unwrap();
        let chunk = events.iter().find_map(|e| match &e.payload {
            EventPayload::SubprocessOutputChunked { chunk, .. } => Some(chunk.clone()),
            _ => None,
        });
        let chunk = chunk.expect("output chunk event present");
        assert!(!chunk.contains("abcdefghijklmnop"));
    }

    #[tokio::test]
    async fn caller_arg_colliding_with_managed_flag_is_rejected() {
        let sink = Arc::new(RecordingSink::new());
        let driver = SubprocessDriver {
            callbacks: EchoCallbacks,
            cwd: std::env::temp_dir(),
            run_id: RunId::from("run-1"),
            sink,
            capture_cap: 1 << 20,
            total_timeout: Duration::from_secs(5),
        };

        let mut request = ProviderRequest::new(vec![ProviderMessage::user("hi")]);
        request.caller_args = vec!["--model".to_string(), "gpt-4".to_string()];

        let error = driver.generate(&request).await.unwrap_err();
        assert!(matches!(error, OrchestratorError::Config { .. }));
    }

    #[test]
    fn permissive_profile_matches_common_prompt_endings() {
        let profile = IdlePromptProfile::permissive();
        for ending in ["$ ", "> ", "# ", "% "] {
            assert!(profile.pattern.is_match(ending), "should match {ending:?}");
        }
    }
}
