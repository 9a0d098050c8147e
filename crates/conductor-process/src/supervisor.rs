use std::path::PathBuf;
use std::time::Duration;

use conductor_types::SubprocessStream;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::capture::RollingBuffer;
use crate::env::EnvPolicy;
use crate::error::ProcessError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SpawnMode {
    Pipe,
    Pty,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SupervisorState {
    Idle,
    Running,
    Killed,
}

/// One chunk of subprocess output, tagged with its origin stream. PTY mode
/// has no stream separation, so chunks are tagged `Stdout`.
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    pub stream: SubprocessStream,
    pub chunk: String,
}

#[derive(Debug, Clone)]
pub struct ExitOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub duration: Duration,
    pub error: Option<String>,
}

pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: EnvPolicy,
    pub mode: SpawnMode,
    pub capture_cap: usize,
}

enum ChildHandle {
    Pipe {
        child: tokio::process::Child,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
        stdin: Option<tokio::process::ChildStdin>,
    },
    #[cfg(unix)]
    Pty {
        child: Box<dyn portable_pty::Child + Send + Sync>,
        writer: Option<Box<dyn std::io::Write + Send>>,
        chunk_rx: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>,
    },
}

/// Drives one child process through pipe or PTY transport, enforcing the
/// capture cap and exposing the three read primitives from spec.md §4.1.
pub struct ProcessSupervisor {
    pid: u32,
    mode: SpawnMode,
    handle: ChildHandle,
    buffer: RollingBuffer,
    state: SupervisorState,
    started_at: Instant,
    stdin_closed: bool,
}

impl ProcessSupervisor {
    /// Spawns in the requested mode. PTY spawn failures fall back to pipe
    /// mode with a warning, per spec.md §4.1.
    pub async fn spawn(request: SpawnRequest) -> Result<Self, ProcessError> {
        let env = request.env.build();
        match request.mode {
            SpawnMode::Pipe => Self::spawn_pipe(&request, &env),
            SpawnMode::Pty => {
                #[cfg(unix)]
                {
                    match Self::spawn_pty(&request, &env) {
                        Ok(supervisor) => Ok(supervisor),
                        Err(error) => {
                            warn!(
                                command = %request.program,
                                %error,
                                "PTY allocation failed, falling back to pipe mode"
                            );
                            Self::spawn_pipe(&request, &env)
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    warn!(command = %request.program, "PTY mode unsupported on this platform, using pipe mode");
                    Self::spawn_pipe(&request, &env)
                }
            }
        }
    }

    fn spawn_pipe(
        request: &SpawnRequest,
        env: &std::collections::BTreeMap<String, String>,
    ) -> Result<Self, ProcessError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .env_clear()
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: request.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        debug!(%pid, command = %request.program, mode = "pipe", "spawned child process");

        Ok(Self {
            pid,
            mode: SpawnMode::Pipe,
            handle: ChildHandle::Pipe {
                child,
                stdout,
                stderr,
                stdin,
            },
            buffer: RollingBuffer::new(request.capture_cap),
            state: SupervisorState::Running,
            started_at: Instant::now(),
            stdin_closed: false,
        })
    }

    #[cfg(unix)]
    fn spawn_pty(
        request: &SpawnRequest,
        env: &std::collections::BTreeMap<String, String>,
    ) -> Result<Self, ProcessError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|source| ProcessError::PtyUnavailable {
                command: request.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?;

        let mut cmd = CommandBuilder::new(&request.program);
        for arg in &request.args {
            cmd.arg(arg);
        }
        cmd.cwd(&request.cwd);
        cmd.env_clear();
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|source| ProcessError::PtyUnavailable {
                command: request.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?;
        drop(pair.slave);
        let pid = child.process_id().unwrap_or(0);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|source| ProcessError::PtyUnavailable {
                command: request.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|source| ProcessError::PtyUnavailable {
                command: request.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?;

        let (tx, chunk_rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(chunk[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Err(error));
                        break;
                    }
                }
            }
        });

        debug!(%pid, command = %request.program, mode = "pty", "spawned child process");

        Ok(Self {
            pid,
            mode: SpawnMode::Pty,
            handle: ChildHandle::Pty {
                child,
                writer: Some(writer),
                chunk_rx,
            },
            buffer: RollingBuffer::new(request.capture_cap),
            state: SupervisorState::Running,
            started_at: Instant::now(),
            stdin_closed: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn mode(&self) -> SpawnMode {
        self.mode
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Pulls the next chunk of output, sanitizing and buffering it. Returns
    /// `Ok(None)` on clean EOF from every stream. Kills the child and
    /// returns `Err(CaptureOverflow)` if buffering the chunk would exceed
    /// the cap.
    async fn read_chunk_once(&mut self) -> Result<Option<ChunkEvent>, ProcessError> {
        let raw = match &mut self.handle {
            ChildHandle::Pipe { stdout, stderr, .. } => {
                let mut stdout_buf = [0u8; 4096];
                let mut stderr_buf = [0u8; 4096];
                loop {
                    match (stdout.as_mut(), stderr.as_mut()) {
                        (None, None) => break None,
                        (Some(out), Some(err)) => {
                            tokio::select! {
                                result = out.read(&mut stdout_buf) => {
                                    let n = result.map_err(ProcessError::Wait)?;
                                    if n == 0 {
                                        *stdout = None;
                                        continue;
                                    }
                                    break Some((SubprocessStream::Stdout, stdout_buf[..n].to_vec()));
                                }
                                result = err.read(&mut stderr_buf) => {
                                    let n = result.map_err(ProcessError::Wait)?;
                                    if n == 0 {
                                        *stderr = None;
                                        continue;
                                    }
                                    break Some((SubprocessStream::Stderr, stderr_buf[..n].to_vec()));
                                }
                            }
                        }
                        (Some(out), None) => {
                            let n = out.read(&mut stdout_buf).await.map_err(ProcessError::Wait)?;
                            if n == 0 {
                                *stdout = None;
                                continue;
                            }
                            break Some((SubprocessStream::Stdout, stdout_buf[..n].to_vec()));
                        }
                        (None, Some(err)) => {
                            let n = err.read(&mut stderr_buf).await.map_err(ProcessError::Wait)?;
                            if n == 0 {
                                *stderr = None;
                                continue;
                            }
                            break Some((SubprocessStream::Stderr, stderr_buf[..n].to_vec()));
                        }
                    }
                }
            }
            #[cfg(unix)]
            ChildHandle::Pty { chunk_rx, .. } => match chunk_rx.recv().await {
                None => None,
                Some(Ok(bytes)) => Some((SubprocessStream::Stdout, bytes)),
                Some(Err(error)) => return Err(ProcessError::Wait(error)),
            },
        };

        let Some((stream, bytes)) = raw else {
            return Ok(None);
        };

        let text = conductor_parsers::sanitize(&String::from_utf8_lossy(&bytes));
        if let Err(overflow) = self.buffer.push(text.as_bytes()) {
            // spec.md line 55: cap overflow delivers SIGKILL directly, no
            // grace period — the child is already misbehaving.
            self.terminate(false).await?;
            return Err(ProcessError::CaptureOverflow { cap: overflow.cap });
        }

        Ok(Some(ChunkEvent { stream, chunk: text }))
    }

    /// `readUntil`: accumulates chunks until `predicate` matches the
    /// buffered text, then drains and returns it. Fails on timeout or
    /// child exit, whichever comes first.
    pub async fn read_until(
        &mut self,
        mut predicate: impl FnMut(&str) -> bool,
        timeout: Duration,
    ) -> Result<String, ProcessError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProcessError::Timeout { elapsed: timeout });
            }
            let chunk = tokio::time::timeout(remaining, self.read_chunk_once())
                .await
                .map_err(|_| ProcessError::Timeout { elapsed: timeout })??;
            match chunk {
                None => return Err(ProcessError::ExitedBeforeMatch),
                Some(_) => {
                    if predicate(&self.buffer.as_lossy_str()) {
                        return Ok(self.buffer.as_lossy_str_and_take());
                    }
                }
            }
        }
    }

    /// `readUntilHeuristic`: resolves on predicate match or `silence`
    /// elapsed since the last chunk, whichever first; resolves with
    /// whatever is buffered if the child exits first.
    pub async fn read_until_heuristic(
        &mut self,
        silence: Duration,
        mut predicate: impl FnMut(&str) -> bool,
        total_timeout: Duration,
    ) -> Result<String, ProcessError> {
        let deadline = Instant::now() + total_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProcessError::Timeout {
                    elapsed: total_timeout,
                });
            }
            let silence_budget = remaining.min(silence);
            match tokio::time::timeout(silence_budget, self.read_chunk_once()).await {
                Ok(Ok(None)) => return Ok(self.buffer.as_lossy_str_and_take()),
                Ok(Ok(Some(_))) => {
                    if predicate(&self.buffer.as_lossy_str()) {
                        return Ok(self.buffer.as_lossy_str_and_take());
                    }
                }
                Ok(Err(error)) => return Err(error),
                Err(_elapsed) => return Ok(self.buffer.as_lossy_str_and_take()),
            }
        }
    }

    /// `readStream`: pull one item at a time until exit; on exit-with-error
    /// the sequence fails with that error.
    pub async fn next_chunk(&mut self) -> Result<Option<ChunkEvent>, ProcessError> {
        self.read_chunk_once().await
    }

    /// No-op after kill; swallows a pipe-closed error from writing after
    /// the child closed its own stdin (logged at debug, not fatal).
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ProcessError> {
        if self.state == SupervisorState::Killed {
            return Ok(());
        }
        match &mut self.handle {
            ChildHandle::Pipe { stdin, .. } => {
                let Some(handle) = stdin.as_mut() else {
                    debug!(pid = self.pid, "write after stdin closed, ignoring");
                    return Ok(());
                };
                match tokio::io::AsyncWriteExt::write_all(handle, data).await {
                    Ok(()) => Ok(()),
                    Err(error) if error.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!(pid = self.pid, %error, "stdin pipe closed, ignoring write");
                        Ok(())
                    }
                    Err(error) => Err(ProcessError::StdinWrite(error)),
                }
            }
            #[cfg(unix)]
            ChildHandle::Pty { writer, .. } => {
                let Some(w) = writer.as_mut() else {
                    debug!(pid = self.pid, "write after stdin closed, ignoring");
                    return Ok(());
                };
                match w.write_all(data).and_then(|()| w.flush()) {
                    Ok(()) => Ok(()),
                    Err(error) if error.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!(pid = self.pid, %error, "pty writer closed, ignoring write");
                        Ok(())
                    }
                    Err(error) => Err(ProcessError::StdinWrite(error)),
                }
            }
        }
    }

    /// Closes stdin exactly once in pipe mode; no-op in PTY mode.
    pub fn end_input(&mut self) {
        if self.stdin_closed {
            return;
        }
        self.stdin_closed = true;
        if let ChildHandle::Pipe { stdin, .. } = &mut self.handle {
            stdin.take();
        }
    }

    /// Idempotent: the second call emits no new events; it just reports the
    /// elapsed duration since spawn. Attempts graceful termination (SIGTERM)
    /// before escalating to SIGKILL, spec.md line 59.
    pub async fn kill(&mut self) -> Result<ExitOutcome, ProcessError> {
        self.terminate(true).await
    }

    async fn terminate(&mut self, graceful: bool) -> Result<ExitOutcome, ProcessError> {
        if self.state == SupervisorState::Killed {
            return Ok(ExitOutcome {
                exit_code: None,
                signal: None,
                duration: self.started_at.elapsed(),
                error: None,
            });
        }
        self.state = SupervisorState::Killed;

        match &mut self.handle {
            ChildHandle::Pipe { child, .. } => {
                let sent_sigterm = graceful && send_sigterm(self.pid);
                let status = if sent_sigterm {
                    match tokio::time::timeout(SIGTERM_GRACE_PERIOD, child.wait()).await {
                        Ok(result) => result.map_err(ProcessError::Wait)?,
                        Err(_elapsed) => {
                            let _ = child.start_kill();
                            child.wait().await.map_err(ProcessError::Wait)?
                        }
                    }
                } else {
                    let _ = child.start_kill();
                    child.wait().await.map_err(ProcessError::Wait)?
                };
                Ok(ExitOutcome {
                    exit_code: status.code(),
                    signal: exit_signal_name(&status),
                    duration: self.started_at.elapsed(),
                    error: None,
                })
            }
            #[cfg(unix)]
            ChildHandle::Pty { child, .. } => {
                let sent_sigterm = graceful
                    && child
                        .process_id()
                        .map(send_sigterm)
                        .unwrap_or(false);

                let mut escalated = !sent_sigterm;
                if sent_sigterm {
                    let deadline = Instant::now() + SIGTERM_GRACE_PERIOD;
                    loop {
                        if matches!(child.try_wait(), Ok(Some(_))) {
                            break;
                        }
                        if Instant::now() >= deadline {
                            let _ = child.kill();
                            escalated = true;
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                } else {
                    let _ = child.kill();
                }

                let status = child.wait().map_err(ProcessError::Wait)?;
                Ok(ExitOutcome {
                    exit_code: Some(status.exit_code() as i32),
                    signal: Some(if escalated { "SIGKILL" } else { "SIGTERM" }.to_string()),
                    duration: self.started_at.elapsed(),
                    error: None,
                })
            }
        }
    }
}

/// Best-effort grace period between SIGTERM and the SIGKILL escalation.
const SIGTERM_GRACE_PERIOD: Duration = Duration::from_millis(2_000);

/// Sends SIGTERM to `pid`; returns whether the signal was actually
/// delivered (a process that already exited reports an error here, which
/// just means there's nothing left to wait gracefully for).
#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn exit_signal_name(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|raw| match raw {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        9 => "SIGKILL".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{other}"),
    })
}

#[cfg(not(unix))]
fn exit_signal_name(_status: &std::process::ExitStatus) -> Option<String> {
    None
}

impl RollingBuffer {
    fn as_lossy_str_and_take(&mut self) -> String {
        String::from_utf8_lossy(&self.take()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(program: &str, args: &[&str]) -> SpawnRequest {
        SpawnRequest {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: std::env::temp_dir(),
            env: EnvPolicy::new(),
            mode: SpawnMode::Pipe,
            capture_cap: 1 << 20,
        }
    }

    #[tokio::test]
    async fn spawns_and_reads_stdout() {
        let mut supervisor = ProcessSupervisor::spawn(request("echo", &["hello"]))
            .await
            .expect("spawn should succeed");
        let text = supervisor
            .read_until(|buf| buf.contains("hello"), Duration::from_secs(2))
            .await
            .expect("should read hello");
        assert!(text.contains("hello"));
        supervisor.kill().await.expect("kill should succeed");
    }

    #[tokio::test]
    async fn kill_is_idempotent() {
        let mut supervisor = ProcessSupervisor::spawn(request("sleep", &["5"]))
            .await
            .expect("spawn should succeed");
        let first = supervisor.kill().await.expect("first kill");
        let second = supervisor.kill().await.expect("second kill");
        assert_eq!(supervisor.state(), SupervisorState::Killed);
        assert!(first.duration <= second.duration);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn graceful_kill_reports_sigterm_for_cooperative_child() {
        let mut supervisor = ProcessSupervisor::spawn(request("sleep", &["5"]))
            .await
            .expect("spawn should succeed");
        let outcome = supervisor.kill().await.expect("kill should succeed");
        assert_eq!(outcome.signal.as_deref(), Some("SIGTERM"));
    }

    #[tokio::test]
    async fn capture_cap_overflow_kills_and_errors() {
        let mut req = request("yes", &[]);
        req.capture_cap = 16;
        let mut supervisor = ProcessSupervisor::spawn(req)
            .await
            .expect("spawn should succeed");
        let result = supervisor
            .read_until(|_| false, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(ProcessError::CaptureOverflow { .. })));
        assert_eq!(supervisor.state(), SupervisorState::Killed);
    }
}
