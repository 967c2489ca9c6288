//! Process executor boundary.
//!
//! The engine consumes a thin executor capability: run a command string
//! with a timeout and an optional streaming callback, get back
//! stdout/stderr/exit code. Non-zero exit codes are ordinary outputs;
//! only true execution failure (binary missing, spawn error, timeout)
//! surfaces as an error, which the collection driver converts into a
//! failed step output rather than aborting the pipeline.
//!
//! Two implementations ship here:
//! - [`ShellExecutor`] runs commands through `sh -c` with an output cap
//!   and SIGTERM → SIGKILL escalation on timeout.
//! - [`ScriptedExecutor`] replays canned outputs so a harness can drive
//!   the full pipeline without touching the live machine.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default maximum captured output per stream in bytes (1MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
#[cfg(unix)]
const SIGTERM_GRACE_MS: u64 = 500;

/// Which stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Streaming callback for live output.
pub type StreamCallback<'a> = &'a mut dyn FnMut(&str, StreamKind);

/// Errors that count as true execution failure.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of one command invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Captured standard output (may be truncated).
    pub stdout: String,
    /// Captured standard error (may be truncated).
    pub stderr: String,
    /// Exit code; -1 when the process was killed by a signal.
    pub exit_code: i32,
    /// Wall-clock execution time.
    pub duration: Duration,
    /// Whether either stream hit the output cap.
    pub truncated: bool,
}

impl ExecOutput {
    /// Convenience constructor for scripted outputs.
    pub fn ok(stdout: impl Into<String>) -> Self {
        ExecOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
            truncated: false,
        }
    }

    /// Scripted output with an explicit exit code and stderr.
    pub fn with_exit(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        ExecOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            duration: Duration::ZERO,
            truncated: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The consumed executor capability.
///
/// Implementations must be usable behind a shared reference so one
/// executor can serve a whole session's sequential step list.
pub trait ProcessExecutor {
    /// Execute a command string with a timeout ceiling.
    ///
    /// Must not fail for non-zero exit codes; those come back as an
    /// ordinary [`ExecOutput`].
    fn execute(
        &self,
        command: &str,
        timeout: Duration,
        on_stream: Option<&mut (dyn FnMut(&str, StreamKind) + '_)>,
    ) -> Result<ExecOutput, ExecError>;
}

/// Shell-backed executor for the live machine.
///
/// Commands run under `sh -c` (plans legitimately contain pipelines),
/// with a sanitized environment so parser-facing tools emit untranslated
/// output.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    max_output_bytes: usize,
}

impl ShellExecutor {
    pub fn new() -> Self {
        ShellExecutor {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(max_output_bytes: usize) -> Self {
        ShellExecutor { max_output_bytes }
    }

    fn build_command(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("LC_ALL", "C");
        cmd.env("LANG", "C");
        cmd
    }

    /// Kill a process with SIGTERM, then SIGKILL after a grace period.
    #[cfg(unix)]
    fn kill_with_grace(child: &mut Child) {
        let pid = child.id() as i32;

        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        debug!(pid, "sent SIGTERM");

        std::thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

        match child.try_wait() {
            Ok(Some(_)) => {
                trace!(pid, "process exited after SIGTERM");
            }
            Ok(None) => {
                warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                }
                let _ = child.wait();
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to check process status");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_with_grace(child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor for ShellExecutor {
    fn execute(
        &self,
        command: &str,
        timeout: Duration,
        mut on_stream: Option<&mut (dyn FnMut(&str, StreamKind) + '_)>,
    ) -> Result<ExecOutput, ExecError> {
        debug!(command, timeout_ms = timeout.as_millis() as u64, "executing");

        let start = Instant::now();
        let mut child = Self::build_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let deadline = start + timeout;
        let mut stdout_buf = Vec::with_capacity(8192);
        let mut stderr_buf = Vec::with_capacity(8192);
        let mut truncated = false;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut chunk = vec![0u8; 8192];

        loop {
            if Instant::now() >= deadline {
                warn!(command, "command timed out, escalating");
                Self::kill_with_grace(&mut child);
                return Err(ExecError::Timeout(timeout));
            }

            let mut did_read = false;

            if let Some(ref mut out) = stdout {
                if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(
                            &mut stdout_buf,
                            &chunk[..n],
                            self.max_output_bytes,
                            &mut truncated,
                        );
                        if let Some(cb) = on_stream.as_deref_mut() {
                            cb(&String::from_utf8_lossy(&chunk[..n]), StreamKind::Stdout);
                        }
                    }
                }
            }

            if let Some(ref mut err) = stderr {
                if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(
                            &mut stderr_buf,
                            &chunk[..n],
                            self.max_output_bytes,
                            &mut truncated,
                        );
                        if let Some(cb) = on_stream.as_deref_mut() {
                            cb(&String::from_utf8_lossy(&chunk[..n]), StreamKind::Stderr);
                        }
                    }
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut out) = stdout {
                        drain_remaining(out, &mut stdout_buf, self.max_output_bytes, &mut truncated);
                    }
                    if let Some(ref mut err) = stderr {
                        drain_remaining(err, &mut stderr_buf, self.max_output_bytes, &mut truncated);
                    }

                    let exit_code = status.code().unwrap_or(-1);
                    trace!(command, exit_code, "process exited");
                    return Ok(ExecOutput {
                        stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                        stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                        exit_code,
                        duration: start.elapsed(),
                        truncated,
                    });
                }
                Ok(None) => {
                    if !did_read {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
                Err(e) => return Err(ExecError::Io(e)),
            }
        }
    }
}

fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if space >= chunk.len() {
        buf.extend_from_slice(chunk);
    } else {
        buf.extend_from_slice(&chunk[..space]);
        *truncated = true;
    }
}

fn drain_remaining<R: ReadSource>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) {
    let mut chunk = vec![0u8; 8192];
    // Non-blocking drain so a grandchild holding the pipe open cannot
    // hang the collection loop.
    loop {
        if *truncated {
            break;
        }
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(_) => break,
        }
    }
}

#[cfg(unix)]
trait ReadSource: Read + std::os::unix::io::AsRawFd {}
#[cfg(unix)]
impl<T: Read + std::os::unix::io::AsRawFd> ReadSource for T {}

#[cfg(not(unix))]
trait ReadSource: Read {}
#[cfg(not(unix))]
impl<T: Read> ReadSource for T {}

/// Try to read from a stream without blocking.
///
/// On Unix this sets O_NONBLOCK via fcntl for the duration of the read.
/// Returns Ok(0) when no data is available.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = match stream.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    };

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    result
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}

/// Scripted executor for harnesses and tests.
///
/// Outputs are keyed by the exact (normalized) command string; commands
/// with no script entry fail with a spawn error, which the collection
/// driver records as a failed step.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outputs: HashMap<String, ExecOutput>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful output for a command.
    pub fn with_output(mut self, command: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.outputs.insert(command.into(), ExecOutput::ok(stdout));
        self
    }

    /// Script a full output (exit code, stderr) for a command.
    pub fn with_exec_output(mut self, command: impl Into<String>, output: ExecOutput) -> Self {
        self.outputs.insert(command.into(), output);
        self
    }

    /// Script a spawn-level failure for a command.
    pub fn with_failure(mut self, command: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(command.into(), reason.into());
        self
    }

    /// Commands executed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl ProcessExecutor for ScriptedExecutor {
    fn execute(
        &self,
        command: &str,
        _timeout: Duration,
        mut on_stream: Option<&mut (dyn FnMut(&str, StreamKind) + '_)>,
    ) -> Result<ExecOutput, ExecError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(command.to_string());

        if let Some(reason) = self.failures.get(command) {
            return Err(ExecError::SpawnFailed {
                command: command.to_string(),
                reason: reason.clone(),
            });
        }

        match self.outputs.get(command) {
            Some(output) => {
                if let Some(cb) = on_stream.as_deref_mut() {
                    if !output.stdout.is_empty() {
                        cb(&output.stdout, StreamKind::Stdout);
                    }
                    if !output.stderr.is_empty() {
                        cb(&output.stderr, StreamKind::Stderr);
                    }
                }
                Ok(output.clone())
            }
            None => Err(ExecError::SpawnFailed {
                command: command.to_string(),
                reason: "command not scripted".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_executor_replays_output() {
        let exec = ScriptedExecutor::new().with_output("uptime", "up 3 days");
        let out = exec
            .execute("uptime", Duration::from_secs(1), None)
            .unwrap();
        assert_eq!(out.stdout, "up 3 days");
        assert_eq!(out.exit_code, 0);
        assert_eq!(exec.calls(), vec!["uptime"]);
    }

    #[test]
    fn test_scripted_executor_unscripted_fails() {
        let exec = ScriptedExecutor::new();
        let err = exec.execute("free -h", Duration::from_secs(1), None);
        assert!(matches!(err, Err(ExecError::SpawnFailed { .. })));
    }

    #[test]
    fn test_scripted_executor_streams_chunks() {
        let exec = ScriptedExecutor::new()
            .with_exec_output("df -h", ExecOutput::with_exit("rows", "warning", 0));
        let mut seen = Vec::new();
        let mut cb = |chunk: &str, kind: StreamKind| {
            seen.push((chunk.to_string(), kind));
        };
        exec.execute("df -h", Duration::from_secs(1), Some(&mut cb))
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("rows".to_string(), StreamKind::Stdout),
                ("warning".to_string(), StreamKind::Stderr)
            ]
        );
    }

    #[test]
    fn test_append_capped_truncates() {
        let mut buf = Vec::new();
        let mut truncated = false;
        append_capped(&mut buf, b"hello world", 5, &mut truncated);
        assert_eq!(buf, b"hello");
        assert!(truncated);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_executor_runs_echo() {
        let exec = ShellExecutor::new();
        let out = exec
            .execute("echo doctor", Duration::from_secs(5), None)
            .unwrap();
        assert_eq!(out.stdout.trim(), "doctor");
        assert!(out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_executor_nonzero_exit_is_not_error() {
        let exec = ShellExecutor::new();
        let out = exec
            .execute("exit 3", Duration::from_secs(5), None)
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_executor_timeout_is_error() {
        let exec = ShellExecutor::new();
        let err = exec.execute("sleep 5", Duration::from_millis(100), None);
        assert!(matches!(err, Err(ExecError::Timeout(_))));
    }
}
