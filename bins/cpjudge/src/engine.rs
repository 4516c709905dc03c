/// Execution Engine - Runs the Program Under Test
///
/// **Core Responsibility:**
/// Run the compiled binary once per case and classify how it ended.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (process spawn, limits, kill)
/// - Engine does NOT read or compare the produced output
/// - Engine returns a raw outcome for the controller to judge
///
/// **Execution contract:**
/// The program is started as `binary <input_path> <output_path>` and must
/// write its answer to `<output_path>`. Standard streams are captured for
/// diagnostics only.
///
/// Stress runs use `pipe` instead: input arrives on stdin and the answer is
/// read back from stdout.
///
/// **Limits:**
/// - Wall-clock timeout: the whole process group is SIGKILLed on expiry and
///   the run is reported as `TimedOut`
/// - Memory: with `enforce_memory` on POSIX, RLIMIT_AS is set in the child
///   before exec; exceeding it surfaces as a runtime failure

use anyhow::{bail, Context, Result};
use cpjudge_common::types::{ExecutionOutcome, TestCase};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

/// Captured stdout/stderr beyond this size is dropped
const MAX_CAPTURE_BYTES: usize = 64 * 1024;
/// Stdout cap when stdout carries the answer
const MAX_PIPE_BYTES: usize = 16 * 1024 * 1024;
/// Upper bound on draining pipes after the child exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Raw result of one run
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outcome: ExecutionOutcome,
    pub stdout: String,
    pub stderr: String,
}

/// Process-based execution engine bound to one binary
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    binary: PathBuf,
    enforce_memory: bool,
}

impl ProcessEngine {
    pub fn new(binary: &Path, enforce_memory: bool) -> Result<Self> {
        if !binary.is_file() {
            bail!("Program binary not found: {}", binary.display());
        }
        if enforce_memory && !cfg!(unix) {
            warn!("Memory limits are only enforced on POSIX platforms; ignoring");
        }
        Ok(Self {
            binary: binary.to_path_buf(),
            enforce_memory,
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run the binary against one case with its effective limits
    pub async fn run_case(&self, case: &TestCase) -> Result<RunOutput> {
        self.execute(
            &case.input_path,
            &case.output_path,
            case.time_limit(),
            case.memory_limit_mb,
        )
        .await
    }

    /// Execute once with hard timeout and optional address-space cap
    ///
    /// A stale output file is removed first so a program that writes nothing
    /// can never be judged on a previous run's answer.
    #[instrument(skip(self), fields(binary = %self.binary.display()))]
    pub async fn execute(
        &self,
        input_path: &Path,
        output_path: &Path,
        time_limit: Duration,
        memory_limit_mb: u64,
    ) -> Result<RunOutput> {
        if output_path.exists() {
            tokio::fs::remove_file(output_path)
                .await
                .with_context(|| format!("Failed to remove stale output {}", output_path.display()))?;
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg(input_path)
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let memory_cap = if self.enforce_memory && memory_limit_mb > 0 {
            Some(memory_limit_mb.saturating_mul(1024 * 1024))
        } else {
            None
        };
        isolate(&mut cmd, memory_cap);

        let start_time = Instant::now();
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary.display()))?;
        self.supervise(child, start_time, time_limit, MAX_CAPTURE_BYTES).await
    }

    /// Run with `args`, feed `input` on stdin and capture stdout as the answer
    #[instrument(skip(self, input), fields(binary = %self.binary.display()))]
    pub async fn pipe(&self, args: &[String], input: Option<String>, time_limit: Duration) -> Result<RunOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate(&mut cmd, None);

        let start_time = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary.display()))?;

        if let (Some(mut stdin), Some(data)) = (child.stdin.take(), input) {
            tokio::spawn(async move {
                // A program may exit without reading all of its input
                if let Err(e) = stdin.write_all(data.as_bytes()).await {
                    debug!(error = %e, "Stdin closed early");
                }
            });
        }
        self.supervise(child, start_time, time_limit, MAX_PIPE_BYTES).await
    }

    /// Wait under the deadline, drain the pipes and classify the exit
    async fn supervise(
        &self,
        mut child: Child,
        start_time: Instant,
        time_limit: Duration,
        stdout_cap: usize,
    ) -> Result<RunOutput> {
        let pid = child.id();
        let stdout_task = tokio::spawn(read_limited(child.stdout.take(), stdout_cap));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        match tokio::time::timeout(time_limit, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for program")?;
                let elapsed_ms = start_time.elapsed().as_millis() as u64;

                let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                    let stdout = stdout_task.await.unwrap_or_default();
                    let stderr = stderr_task.await.unwrap_or_default();
                    (stdout, stderr)
                })
                .await;
                let (stdout, stderr) = match drained {
                    Ok(streams) => streams,
                    Err(_) => {
                        // Orphaned descendants still hold the pipes open
                        warn!(?pid, "Output pipes still open after exit; killing process group");
                        kill_process_group(pid);
                        (String::new(), String::new())
                    }
                };

                let outcome = classify(status, elapsed_ms);
                debug!(?outcome, "Program finished");
                Ok(RunOutput { outcome, stdout, stderr })
            }
            Err(_) => {
                let limit_ms = limit_millis(time_limit);
                warn!(limit_ms, "Execution timed out - killing process group");

                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Child already gone after group kill");
                }
                stdout_task.abort();
                stderr_task.abort();

                Ok(RunOutput {
                    outcome: ExecutionOutcome::TimedOut { limit_ms },
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }
}

/// Whole milliseconds of a limit built from fractional seconds
pub(crate) fn limit_millis(limit: Duration) -> u64 {
    (limit.as_secs_f64() * 1000.0).round() as u64
}

/// Human hint for common terminating signals
pub fn signal_hint(signal: i32) -> Option<&'static str> {
    match signal {
        6 => Some("aborted (assertion failure or uncaught exception)"),
        8 => Some("floating point exception (division by zero?)"),
        9 => Some("killed (likely exceeded memory limit)"),
        11 => Some("segmentation fault"),
        _ => None,
    }
}

fn classify(status: ExitStatus, elapsed_ms: u64) -> ExecutionOutcome {
    match status.code() {
        Some(exit_code) => ExecutionOutcome::Completed { exit_code, elapsed_ms },
        None => ExecutionOutcome::Killed {
            signal: exit_signal(&status),
            elapsed_ms,
        },
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Put the child in its own process group and apply the address-space cap
#[cfg(unix)]
pub(crate) fn isolate(cmd: &mut Command, memory_cap_bytes: Option<u64>) {
    // SAFETY: only async-signal-safe libc calls run between fork and exec
    unsafe {
        cmd.pre_exec(move || {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            if let Some(bytes) = memory_cap_bytes {
                let limit = libc::rlimit {
                    rlim_cur: bytes as libc::rlim_t,
                    rlim_max: bytes as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(crate) fn isolate(_cmd: &mut Command, _memory_cap_bytes: Option<u64>) {}

#[cfg(unix)]
pub(crate) fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: plain syscall; a stale pgid only yields ESRCH
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: Option<u32>) {}

/// Drain a pipe to EOF keeping only the first `MAX_CAPTURE_BYTES`
pub(crate) async fn read_capped<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    read_limited(stream, MAX_CAPTURE_BYTES).await
}

async fn read_limited<R: AsyncRead + Unpin>(stream: Option<R>, cap: usize) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
                truncated |= n > room;
            }
        }
    }
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str("\n[output truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_fatal() {
        let err = ProcessEngine::new(Path::new("/definitely/not/here/prog"), false).unwrap_err();
        assert!(err.to_string().contains("Program binary not found"));
    }

    #[test]
    fn test_limit_millis_rounds() {
        assert_eq!(limit_millis(Duration::from_secs_f64(0.3)), 300);
        assert_eq!(limit_millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_signal_hint() {
        assert_eq!(signal_hint(11), Some("segmentation fault"));
        assert_eq!(signal_hint(42), None);
    }

    #[tokio::test]
    async fn test_read_capped_truncates() {
        let data = vec![b'x'; MAX_CAPTURE_BYTES + 10];
        let text = read_capped(Some(&data[..])).await;
        assert!(text.ends_with("[output truncated]"));
        assert!(text.starts_with("xxx"));

        let empty = read_capped(None::<&[u8]>).await;
        assert!(empty.is_empty());
    }
}
