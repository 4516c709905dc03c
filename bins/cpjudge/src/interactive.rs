/// Interactive Mode - Solution Talking to an Interactor
///
/// **Core Responsibility:**
/// Run a solution and an interactor side by side, each one's stdout wired
/// to the other's stdin, and judge the pair under one wall-clock deadline.
///
/// **Wiring:**
/// - Two independent forwarding tasks, one per direction
/// - When a writer closes its stdout the peer's stdin is closed too
/// - On deadline expiry both process groups are SIGKILLed
///
/// **Verdict:**
/// The interactor decides correctness through its exit code (0 = accepted);
/// a failing solution with a satisfied interactor is a runtime error.

use crate::console;
use crate::engine::{isolate, kill_process_group, limit_millis, read_capped};
use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveVerdict {
    Accepted,
    WrongAnswer,
    RuntimeError,
    TimedOut,
}

impl fmt::Display for InteractiveVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractiveVerdict::Accepted => write!(f, "Accepted"),
            InteractiveVerdict::WrongAnswer => write!(f, "Wrong Answer"),
            InteractiveVerdict::RuntimeError => write!(f, "Runtime Error"),
            InteractiveVerdict::TimedOut => write!(f, "Time Limit Exceeded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InteractiveReport {
    pub verdict: InteractiveVerdict,
    pub elapsed_ms: u64,
    /// `None` when killed by a signal or timed out
    pub solution_exit: Option<i32>,
    pub interactor_exit: Option<i32>,
    pub solution_stderr: String,
    pub interactor_stderr: String,
}

/// Verdict from the two exit codes of a finished session
pub fn classify(solution_exit: Option<i32>, interactor_exit: Option<i32>) -> InteractiveVerdict {
    match (solution_exit, interactor_exit) {
        (_, code) if code != Some(0) => InteractiveVerdict::WrongAnswer,
        (code, _) if code != Some(0) => InteractiveVerdict::RuntimeError,
        _ => InteractiveVerdict::Accepted,
    }
}

fn spawn_piped(program: &Path) -> Result<Child> {
    if !program.is_file() {
        bail!("Program binary not found: {}", program.display());
    }
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    isolate(&mut cmd, None);
    cmd.spawn()
        .with_context(|| format!("Failed to start {}", program.display()))
}

/// Copy `from` into `to` until EOF; dropping `to` closes the peer's stdin
fn forward<R, W>(mut from: R, mut to: W, direction: &'static str) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::io::copy(&mut from, &mut to).await {
            Ok(bytes) => {
                debug!(direction, bytes, "Stream closed");
                bytes
            }
            Err(e) => {
                debug!(direction, error = %e, "Forwarding stopped");
                0
            }
        }
    })
}

/// Run one interactive session under a shared deadline
#[instrument(skip(solution, interactor), fields(solution = %solution.display(), interactor = %interactor.display()))]
pub async fn run_interactive(solution: &Path, interactor: &Path, time_limit: Duration) -> Result<InteractiveReport> {
    let mut sol = spawn_piped(solution)?;
    let mut judge = spawn_piped(interactor)?;
    let (sol_pid, judge_pid) = (sol.id(), judge.id());
    let start_time = Instant::now();

    let sol_in = sol.stdin.take().context("Solution stdin not captured")?;
    let sol_out = sol.stdout.take().context("Solution stdout not captured")?;
    let judge_in = judge.stdin.take().context("Interactor stdin not captured")?;
    let judge_out = judge.stdout.take().context("Interactor stdout not captured")?;

    let to_interactor = forward(sol_out, judge_in, "solution -> interactor");
    let to_solution = forward(judge_out, sol_in, "interactor -> solution");
    let sol_err = tokio::spawn(read_capped(sol.stderr.take()));
    let judge_err = tokio::spawn(read_capped(judge.stderr.take()));

    let finished = tokio::time::timeout(time_limit, async {
        let (s, j) = tokio::join!(sol.wait(), judge.wait());
        (s, j)
    })
    .await;

    match finished {
        Ok((sol_status, judge_status)) => {
            let elapsed_ms = start_time.elapsed().as_millis() as u64;
            let solution_exit = sol_status.context("Failed to wait for solution")?.code();
            let interactor_exit = judge_status.context("Failed to wait for interactor")?.code();

            let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                let s = sol_err.await.unwrap_or_default();
                let j = judge_err.await.unwrap_or_default();
                (s, j)
            })
            .await;
            let (solution_stderr, interactor_stderr) = drained.unwrap_or_else(|_| {
                warn!("Stderr pipes still open after exit; killing process groups");
                kill_process_group(sol_pid);
                kill_process_group(judge_pid);
                (String::new(), String::new())
            });
            to_interactor.abort();
            to_solution.abort();

            let verdict = classify(solution_exit, interactor_exit);
            debug!(?verdict, ?solution_exit, ?interactor_exit, elapsed_ms, "Interactive session finished");
            Ok(InteractiveReport {
                verdict,
                elapsed_ms,
                solution_exit,
                interactor_exit,
                solution_stderr,
                interactor_stderr,
            })
        }
        Err(_) => {
            let limit_ms = limit_millis(time_limit);
            warn!(limit_ms, "Interactive session timed out - killing both programs");

            kill_process_group(sol_pid);
            kill_process_group(judge_pid);
            for child in [&mut sol, &mut judge] {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Child already gone after group kill");
                }
            }
            for task in [to_interactor, to_solution] {
                task.abort();
            }
            sol_err.abort();
            judge_err.abort();

            Ok(InteractiveReport {
                verdict: InteractiveVerdict::TimedOut,
                elapsed_ms: limit_ms,
                solution_exit: None,
                interactor_exit: None,
                solution_stderr: String::new(),
                interactor_stderr: String::new(),
            })
        }
    }
}

pub fn print_report(report: &InteractiveReport, time_limit: Duration) {
    let exit = |code: Option<i32>| code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    match report.verdict {
        InteractiveVerdict::Accepted => console::ok(&format!("Accepted [{} ms]", report.elapsed_ms)),
        InteractiveVerdict::TimedOut => {
            console::fail(&format!("TLE (> {:.2}s), both programs killed", time_limit.as_secs_f64()))
        }
        InteractiveVerdict::WrongAnswer => console::fail(&format!(
            "Wrong answer: interactor exited with {} [{} ms]",
            exit(report.interactor_exit),
            report.elapsed_ms
        )),
        InteractiveVerdict::RuntimeError => console::fail(&format!(
            "Runtime error: solution exited with {} [{} ms]",
            exit(report.solution_exit),
            report.elapsed_ms
        )),
    }
    if !report.interactor_stderr.trim().is_empty() {
        console::caution("Interactor stderr:");
        console::block(&report.interactor_stderr);
    }
    if !report.solution_stderr.trim().is_empty() {
        console::caution("Solution stderr:");
        console::block(&report.solution_stderr);
    }
}
