/// Stress Testing - Solution vs Brute Force on Generated Inputs
///
/// **Loop:**
/// 1. The generator runs as `gen <iteration>` and its stdout becomes the input
/// 2. Solution and brute force read that input on stdin
/// 3. Their stdouts are compared with the same comparator as `run`,
///    the brute force output playing the expected answer
///
/// The loop stops at the first mismatch, timeout or crash of any of the
/// three programs. Every iteration is appended to a plain-text log, and the
/// failing input is saved so it can be added as a numbered case.

use crate::console;
use crate::engine::{signal_hint, ProcessEngine, RunOutput};
use crate::evaluator::{self, Comparison};
use crate::render::{self, RenderConfig};
use anyhow::{Context, Result};
use chrono::Utc;
use cpjudge_common::types::{ComparisonResult, ExecutionOutcome, WhitespacePolicy};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct StressOptions {
    pub iterations: u64,
    pub time_limit: Duration,
    pub whitespace: WhitespacePolicy,
    pub case_insensitive: bool,
    pub numeric_tolerance: Option<f64>,
    /// `None` disables the log file
    pub log_path: Option<PathBuf>,
    /// Where the failing input is written
    pub save_input: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Generator,
    Solution,
    Brute,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Generator => write!(f, "generator"),
            Role::Solution => write!(f, "solution"),
            Role::Brute => write!(f, "brute force"),
        }
    }
}

/// How a stress session ended
#[derive(Debug, Clone, PartialEq)]
pub enum StressOutcome {
    AllPassed {
        iterations: u64,
    },
    /// Outputs are normalized by the resolved whitespace policy
    Mismatch {
        iteration: u64,
        input: String,
        brute_output: String,
        solution_output: String,
    },
    TimedOut {
        iteration: u64,
        role: Role,
        input: String,
    },
    Crashed {
        iteration: u64,
        role: Role,
        outcome: ExecutionOutcome,
        stderr: String,
        input: String,
    },
}

impl StressOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StressOutcome::AllPassed { .. })
    }

    fn failing_input(&self) -> Option<&str> {
        match self {
            StressOutcome::AllPassed { .. } => None,
            StressOutcome::Mismatch { input, .. }
            | StressOutcome::TimedOut { input, .. }
            | StressOutcome::Crashed { input, .. } => Some(input),
        }
    }
}

/// Append-only session log; write failures are reported once and then ignored
struct StressLog {
    file: Option<File>,
}

impl StressLog {
    fn open(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                Some(File::create(path).with_context(|| format!("Failed to create stress log {}", path.display()))?)
            }
            None => None,
        };
        let mut log = Self { file };
        log.line(&format!("=== Stress test started @ {} ===\n", Utc::now().to_rfc3339()));
        Ok(log)
    }

    fn line(&mut self, text: &str) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = writeln!(file, "{}", text) {
                warn!(error = %e, "Stress log write failed; logging disabled");
                self.file = None;
            }
        }
    }
}

pub struct StressTester {
    generator: ProcessEngine,
    solution: ProcessEngine,
    brute: ProcessEngine,
    options: StressOptions,
}

enum Step {
    Output(String),
    Stop(StressOutcome),
}

impl StressTester {
    /// Fails before any iteration when one of the three programs is missing
    pub fn new(generator: &Path, solution: &Path, brute: &Path, options: StressOptions) -> Result<Self> {
        Ok(Self {
            generator: ProcessEngine::new(generator, false)?,
            solution: ProcessEngine::new(solution, false)?,
            brute: ProcessEngine::new(brute, false)?,
            options,
        })
    }

    #[instrument(skip(self), fields(iterations = self.options.iterations))]
    pub async fn run(&self) -> Result<StressOutcome> {
        let mut log = StressLog::open(self.options.log_path.as_deref())?;
        let limit = self.options.time_limit;

        for iteration in 1..=self.options.iterations {
            let input = match self.step(Role::Generator, iteration, vec![iteration.to_string()], None, "").await? {
                Step::Output(text) => text,
                Step::Stop(outcome) => return self.stop(outcome, &mut log),
            };
            let solution = match self.step(Role::Solution, iteration, Vec::new(), Some(input.as_str()), &input).await? {
                Step::Output(text) => text,
                Step::Stop(outcome) => return self.stop(outcome, &mut log),
            };
            let brute = match self.step(Role::Brute, iteration, Vec::new(), Some(input.as_str()), &input).await? {
                Step::Output(text) => text,
                Step::Stop(outcome) => return self.stop(outcome, &mut log),
            };

            let Comparison { result, .. } = evaluator::compare(
                &brute,
                &solution,
                self.options.whitespace,
                self.options.case_insensitive,
                self.options.numeric_tolerance,
            );
            match result {
                ComparisonResult::Pass { .. } => {
                    log.line(&format!("[PASS] Test #{}", iteration));
                    print!("\r→ Test #{} passed (limit {} ms)", iteration, limit.as_millis());
                    let _ = io::stdout().flush();
                }
                ComparisonResult::Fail {
                    normalized_expected,
                    normalized_actual,
                    ..
                } => {
                    let outcome = StressOutcome::Mismatch {
                        iteration,
                        input,
                        brute_output: normalized_expected,
                        solution_output: normalized_actual,
                    };
                    return self.stop(outcome, &mut log);
                }
            }
        }

        println!();
        log.line("\nALL TESTS PASSED");
        info!(iterations = self.options.iterations, "Stress test passed");
        Ok(StressOutcome::AllPassed {
            iterations: self.options.iterations,
        })
    }

    /// Run one of the three programs and turn a bad exit into a stop
    async fn step(
        &self,
        role: Role,
        iteration: u64,
        args: Vec<String>,
        stdin: Option<&str>,
        input: &str,
    ) -> Result<Step> {
        let engine = match role {
            Role::Generator => &self.generator,
            Role::Solution => &self.solution,
            Role::Brute => &self.brute,
        };
        let RunOutput { outcome, stdout, stderr } = engine
            .pipe(&args, stdin.map(str::to_string), self.options.time_limit)
            .await?;

        let input = input.to_string();
        Ok(match outcome {
            ExecutionOutcome::TimedOut { .. } => Step::Stop(StressOutcome::TimedOut { iteration, role, input }),
            _ if outcome.is_clean() => Step::Output(stdout),
            _ => Step::Stop(StressOutcome::Crashed {
                iteration,
                role,
                outcome,
                stderr,
                input,
            }),
        })
    }

    fn stop(&self, outcome: StressOutcome, log: &mut StressLog) -> Result<StressOutcome> {
        println!();
        match &outcome {
            StressOutcome::AllPassed { .. } => {}
            StressOutcome::Mismatch {
                iteration,
                input,
                brute_output,
                solution_output,
            } => {
                log.line(&format!("\n[FAIL] Test #{} @ {}", iteration, Utc::now().to_rfc3339()));
                log.line(&format!("Input:\n{}", input));
                log.line(&format!("Brute:\n{}", brute_output));
                log.line(&format!("Solution:\n{}", solution_output));
            }
            StressOutcome::TimedOut { iteration, role, .. } => {
                log.line(&format!("[FAIL] Test #{} - TIMEOUT in {}", iteration, role));
            }
            StressOutcome::Crashed {
                iteration, role, stderr, ..
            } => {
                log.line(&format!("[FAIL] Test #{} - {} crashed", iteration, role));
                log.line(&format!("Stderr:\n{}", stderr));
            }
        }

        if let Some(input) = outcome.failing_input().filter(|text| !text.is_empty()) {
            fs::write(&self.options.save_input, input)
                .with_context(|| format!("Failed to save input to {}", self.options.save_input.display()))?;
        }
        warn!(?outcome, "Stress test stopped");
        Ok(outcome)
    }
}

/// Console report for a finished session
pub fn print_outcome(outcome: &StressOutcome, options: &StressOptions, render: &RenderConfig) {
    match outcome {
        StressOutcome::AllPassed { iterations } => {
            console::ok(&format!("All {} generated test(s) passed.", iterations));
        }
        StressOutcome::Mismatch {
            iteration,
            input,
            brute_output,
            solution_output,
        } => {
            console::fail(&format!("Mismatch on generated test #{}", iteration));
            print_input(input);
            console::heading("\n≣ Side-by-side diff (brute force vs solution)");
            print!(
                "{}",
                render::render_side_by_side(brute_output, solution_output, options.case_insensitive, render)
            );
        }
        StressOutcome::TimedOut { iteration, role, input } => {
            console::fail(&format!(
                "TLE: {} exceeded {:.2}s on generated test #{}",
                role,
                options.time_limit.as_secs_f64(),
                iteration
            ));
            print_input(input);
        }
        StressOutcome::Crashed {
            iteration,
            role,
            outcome,
            stderr,
            input,
        } => {
            let detail = match outcome {
                ExecutionOutcome::Completed { exit_code, .. } => format!("exit {}", exit_code),
                ExecutionOutcome::Killed { signal: Some(sig), .. } => match signal_hint(*sig) {
                    Some(hint) => format!("signal {}: {}", sig, hint),
                    None => format!("signal {}", sig),
                },
                _ => "terminated".to_string(),
            };
            console::fail(&format!("Runtime error in {} on generated test #{} ({})", role, iteration, detail));
            if !stderr.trim().is_empty() {
                console::caution("Stderr:");
                console::block(stderr);
            }
            print_input(input);
        }
    }

    if outcome.failing_input().is_some_and(|text| !text.is_empty()) {
        console::note(&format!("Failing input saved to {}", options.save_input.display()));
    }
    if let Some(path) = &options.log_path {
        console::note(&format!("Log written to {}", path.display()));
    }
}

fn print_input(input: &str) {
    if input.is_empty() {
        return;
    }
    console::heading("\n📥 Input:");
    for (i, line) in input.lines().enumerate() {
        println!("{:>4}:  {}", i + 1, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_fatal() {
        let options = StressOptions {
            iterations: 1,
            time_limit: Duration::from_secs(1),
            whitespace: WhitespacePolicy::Auto,
            case_insensitive: false,
            numeric_tolerance: None,
            log_path: None,
            save_input: PathBuf::from("input.txt"),
        };
        let err = StressTester::new(
            Path::new("/definitely/not/here/gen"),
            Path::new("/definitely/not/here/sol"),
            Path::new("/definitely/not/here/brute"),
            options,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("Program binary not found"));
    }

    #[test]
    fn test_failing_input() {
        let passed = StressOutcome::AllPassed { iterations: 3 };
        assert!(passed.is_success());
        assert_eq!(passed.failing_input(), None);

        let timed_out = StressOutcome::TimedOut {
            iteration: 2,
            role: Role::Brute,
            input: "5\n".to_string(),
        };
        assert!(!timed_out.is_success());
        assert_eq!(timed_out.failing_input(), Some("5\n"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Brute.to_string(), "brute force");
        assert_eq!(Role::Generator.to_string(), "generator");
    }
}
