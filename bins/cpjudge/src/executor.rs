/// Run Controller - High-Level Orchestration
///
/// **Responsibility:**
/// Sequence discovery, execution, comparison and diagnostics across every
/// case and aggregate the verdicts.
///
/// **Architecture:**
/// 1. Repository discovers and loads cases (repository.rs, header.rs)
/// 2. ProcessEngine runs the binary once per case (engine.rs)
/// 3. Evaluator compares outputs and assigns the verdict (evaluator.rs)
/// 4. On mismatch: diff locator, sub-test inference, side-by-side render
/// 5. Cleanup after a fully passing run (cleanup.rs)
///
/// Cases run strictly one after another: they share the binary and the
/// output naming convention. The summary is the only mutable state.

use crate::cleanup;
use crate::console;
use crate::diff::{first_diff_line, first_diff_token};
use crate::engine::{signal_hint, ProcessEngine, RunOutput};
use crate::evaluator::{self, Comparison};
use crate::render::{self, RenderConfig};
use crate::repository::{self, DiscoveredCase, LoadedCase};
use crate::subtest;
use anyhow::{bail, Context, Result};
use cpjudge_common::config::{CleanupPolicy, JudgeConfig};
use cpjudge_common::layout;
use cpjudge_common::types::{
    CaseReport, CaseStatus, ComparisonResult, ExecutionOutcome, ExtractionConfidence, RunSummary,
    WhitespacePolicy,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

pub struct Judge {
    engine: ProcessEngine,
    tests_dir: PathBuf,
    config: JudgeConfig,
    render: RenderConfig,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a text file lossily; a missing file reads as empty
fn read_lossy(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Cases with an answer file left unrun after the first `executed` cases
fn skipped_graded(cases: &[DiscoveredCase], executed: usize) -> usize {
    cases
        .iter()
        .skip(executed)
        .filter(|c| c.expected_path.is_some())
        .count()
}

impl Judge {
    /// Fails before any case runs when the binary or the tests directory is missing
    pub fn new(binary: &Path, tests_dir: &Path, config: JudgeConfig, render: RenderConfig) -> Result<Self> {
        let engine = ProcessEngine::new(binary, config.enforce_memory)?;
        if !tests_dir.is_dir() {
            bail!("Tests directory not found: {}", tests_dir.display());
        }
        Ok(Self {
            engine,
            tests_dir: tests_dir.to_path_buf(),
            config,
            render,
        })
    }

    /// Judge every discovered case in ascending id order
    pub async fn run_all(&self) -> Result<RunSummary> {
        let cases = repository::discover(&self.tests_dir);
        if cases.is_empty() {
            console::caution(&format!(
                "No tests like {0}/1.in, {0}/2.in … found",
                self.tests_dir.display()
            ));
            let mut summary = RunSummary::new(0);
            summary.finish();
            return Ok(summary);
        }

        let ids: Vec<String> = cases.iter().map(|c| c.id.to_string()).collect();
        console::note(&format!("Discovered: {}", ids.join(", ")));
        info!(
            tests_dir = %self.tests_dir.display(),
            case_count = cases.len(),
            time_limit_s = self.config.default_time_limit_s,
            whitespace = %self.config.whitespace,
            "Starting run"
        );

        let mut summary = RunSummary::new(cases.len());
        for discovered in &cases {
            let report = self.judge_case(discovered).await;
            let failed = report.status.is_failure();
            summary.record(report);

            if failed && self.config.stop_on_fail {
                let remaining = cases.len() - summary.cases.len();
                if remaining > 0 {
                    console::caution(&format!("Stopping after first failure; {} case(s) not run", remaining));
                }
                break;
            }
        }
        summary.finish();

        let graded_outputs: Vec<PathBuf> = cases
            .iter()
            .filter(|c| c.expected_path.is_some())
            .map(|c| c.output_path.clone())
            .collect();
        self.conclude(&summary, &graded_outputs, skipped_graded(&cases, summary.cases.len()));
        Ok(summary)
    }

    /// `skipped_graded` counts cases with an answer file that stop-on-fail never ran
    fn conclude(&self, summary: &RunSummary, graded_outputs: &[PathBuf], skipped_graded: usize) {
        println!();
        let passed = summary.passed();
        let graded = summary.graded() + skipped_graded;
        let generated = summary.generated_only();
        let generated_note = if generated > 0 {
            format!(" ({} generate-only)", generated)
        } else {
            String::new()
        };

        info!(
            passed,
            failed = summary.failed(),
            generated_only = generated,
            not_run = summary.not_run,
            "Run finished"
        );

        if summary.is_success() {
            console::ok(&format!("All {}/{} test(s) passed.{}", passed, graded, generated_note));
            if self.config.cleanup != CleanupPolicy::None {
                console::step(&format!("Cleanup (post-pass): {}", self.config.cleanup));
                let removed = cleanup::after_pass(graded_outputs, self.engine.binary(), self.config.cleanup);
                cleanup::print_removed(&removed);
            }
            return;
        }

        let line = format!("Summary: {}/{} passed.{}", passed, graded, generated_note);
        if passed == 0 {
            console::fail(&line);
        } else {
            console::caution(&line);
        }
        if self.config.cleanup != CleanupPolicy::None {
            console::caution(&format!(
                "Skipping cleanup because not all tests passed. To clean anyway run: cpjudge clean --cleanup {}",
                self.config.cleanup
            ));
        }
    }

    /// Run and judge one case, printing its diagnostics
    ///
    /// Unreadable case files and spawn failures fail this case only.
    #[instrument(skip(self, discovered), fields(case_id = discovered.id))]
    pub async fn judge_case(&self, discovered: &DiscoveredCase) -> CaseReport {
        match self.try_judge_case(discovered).await {
            Ok(report) => report,
            Err(e) => {
                let detail = format!("{:#}", e);
                console::fail(&format!(
                    "Runtime error on {}: {}",
                    file_name(&discovered.input_path),
                    detail
                ));
                warn!(case_id = discovered.id, error = %detail, "Case could not be run");
                let mut report = CaseReport::new(discovered.id, CaseStatus::RuntimeError, ExecutionOutcome::NotStarted);
                report.stderr = detail;
                report
            }
        }
    }

    async fn try_judge_case(&self, discovered: &DiscoveredCase) -> Result<CaseReport> {
        let loaded = repository::load(discovered, self.config.default_time_limit_s)?;
        let case = &loaded.case;
        let input_name = file_name(&case.input_path);

        let extra = case
            .metadata
            .summary()
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();
        console::step(&format!("Test #{}: {}{}", case.id, input_name, extra));
        if !case.is_graded() {
            console::caution(&format!(
                "Missing expected file: {}. Generating {} only.",
                file_name(&layout::answer_path(&case.input_path)),
                file_name(&case.output_path)
            ));
        }

        let run = self.engine.run_case(case).await?;
        let mut report = CaseReport::new(case.id, CaseStatus::RuntimeError, run.outcome);
        report.problem_name = case.metadata.problem_name.clone();
        report.stderr = run.stderr.clone();

        match run.outcome {
            ExecutionOutcome::TimedOut { .. } => {
                // Partial output on disk is never compared
                report.status = evaluator::verdict(&run.outcome, None);
                console::fail(&format!("TLE (> {:.2}s) on {}", case.time_limit_s, input_name));
                warn!(case_id = case.id, time_limit_s = case.time_limit_s, "Case timed out");
            }
            ExecutionOutcome::Completed { exit_code, .. } if exit_code != 0 => {
                report.status = evaluator::verdict(&run.outcome, None);
                console::fail(&format!(
                    "Runtime error on {} (exit {}). See stderr below.",
                    input_name, exit_code
                ));
                self.print_stderr(&run);
            }
            ExecutionOutcome::Killed { signal, .. } => {
                report.status = evaluator::verdict(&run.outcome, None);
                let detail = match signal {
                    Some(sig) => match signal_hint(sig) {
                        Some(hint) => format!("signal {}: {}", sig, hint),
                        None => format!("signal {}", sig),
                    },
                    None => "terminated".to_string(),
                };
                console::fail(&format!("Runtime error on {} ({}). See stderr below.", input_name, detail));
                self.print_stderr(&run);
            }
            ExecutionOutcome::NotStarted => {
                report.status = evaluator::verdict(&run.outcome, None);
            }
            ExecutionOutcome::Completed { elapsed_ms, .. } => {
                if let Err(e) = self.judge_output(&loaded, &mut report, elapsed_ms) {
                    let detail = format!("{:#}", e);
                    console::fail(&format!("Could not judge {}: {}", input_name, detail));
                    warn!(case_id = case.id, error = %detail, "Output could not be compared");
                    report.status = CaseStatus::RuntimeError;
                    report.stderr = format!("{}{}\n", run.stderr, detail);
                }
                if !run.stderr.trim().is_empty() {
                    console::caution("Stderr:");
                    console::block(&run.stderr);
                }
            }
        }

        info!(case_id = case.id, status = ?report.status, "Case judged");
        Ok(report)
    }

    fn print_stderr(&self, run: &RunOutput) {
        if !run.stderr.trim().is_empty() {
            console::block(&run.stderr);
        }
    }

    /// Compare a cleanly finished run against its answer file
    fn judge_output(&self, loaded: &LoadedCase, report: &mut CaseReport, elapsed_ms: u64) -> Result<()> {
        let case = &loaded.case;
        let actual = read_lossy(&case.output_path)?;

        let Some(expected_path) = &case.expected_path else {
            report.status = evaluator::verdict(&report.outcome, None);
            console::ok(&format!(
                "Wrote {} [{} ms]. (Skipped compare)",
                file_name(&case.output_path),
                elapsed_ms
            ));
            return Ok(());
        };
        let expected = read_lossy(expected_path)?;

        let Comparison { policy, result } = evaluator::compare(
            &expected,
            &actual,
            self.config.whitespace,
            self.config.case_insensitive,
            self.config.numeric_tolerance,
        );
        report.policy = Some(policy);
        report.used_numeric_tolerance = result.used_numeric_tolerance();
        report.status = evaluator::verdict(&report.outcome, Some(&result));

        let ignore_case = if self.config.case_insensitive { " + ignore-case" } else { "" };
        let auto = if self.config.whitespace == WhitespacePolicy::Auto {
            render::paint(" (auto)", render::Style::Dim, &self.render)
        } else {
            String::new()
        };
        console::note(&format!("Compare mode: {}{}{}", policy, ignore_case, auto));

        match result {
            ComparisonResult::Pass { used_numeric_tolerance } => {
                let tol = match (used_numeric_tolerance, self.config.numeric_tolerance) {
                    (true, Some(tol)) => format!(" • tol={}", tol),
                    _ => String::new(),
                };
                console::ok(&format!("PASS [{} ms]{}", elapsed_ms, tol));
            }
            ComparisonResult::Fail {
                normalized_expected,
                normalized_actual,
                ..
            } => {
                self.explain_mismatch(loaded, report, &normalized_expected, &normalized_actual, elapsed_ms);
            }
        }
        Ok(())
    }

    /// First difference, sub-test blame and the side-by-side diff
    fn explain_mismatch(
        &self,
        loaded: &LoadedCase,
        report: &mut CaseReport,
        expected: &str,
        actual: &str,
        elapsed_ms: u64,
    ) {
        let ci = self.config.case_insensitive;
        let line_diff = first_diff_line(expected, actual, ci);
        let token_diff = first_diff_token(expected, actual, ci);

        if let Some(loc) = &line_diff {
            let (left, right) = render::highlight_pair(&loc.expected_line, &loc.actual_line, ci, true, &self.render);
            console::note(&format!("First diff at line {}, col {}", loc.line, loc.column));
            println!("{}{}", render::paint("expected: ", render::Style::Heading, &self.render), left);
            println!("{}{}", render::paint("     got: ", render::Style::Heading, &self.render), right);
        }
        if let Some(tok) = &token_diff {
            console::note(&format!(
                "Token mismatch at token #{}: got={} expected={}",
                tok.token_index, tok.actual_token, tok.expected_token
            ));
            console::note(&format!(
                "Token counts: got={}, expected={}",
                actual.split_whitespace().count(),
                expected.split_whitespace().count()
            ));
        }

        let body = loaded.body();
        let inference = subtest::infer(
            body,
            expected,
            line_diff.as_ref().map(|d| d.line),
            token_diff.as_ref().map(|d| d.token_index),
        );

        let mut head = format!("FAIL on {} [{} ms]", file_name(&loaded.case.input_path), elapsed_ms);
        if let Some(index) = inference.index {
            head.push_str(&format!(" • inferred sub-test #{} ({})", index, inference.reason));
        }
        console::fail(&head);

        match inference.index {
            Some(index) => {
                let extract = subtest::extract_subtest_input(body, index);
                if extract.confidence == ExtractionConfidence::Unavailable || extract.text.is_empty() {
                    console::caution(&format!(
                        "Could not extract sub-test #{} input precisely ({}).",
                        index, extract.confidence
                    ));
                    warn!(case_id = loaded.case.id, index, "Sub-test extraction failed");
                } else {
                    console::heading(&format!("\n🔎 Sub-test #{} input ({}):", index, extract.confidence));
                    for (i, line) in extract.text.lines().enumerate() {
                        println!("{:>4}:  {}", i + 1, line);
                    }
                }
            }
            None => console::note("Sub-test could not be inferred (no leading t or atypical format)."),
        }

        console::heading("\n≣ Side-by-side diff");
        print!("{}", render::render_side_by_side(expected, actual, ci, &self.render));

        report.first_diff = line_diff;
        report.first_token_diff = token_diff;
        report.subtest = Some(inference);
    }
}

/// Persist the run summary as pretty JSON
pub fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
    info!(path = %path.display(), "Wrote run report");
    Ok(())
}
