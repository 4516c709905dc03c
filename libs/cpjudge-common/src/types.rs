use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Sentinel substituted for the missing side when one output runs out of tokens
pub const END_OF_OUTPUT: &str = "<EOF>";

/// Whitespace handling requested for output comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhitespacePolicy {
    Strict,
    Ignore,
    #[default]
    Auto,
}

impl fmt::Display for WhitespacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitespacePolicy::Strict => write!(f, "strict"),
            WhitespacePolicy::Ignore => write!(f, "ignore"),
            WhitespacePolicy::Auto => write!(f, "auto"),
        }
    }
}

/// Policy actually applied once `Auto` has been resolved against the expected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedPolicy {
    Strict,
    Ignore,
}

impl fmt::Display for ResolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedPolicy::Strict => write!(f, "strict"),
            ResolvedPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// Values found in the leading comment block of a source or input file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMetadata {
    pub problem_name: Option<String>,
    pub time_limit_ms: Option<u64>,
    pub memory_limit_mb: Option<u64>,
}

impl HeaderMetadata {
    pub fn is_empty(&self) -> bool {
        self.problem_name.is_none() && self.time_limit_ms.is_none() && self.memory_limit_mb.is_none()
    }

    /// One-line description used next to the case name, e.g. `Problem: A, TL=1000 ms`
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(name) = &self.problem_name {
            parts.push(format!("Problem: {}", name));
        }
        if let Some(ms) = self.time_limit_ms {
            parts.push(format!("TL={} ms", ms));
        }
        if let Some(mb) = self.memory_limit_mb {
            parts.push(format!("ML={} MB", mb));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// A single numbered case with its effective limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub input_path: PathBuf,
    /// `None` means generate-only: the output is written but never compared
    pub expected_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub time_limit_s: f64,
    /// 0 = unset
    pub memory_limit_mb: u64,
    pub metadata: HeaderMetadata,
}

impl TestCase {
    /// Saturates instead of panicking on limits no `Duration` can hold
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_s).unwrap_or(Duration::MAX)
    }

    pub fn is_graded(&self) -> bool {
        self.expected_path.is_some()
    }
}

/// How a single run of the program under test ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed { exit_code: i32, elapsed_ms: u64 },
    TimedOut { limit_ms: u64 },
    /// Terminated by a signal without an exit code
    Killed { signal: Option<i32>, elapsed_ms: u64 },
    /// The case could not be read or the program could not be started
    NotStarted,
}

impl ExecutionOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { exit_code: 0, .. })
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        match self {
            ExecutionOutcome::Completed { elapsed_ms, .. } => Some(*elapsed_ms),
            ExecutionOutcome::Killed { elapsed_ms, .. } => Some(*elapsed_ms),
            ExecutionOutcome::TimedOut { .. } | ExecutionOutcome::NotStarted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ComparisonResult {
    Pass {
        used_numeric_tolerance: bool,
    },
    Fail {
        normalized_expected: String,
        normalized_actual: String,
        used_numeric_tolerance: bool,
    },
}

impl ComparisonResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, ComparisonResult::Pass { .. })
    }

    pub fn used_numeric_tolerance(&self) -> bool {
        match self {
            ComparisonResult::Pass { used_numeric_tolerance } => *used_numeric_tolerance,
            ComparisonResult::Fail { used_numeric_tolerance, .. } => *used_numeric_tolerance,
        }
    }
}

/// First differing line; `line` and `column` are 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLocation {
    pub line: usize,
    pub column: usize,
    pub expected_line: String,
    pub actual_line: String,
}

/// First differing whitespace-separated token; `token_index` is 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDiffLocation {
    pub token_index: usize,
    pub expected_token: String,
    pub actual_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum InferenceReason {
    ByLineCount,
    ByNonEmptyLineCount,
    ByTokenCount,
    ByLineBlocks { block_size: usize },
    ByTokenBlocks { block_size: usize },
    Unknown,
}

impl fmt::Display for InferenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceReason::ByLineCount => write!(f, "by output line count == t"),
            InferenceReason::ByNonEmptyLineCount => write!(f, "by non-empty line count == t"),
            InferenceReason::ByTokenCount => write!(f, "by output token count == t"),
            InferenceReason::ByLineBlocks { block_size } => {
                write!(f, "by equal line blocks ({}/test)", block_size)
            }
            InferenceReason::ByTokenBlocks { block_size } => {
                write!(f, "by equal token blocks ({}/test)", block_size)
            }
            InferenceReason::Unknown => write!(f, "no leading t or atypical format"),
        }
    }
}

/// Which embedded sub-case of a multi-query input is blamed for a mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtestInference {
    /// 1-based, always within `1..=declared_count`
    pub index: Option<usize>,
    pub reason: InferenceReason,
    pub declared_count: Option<usize>,
}

impl SubtestInference {
    pub fn unknown(declared_count: Option<usize>) -> Self {
        Self {
            index: None,
            reason: InferenceReason::Unknown,
            declared_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionConfidence {
    Exact,
    Approximate { lines_per_test: usize },
    Unavailable,
}

impl fmt::Display for ExtractionConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionConfidence::Exact => write!(f, "exact, block-split"),
            ExtractionConfidence::Approximate { lines_per_test } => {
                write!(f, "approximate, ~{} lines/test", lines_per_test)
            }
            ExtractionConfidence::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Raw input text of one inferred sub-case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtestExtract {
    pub text: String,
    pub confidence: ExtractionConfidence,
}

/// Final verdict of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    WrongAnswer,
    TimeLimitExceeded,
    RuntimeError,
    /// No expected file; output written, excluded from the tally
    GeneratedOnly,
}

impl CaseStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CaseStatus::WrongAnswer | CaseStatus::TimeLimitExceeded | CaseStatus::RuntimeError
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub id: u64,
    pub status: CaseStatus,
    pub outcome: ExecutionOutcome,
    pub problem_name: Option<String>,
    pub stderr: String,
    pub policy: Option<ResolvedPolicy>,
    pub used_numeric_tolerance: bool,
    pub first_diff: Option<DiffLocation>,
    pub first_token_diff: Option<TokenDiffLocation>,
    pub subtest: Option<SubtestInference>,
}

impl CaseReport {
    pub fn new(id: u64, status: CaseStatus, outcome: ExecutionOutcome) -> Self {
        Self {
            id,
            status,
            outcome,
            problem_name: None,
            stderr: String::new(),
            policy: None,
            used_numeric_tolerance: false,
            first_diff: None,
            first_token_diff: None,
            subtest: None,
        }
    }
}

/// Aggregated result of one judge run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub discovered: usize,
    /// Cases skipped because an earlier failure stopped the run
    pub not_run: usize,
    pub cases: Vec<CaseReport>,
}

impl RunSummary {
    pub fn new(discovered: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            discovered,
            not_run: 0,
            cases: Vec::new(),
        }
    }

    pub fn record(&mut self, report: CaseReport) {
        self.cases.push(report);
    }

    pub fn finish(&mut self) {
        self.not_run = self.discovered.saturating_sub(self.cases.len());
        self.finished_at = Some(Utc::now());
    }

    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.cases.iter().filter(|c| c.status.is_failure()).count()
    }

    pub fn generated_only(&self) -> usize {
        self.count(CaseStatus::GeneratedOnly)
    }

    /// Executed cases that had an expected file
    pub fn graded(&self) -> usize {
        self.passed() + self.failed()
    }

    /// True only when every executed case with an expected file matched and nothing was skipped
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.not_run == 0
    }

    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: u64, status: CaseStatus) -> CaseReport {
        CaseReport::new(id, status, ExecutionOutcome::Completed { exit_code: 0, elapsed_ms: 1 })
    }

    #[test]
    fn test_header_summary() {
        let meta = HeaderMetadata {
            problem_name: Some("Theatre Square".to_string()),
            time_limit_ms: Some(1000),
            memory_limit_mb: None,
        };
        assert_eq!(meta.summary().as_deref(), Some("Problem: Theatre Square, TL=1000 ms"));
        assert_eq!(HeaderMetadata::default().summary(), None);
        assert!(HeaderMetadata::default().is_empty());
    }

    #[test]
    fn test_time_limit_never_panics() {
        let mut case = TestCase {
            id: 1,
            input_path: PathBuf::from("1.in"),
            expected_path: None,
            output_path: PathBuf::from("1.out"),
            time_limit_s: 0.25,
            memory_limit_mb: 0,
            metadata: HeaderMetadata::default(),
        };
        assert_eq!(case.time_limit(), Duration::from_millis(250));

        case.time_limit_s = 1e20;
        assert_eq!(case.time_limit(), Duration::MAX);
        case.time_limit_s = f64::NAN;
        assert_eq!(case.time_limit(), Duration::MAX);
    }

    #[test]
    fn test_outcome_is_clean() {
        assert!(ExecutionOutcome::Completed { exit_code: 0, elapsed_ms: 3 }.is_clean());
        assert!(!ExecutionOutcome::Completed { exit_code: 1, elapsed_ms: 3 }.is_clean());
        assert!(!ExecutionOutcome::TimedOut { limit_ms: 1000 }.is_clean());
        assert!(!ExecutionOutcome::Killed { signal: Some(9), elapsed_ms: 3 }.is_clean());
        assert_eq!(ExecutionOutcome::TimedOut { limit_ms: 1000 }.elapsed_ms(), None);
        assert!(!ExecutionOutcome::NotStarted.is_clean());
    }

    #[test]
    fn test_summary_excludes_generated_only() {
        let mut summary = RunSummary::new(3);
        summary.record(report(1, CaseStatus::Passed));
        summary.record(report(2, CaseStatus::GeneratedOnly));
        summary.record(report(3, CaseStatus::Passed));
        summary.finish();

        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.graded(), 2);
        assert_eq!(summary.generated_only(), 1);
        assert!(summary.is_success());
    }

    #[test]
    fn test_summary_stopped_early_is_failure() {
        let mut summary = RunSummary::new(4);
        summary.record(report(1, CaseStatus::Passed));
        summary.record(report(2, CaseStatus::TimeLimitExceeded));
        summary.finish();

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.not_run, 2);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_policy_serializes_lowercase() {
        let json = serde_json::to_string(&WhitespacePolicy::Ignore).unwrap();
        assert_eq!(json, "\"ignore\"");
        let parsed: WhitespacePolicy = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(parsed, WhitespacePolicy::Strict);
    }
}
