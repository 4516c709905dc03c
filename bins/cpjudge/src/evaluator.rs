/// Output Evaluator - Comparison Logic
///
/// **Core Responsibility:**
/// Decide whether a program's output matches the expected answer.
///
/// **Critical Properties:**
/// - Knows nothing about processes or timeouts beyond the final outcome
/// - Pure functions: (expected text, actual text, policy) → result
///
/// **Normalization Rules:**
/// - Line endings: `\r\n` and `\r` become `\n` under every policy
/// - `Strict`: nothing else changes
/// - `Ignore`: every line is stripped and internal whitespace runs collapse to
///   one space; blank lines at both ends are dropped
/// - `Auto`: `Strict` when the expected text looks whitespace-significant
///   (a tab, trailing whitespace, or a double space), otherwise `Ignore`
/// - Case folding only affects the equality test, never displayed text
///
/// **Numeric tolerance:**
/// Only tried after the normalized texts differ. Token counts must match and
/// each pair of finite numbers may differ by at most the tolerance; anything
/// that is not a number must match textually.

use cpjudge_common::types::{
    CaseStatus, ComparisonResult, ExecutionOutcome, ResolvedPolicy, WhitespacePolicy,
};

/// Result of comparing one case together with the policy that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub policy: ResolvedPolicy,
    pub result: ComparisonResult,
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// True if the expected answer depends on exact spacing
pub fn needs_strict_whitespace(expected: &str) -> bool {
    normalize_line_endings(expected).lines().any(|line| {
        line.contains('\t') || line.ends_with(' ') || line.contains("  ")
    })
}

pub fn resolve_policy(policy: WhitespacePolicy, expected: &str) -> ResolvedPolicy {
    match policy {
        WhitespacePolicy::Strict => ResolvedPolicy::Strict,
        WhitespacePolicy::Ignore => ResolvedPolicy::Ignore,
        WhitespacePolicy::Auto => {
            if needs_strict_whitespace(expected) {
                ResolvedPolicy::Strict
            } else {
                ResolvedPolicy::Ignore
            }
        }
    }
}

pub fn normalize(text: &str, policy: ResolvedPolicy) -> String {
    let text = normalize_line_endings(text);
    match policy {
        ResolvedPolicy::Strict => text,
        ResolvedPolicy::Ignore => {
            let collapsed = text
                .split('\n')
                .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\n");
            let trimmed = collapsed.trim();
            if trimmed.is_empty() {
                String::new()
            } else {
                format!("{}\n", trimmed)
            }
        }
    }
}

/// Case folding used for every case-insensitive equality test
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

pub fn texts_equal(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        fold(a) == fold(b)
    } else {
        a == b
    }
}

/// Token-wise comparison where finite numbers may differ by `tolerance`
pub fn nearly_equal_numeric(expected: &str, actual: &str, tolerance: f64, case_insensitive: bool) -> bool {
    let expected_tokens: Vec<&str> = expected.split_whitespace().collect();
    let actual_tokens: Vec<&str> = actual.split_whitespace().collect();
    if expected_tokens.len() != actual_tokens.len() {
        return false;
    }

    expected_tokens.iter().zip(&actual_tokens).all(|(e, a)| {
        match (e.parse::<f64>(), a.parse::<f64>()) {
            (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => (x - y).abs() <= tolerance,
            _ => texts_equal(e, a, case_insensitive),
        }
    })
}

/// Compare expected and actual output under the requested policy
pub fn compare(
    expected: &str,
    actual: &str,
    policy: WhitespacePolicy,
    case_insensitive: bool,
    numeric_tolerance: Option<f64>,
) -> Comparison {
    let policy = resolve_policy(policy, expected);
    let normalized_expected = normalize(expected, policy);
    let normalized_actual = normalize(actual, policy);

    if texts_equal(&normalized_expected, &normalized_actual, case_insensitive) {
        return Comparison {
            policy,
            result: ComparisonResult::Pass { used_numeric_tolerance: false },
        };
    }

    let result = match numeric_tolerance {
        Some(tolerance)
            if nearly_equal_numeric(&normalized_expected, &normalized_actual, tolerance, case_insensitive) =>
        {
            ComparisonResult::Pass { used_numeric_tolerance: true }
        }
        tolerance => ComparisonResult::Fail {
            normalized_expected,
            normalized_actual,
            used_numeric_tolerance: tolerance.is_some(),
        },
    };
    Comparison { policy, result }
}

/// Final status of a case
///
/// Priority:
/// 1. Timeouts
/// 2. Runtime errors (non-zero exit or signal)
/// 3. Missing expected file (generate-only)
/// 4. Output comparison
pub fn verdict(outcome: &ExecutionOutcome, comparison: Option<&ComparisonResult>) -> CaseStatus {
    match outcome {
        ExecutionOutcome::TimedOut { .. } => CaseStatus::TimeLimitExceeded,
        ExecutionOutcome::Killed { .. } | ExecutionOutcome::NotStarted => CaseStatus::RuntimeError,
        ExecutionOutcome::Completed { exit_code, .. } if *exit_code != 0 => CaseStatus::RuntimeError,
        ExecutionOutcome::Completed { .. } => match comparison {
            None => CaseStatus::GeneratedOnly,
            Some(result) if result.is_pass() => CaseStatus::Passed,
            Some(_) => CaseStatus::WrongAnswer,
        },
    }
}
