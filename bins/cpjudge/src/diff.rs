/// Diff Locator
///
/// Finds where two normalized outputs first diverge, by line (with column)
/// and by whitespace token. Equality is tested on case-folded copies when
/// requested; reported text is always the original.

use crate::evaluator::fold;
use cpjudge_common::types::{DiffLocation, TokenDiffLocation, END_OF_OUTPUT};

fn chars_equal(a: char, b: char, case_insensitive: bool) -> bool {
    a == b || (case_insensitive && a.to_lowercase().eq(b.to_lowercase()))
}

/// 1-based column of the first differing character
fn first_diff_column(expected: &str, actual: &str, case_insensitive: bool) -> usize {
    expected
        .chars()
        .zip(actual.chars())
        .take_while(|(a, b)| chars_equal(*a, *b, case_insensitive))
        .count()
        + 1
}

fn lines_equal(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        fold(a) == fold(b)
    } else {
        a == b
    }
}

/// First line where `expected` and `actual` differ; missing lines compare as empty
pub fn first_diff_line(expected: &str, actual: &str, case_insensitive: bool) -> Option<DiffLocation> {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let n = expected_lines.len().max(actual_lines.len());

    (0..n).find_map(|i| {
        let e = expected_lines.get(i).copied().unwrap_or("");
        let a = actual_lines.get(i).copied().unwrap_or("");
        if lines_equal(e, a, case_insensitive) {
            None
        } else {
            Some(DiffLocation {
                line: i + 1,
                column: first_diff_column(e, a, case_insensitive),
                expected_line: e.to_string(),
                actual_line: a.to_string(),
            })
        }
    })
}

/// First whitespace token where the outputs differ; the shorter side reads `<EOF>`
pub fn first_diff_token(expected: &str, actual: &str, case_insensitive: bool) -> Option<TokenDiffLocation> {
    let expected_tokens: Vec<&str> = expected.split_whitespace().collect();
    let actual_tokens: Vec<&str> = actual.split_whitespace().collect();
    let n = expected_tokens.len().max(actual_tokens.len());

    (0..n).find_map(|i| {
        let e = expected_tokens.get(i).copied().unwrap_or(END_OF_OUTPUT);
        let a = actual_tokens.get(i).copied().unwrap_or(END_OF_OUTPUT);
        if lines_equal(e, a, case_insensitive) {
            None
        } else {
            Some(TokenDiffLocation {
                token_index: i + 1,
                expected_token: e.to_string(),
                actual_token: a.to_string(),
            })
        }
    })
}
