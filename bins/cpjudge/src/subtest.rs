/// Sub-test Inference Engine
///
/// Competitive inputs usually start with a count `t` followed by `t`
/// concatenated sub-cases and no separators. When the aggregate output
/// differs, this module guesses which sub-case is responsible and pulls its
/// raw input out of the file.
///
/// Inference is an ordered list of named rules. Each rule is a pure function
/// of the output shape and the first-difference position; the first one that
/// matches wins. Exact structural matches come before block partitioning,
/// and nothing is guessed when no rule applies.

use cpjudge_common::types::{
    ExtractionConfidence, InferenceReason, SubtestExtract, SubtestInference,
};

/// Shape of the expected output plus where the first difference was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub declared: usize,
    pub line_count: usize,
    pub non_blank_line_count: usize,
    pub token_count: usize,
    /// 1-based
    pub diff_line: Option<usize>,
    /// 1-based
    pub diff_token: Option<usize>,
}

impl Signals {
    pub fn new(declared: usize, expected: &str, diff_line: Option<usize>, diff_token: Option<usize>) -> Self {
        Self {
            declared,
            line_count: expected.lines().count(),
            non_blank_line_count: expected.lines().filter(|l| !l.trim().is_empty()).count(),
            token_count: expected.split_whitespace().count(),
            diff_line,
            diff_token,
        }
    }
}

pub type Rule = fn(&Signals) -> Option<(usize, InferenceReason)>;

/// Evaluated in order; the first match wins
pub const RULES: &[(&str, Rule)] = &[
    ("line_count", by_line_count),
    ("non_blank_line_count", by_non_blank_line_count),
    ("token_count", by_token_count),
    ("line_blocks", by_line_blocks),
    ("token_blocks", by_token_blocks),
];

fn clamp_index(position: usize, declared: usize) -> usize {
    position.clamp(1, declared)
}

fn block_index(position: usize, total: usize, declared: usize) -> Option<(usize, usize)> {
    if total == 0 || total % declared != 0 {
        return None;
    }
    let block_size = total / declared;
    let index = ((position.max(1) - 1) / block_size + 1).min(declared);
    Some((index, block_size))
}

pub fn by_line_count(s: &Signals) -> Option<(usize, InferenceReason)> {
    let line = s.diff_line?;
    (s.line_count == s.declared).then(|| (clamp_index(line, s.declared), InferenceReason::ByLineCount))
}

pub fn by_non_blank_line_count(s: &Signals) -> Option<(usize, InferenceReason)> {
    let line = s.diff_line?;
    (s.non_blank_line_count == s.declared)
        .then(|| (clamp_index(line, s.declared), InferenceReason::ByNonEmptyLineCount))
}

pub fn by_token_count(s: &Signals) -> Option<(usize, InferenceReason)> {
    let token = s.diff_token?;
    (s.token_count == s.declared).then(|| (clamp_index(token, s.declared), InferenceReason::ByTokenCount))
}

pub fn by_line_blocks(s: &Signals) -> Option<(usize, InferenceReason)> {
    let line = s.diff_line?;
    block_index(line, s.line_count, s.declared)
        .map(|(index, block_size)| (index, InferenceReason::ByLineBlocks { block_size }))
}

pub fn by_token_blocks(s: &Signals) -> Option<(usize, InferenceReason)> {
    let token = s.diff_token?;
    block_index(token, s.token_count, s.declared)
        .map(|(index, block_size)| (index, InferenceReason::ByTokenBlocks { block_size }))
}

/// Leading sub-case count: the first whitespace token as a positive integer
pub fn declared_count(input_body: &str) -> Option<usize> {
    let first = input_body.split_whitespace().next()?;
    let value: i64 = first.parse().ok()?;
    usize::try_from(value).ok().filter(|t| *t > 0)
}

/// Infer which sub-case the first difference belongs to
pub fn infer(
    input_body: &str,
    expected_output: &str,
    diff_line: Option<usize>,
    diff_token: Option<usize>,
) -> SubtestInference {
    let Some(declared) = declared_count(input_body) else {
        return SubtestInference::unknown(None);
    };
    let signals = Signals::new(declared, expected_output, diff_line, diff_token);

    RULES
        .iter()
        .find_map(|(_, rule)| rule(&signals))
        .map(|(index, reason)| SubtestInference {
            index: Some(index),
            reason,
            declared_count: Some(declared),
        })
        .unwrap_or_else(|| SubtestInference::unknown(Some(declared)))
}

fn unavailable() -> SubtestExtract {
    SubtestExtract {
        text: String::new(),
        confidence: ExtractionConfidence::Unavailable,
    }
}

/// Raw input of the `index`-th (1-based) sub-case
///
/// The first non-blank line must be the count `t`. If the remaining lines
/// form exactly `t` blank-line-separated blocks the block is returned as
/// exact; otherwise the lines are cut into `t` equal chunks, the last one
/// taking the remainder.
pub fn extract_subtest_input(input_body: &str, index: usize) -> SubtestExtract {
    let lines: Vec<&str> = input_body.lines().collect();
    let Some(start) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return unavailable();
    };
    let declared = match lines[start].trim().parse::<i64>() {
        Ok(t) if t > 0 => t as usize,
        _ => return unavailable(),
    };
    if index == 0 || index > declared {
        return unavailable();
    }
    let rest = &lines[start + 1..];

    let blocks: Vec<&[&str]> = rest
        .split(|l| l.trim().is_empty())
        .filter(|block| !block.is_empty())
        .collect();
    if blocks.len() == declared {
        return SubtestExtract {
            text: blocks[index - 1].join("\n"),
            confidence: ExtractionConfidence::Exact,
        };
    }

    if rest.len() < declared {
        return unavailable();
    }
    let per = rest.len() / declared;
    let from = (index - 1) * per;
    let to = if index == declared { rest.len() } else { from + per };
    SubtestExtract {
        text: rest[from..to].join("\n"),
        confidence: ExtractionConfidence::Approximate { lines_per_test: per },
    }
}
