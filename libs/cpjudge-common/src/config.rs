// Judge configuration shared by the run controller and the CLI
use crate::types::WhitespacePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TIME_LIMIT_S: f64 = 2.0;
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// What to delete after a fully passing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    None,
    /// Generated `.out` files of graded cases
    #[default]
    Outputs,
    /// Outputs plus the program binary
    All,
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupPolicy::None => write!(f, "none"),
            CleanupPolicy::Outputs => write!(f, "outputs"),
            CleanupPolicy::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Used when neither the source nor the input header sets a time limit
    pub default_time_limit_s: f64,
    pub whitespace: WhitespacePolicy,
    pub case_insensitive: bool,
    pub numeric_tolerance: Option<f64>,
    /// Apply the header memory limit as an address-space cap (POSIX only)
    pub enforce_memory: bool,
    pub stop_on_fail: bool,
    pub context_lines: usize,
    pub mark_whitespace: bool,
    pub cleanup: CleanupPolicy,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            default_time_limit_s: DEFAULT_TIME_LIMIT_S,
            whitespace: WhitespacePolicy::Auto,
            case_insensitive: false,
            numeric_tolerance: None,
            enforce_memory: false,
            stop_on_fail: false,
            context_lines: DEFAULT_CONTEXT_LINES,
            mark_whitespace: true,
            cleanup: CleanupPolicy::Outputs,
        }
    }
}
