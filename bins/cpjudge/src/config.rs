// Judge configuration loading: defaults, JSON file, source header, CLI flags
use crate::header;
use anyhow::{bail, Context, Result};
use cpjudge_common::config::{CleanupPolicy, JudgeConfig};
use cpjudge_common::types::WhitespacePolicy;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming a config file when `--config` is absent
pub const CONFIG_ENV: &str = "JUDGE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "judge.json";
/// Smallest time limit a source header may set
const MIN_TIME_LIMIT_S: f64 = 0.001;
/// Largest accepted time limit (one day)
pub const MAX_TIME_LIMIT_S: f64 = 86_400.0;

/// Load a judge configuration from a JSON file
pub fn load(config_path: &Path) -> Result<JudgeConfig> {
    if !config_path.exists() {
        bail!("Judge config file not found: {}", config_path.display());
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
}

/// Which config file to read, if any: explicit path, then env var, then `judge.json` in `cwd`
pub fn resolve_path(explicit: Option<&Path>, env_value: Option<String>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(value));
    }
    let fallback = cwd.join(DEFAULT_CONFIG_FILE);
    fallback.is_file().then_some(fallback)
}

/// Load with the default lookup order, falling back to built-in defaults
pub fn load_default(explicit: Option<&Path>) -> Result<JudgeConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    match resolve_path(explicit, std::env::var(CONFIG_ENV).ok(), &cwd) {
        Some(path) => {
            let config = load(&path)?;
            info!(path = %path.display(), "Loaded judge config");
            Ok(config)
        }
        None => {
            debug!("No judge config file, using defaults");
            Ok(JudgeConfig::default())
        }
    }
}

/// Adopt the time limit from the program source header as the default
///
/// Returns the adopted limit in milliseconds. A missing source file is not
/// an error; the source only contributes defaults.
pub fn adopt_source_header(config: &mut JudgeConfig, src: &Path) -> Result<Option<u64>> {
    if !src.is_file() {
        debug!(src = %src.display(), "Source file not present, skipping header");
        return Ok(None);
    }
    let bytes = fs::read(src).with_context(|| format!("Failed to read source {}", src.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let adopted = header::parse(&text).metadata.time_limit_ms;
    if let Some(ms) = adopted {
        config.default_time_limit_s = (ms as f64 / 1000.0).max(MIN_TIME_LIMIT_S);
        info!(src = %src.display(), time_limit_ms = ms, "Adopted time limit from source header");
    }
    Ok(adopted)
}

/// Explicit command-line values; `None` / `false` leave the config untouched
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub time_limit_s: Option<f64>,
    pub whitespace: Option<WhitespacePolicy>,
    pub case_insensitive: bool,
    pub numeric_tolerance: Option<f64>,
    pub enforce_memory: bool,
    pub stop_on_fail: bool,
    pub context_lines: Option<usize>,
    pub no_mark_whitespace: bool,
    pub cleanup: Option<CleanupPolicy>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut JudgeConfig) {
        if let Some(t) = self.time_limit_s {
            config.default_time_limit_s = t;
        }
        if let Some(ws) = self.whitespace {
            config.whitespace = ws;
        }
        if let Some(tol) = self.numeric_tolerance {
            config.numeric_tolerance = Some(tol);
        }
        if let Some(context) = self.context_lines {
            config.context_lines = context;
        }
        if let Some(cleanup) = self.cleanup {
            config.cleanup = cleanup;
        }
        config.case_insensitive |= self.case_insensitive;
        config.enforce_memory |= self.enforce_memory;
        config.stop_on_fail |= self.stop_on_fail;
        if self.no_mark_whitespace {
            config.mark_whitespace = false;
        }
    }
}

/// Reject time limits that are not positive or exceed `MAX_TIME_LIMIT_S`
pub fn check_time_limit(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("Time limit must be a positive number of seconds, got {}", seconds);
    }
    if seconds > MAX_TIME_LIMIT_S {
        bail!("Time limit must be at most {} seconds, got {}", MAX_TIME_LIMIT_S, seconds);
    }
    Ok(Duration::from_secs_f64(seconds))
}

pub fn validate(config: &JudgeConfig) -> Result<()> {
    check_time_limit(config.default_time_limit_s)?;
    if let Some(tol) = config.numeric_tolerance {
        if !tol.is_finite() || tol < 0.0 {
            bail!("Numeric tolerance must be a finite non-negative number, got {}", tol);
        }
    }
    Ok(())
}
