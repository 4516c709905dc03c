/// Case Repository
///
/// Finds `<N>.in` files in a tests directory, pairs each with its `<N>.ans`
/// sibling when present and orders them by the numeric value of N.
/// Loading a case reads its input once, applies the header overrides and
/// produces the immutable `TestCase` the controller runs.

use crate::header;
use anyhow::{Context, Result};
use cpjudge_common::layout;
use cpjudge_common::types::TestCase;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A case found on disk, before its input has been read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCase {
    pub id: u64,
    pub input_path: PathBuf,
    pub expected_path: Option<PathBuf>,
    pub output_path: PathBuf,
}

/// A case with effective limits and the raw input text
#[derive(Debug, Clone)]
pub struct LoadedCase {
    pub case: TestCase,
    pub raw_input: String,
}

impl LoadedCase {
    /// Input text with the header block removed
    pub fn body(&self) -> &str {
        header::parse(&self.raw_input).body
    }
}

/// Enumerate cases in ascending numeric order
///
/// An absent or unreadable directory yields no cases; the caller decides
/// whether that is worth reporting.
pub fn discover(dir: &Path) -> Vec<DiscoveredCase> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Tests directory not readable");
            return Vec::new();
        }
    };

    let mut found: Vec<(u64, String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        // Follows symlinks, unlike `DirEntry::file_type`
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            layout::input_case_id(&name).map(|id| (id, name, entry.path()))
        })
        .collect();

    // Name breaks ties so `1.in` wins over `01.in` regardless of listing order
    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.len().cmp(&b.1.len())).then_with(|| a.1.cmp(&b.1)));

    let mut cases: Vec<DiscoveredCase> = Vec::with_capacity(found.len());
    for (id, name, input_path) in found {
        if cases.last().map(|c| c.id) == Some(id) {
            warn!(case_id = id, file = %name, "Duplicate case id, ignoring file");
            continue;
        }
        let answer = layout::answer_path(&input_path);
        cases.push(DiscoveredCase {
            id,
            expected_path: answer.is_file().then_some(answer),
            output_path: layout::output_path(&input_path),
            input_path,
        });
    }

    debug!(dir = %dir.display(), count = cases.len(), "Discovered cases");
    cases
}

/// Read a discovered case and resolve its effective limits
///
/// The input header's time limit overrides `default_time_limit_s` for this
/// case only; a zero value in the header falls back to the default.
pub fn load(discovered: &DiscoveredCase, default_time_limit_s: f64) -> Result<LoadedCase> {
    let bytes = fs::read(&discovered.input_path)
        .with_context(|| format!("Failed to read input {}", discovered.input_path.display()))?;
    let raw_input = String::from_utf8_lossy(&bytes).into_owned();

    let metadata = header::parse(&raw_input).metadata;
    let time_limit_s = metadata
        .time_limit_ms
        .filter(|ms| *ms > 0)
        .map(|ms| ms as f64 / 1000.0)
        .unwrap_or(default_time_limit_s);
    let memory_limit_mb = metadata.memory_limit_mb.unwrap_or(0);

    Ok(LoadedCase {
        case: TestCase {
            id: discovered.id,
            input_path: discovered.input_path.clone(),
            expected_path: discovered.expected_path.clone(),
            output_path: discovered.output_path.clone(),
            time_limit_s,
            memory_limit_mb,
            metadata,
        },
        raw_input,
    })
}
