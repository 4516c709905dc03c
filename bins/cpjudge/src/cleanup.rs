// Removal of generated artifacts: case outputs and optionally the program binary
use crate::console;
use cpjudge_common::config::CleanupPolicy;
use cpjudge_common::layout;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

fn remove(path: &Path, removed: &mut Vec<PathBuf>) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => removed.push(path.to_path_buf()),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Post-run cleanup after every case passed
///
/// `outputs` should list only graded cases; generate-only outputs are the
/// point of a run without an answer file and are kept.
pub fn after_pass(outputs: &[PathBuf], binary: &Path, policy: CleanupPolicy) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    if policy == CleanupPolicy::None {
        return removed;
    }
    for output in outputs {
        remove(output, &mut removed);
    }
    if policy == CleanupPolicy::All {
        remove(binary, &mut removed);
    }
    removed
}

/// Cleanup-only mode: every `<N>.out` in the tests directory, regardless of results
pub fn clean_directory(tests_dir: &Path, binary: &Path, policy: CleanupPolicy) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    if policy == CleanupPolicy::None {
        return removed;
    }

    let mut outputs: Vec<PathBuf> = fs::read_dir(tests_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| layout::is_output_file(&entry.file_name().to_string_lossy()))
                .map(|entry| entry.path())
                .collect()
        })
        .unwrap_or_default();
    outputs.sort();

    for output in &outputs {
        remove(output, &mut removed);
    }
    if policy == CleanupPolicy::All {
        remove(binary, &mut removed);
    }
    removed
}

/// List removed paths relative to the working directory when possible
pub fn print_removed(removed: &[PathBuf]) {
    if removed.is_empty() {
        console::note("Nothing to clean.");
        return;
    }
    console::ok(&format!("Cleanup removed {} file(s):", removed.len()));
    let cwd = std::env::current_dir().ok();
    for path in removed {
        let shown = cwd
            .as_deref()
            .and_then(|cwd| path.strip_prefix(cwd).ok())
            .unwrap_or(path);
        println!("   • {}", shown.display());
    }
}
