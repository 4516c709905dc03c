use std::path::{Path, PathBuf};

/// Case file naming semantics - defines only the convention, not discovery logic
/// Keeps the repository, the controller and cleanup agreeing on `<N>.in` / `<N>.ans` / `<N>.out`

pub const INPUT_EXT: &str = "in";
pub const ANSWER_EXT: &str = "ans";
pub const OUTPUT_EXT: &str = "out";

/// Parse the numeric stem of a case file name with the given extension
/// Only names made entirely of ASCII digits before the extension qualify
pub fn case_stem<'a>(file_name: &'a str, ext: &str) -> Option<&'a str> {
    let stem = file_name.strip_suffix(ext)?.strip_suffix('.')?;
    if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
        Some(stem)
    } else {
        None
    }
}

/// Numeric id of an input file name such as `12.in`
pub fn input_case_id(file_name: &str) -> Option<u64> {
    case_stem(file_name, INPUT_EXT)?.parse().ok()
}

/// Sibling path sharing the stem of `input` with another extension
pub fn sibling(input: &Path, ext: &str) -> PathBuf {
    input.with_extension(ext)
}

pub fn answer_path(input: &Path) -> PathBuf {
    sibling(input, ANSWER_EXT)
}

pub fn output_path(input: &Path) -> PathBuf {
    sibling(input, OUTPUT_EXT)
}

/// True for generated output files (`<digits>.out`)
pub fn is_output_file(file_name: &str) -> bool {
    case_stem(file_name, OUTPUT_EXT).is_some()
}
