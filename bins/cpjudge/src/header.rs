/// Header Metadata Parser
///
/// Reads the comment block at the very top of a source or input file:
///
/// ```text
/// /**
///  *  Problem Name: Theatre Square
///  *  Time Limit: 1000 ms
///  *  Memory Limit: 256 MB
///  */
/// ```
///
/// Only a block starting the file (after optional whitespace) counts. Every
/// field is extracted by its own rule so each can be tested alone. The block
/// is cut from the returned body, so header text never reaches comparison or
/// sub-test inference.

use cpjudge_common::types::HeaderMetadata;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEADER_RE: Regex = Regex::new(r"(?s)\A\s*/\*(.*?)\*/").unwrap();
    static ref TIME_RE: Regex = Regex::new(r"(?i)Time\s+Limit:\s*([0-9]+)\s*ms").unwrap();
    static ref MEM_RE: Regex = Regex::new(r"(?i)Memory\s+Limit:\s*([0-9]+)\s*MB").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"(?i)Problem\s+Name:[ \t]*([^\r\n]+)").unwrap();
}

/// Input text split into its header metadata and the remaining body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader<'a> {
    pub metadata: HeaderMetadata,
    pub body: &'a str,
    pub has_header: bool,
}

/// Split `text` into metadata and the de-headered body
pub fn parse(text: &str) -> ParsedHeader<'_> {
    match HEADER_RE.captures(text) {
        Some(caps) => {
            let block = caps.get(1).map_or("", |m| m.as_str());
            let end = caps.get(0).map_or(0, |m| m.end());
            ParsedHeader {
                metadata: parse_block(block),
                body: &text[end..],
                has_header: true,
            }
        }
        None => ParsedHeader {
            metadata: HeaderMetadata::default(),
            body: text,
            has_header: false,
        },
    }
}

/// Apply every extraction rule to the inside of a header block
pub fn parse_block(block: &str) -> HeaderMetadata {
    HeaderMetadata {
        problem_name: problem_name(block),
        time_limit_ms: time_limit_ms(block),
        memory_limit_mb: memory_limit_mb(block),
    }
}

pub fn problem_name(block: &str) -> Option<String> {
    NAME_RE
        .captures(block)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

pub fn time_limit_ms(block: &str) -> Option<u64> {
    TIME_RE.captures(block).and_then(|caps| caps[1].parse().ok())
}

pub fn memory_limit_mb(block: &str) -> Option<u64> {
    MEM_RE.captures(block).and_then(|caps| caps[1].parse().ok())
}
