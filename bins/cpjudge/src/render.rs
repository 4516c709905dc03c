/// Side-by-Side Renderer
///
/// EXPECTED on the left, YOUR OUTPUT on the right, separated by a fixed
/// `│` gutter. Padding and truncation count visible columns only, so ANSI
/// styling never shifts the gutter. Inside a differing line pair a
/// character-level changeset splits the text into equal / replace / delete /
/// insert spans: equal spans are dimmed, expected-only text is green,
/// actual-only text red.
///
/// All styling decisions come from `RenderConfig`, resolved once at startup.

use crate::evaluator::fold;
use colored::Colorize;
use difference::{Changeset, Difference};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::IsTerminal;
use std::ops::Range;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const DEFAULT_WIDTH: usize = 120;
const GUTTER: &str = " │ ";
const LINE_NUMBER_WIDTH: usize = 5;
const MIN_COLUMN_WIDTH: usize = 20;
const TAB_WIDTH: usize = 8;
/// Line pairs larger than this (chars × chars) are shown as one replaced span
const MAX_ALIGN_CELLS: usize = 4_000_000;
const RESET: &str = "\x1b[0m";

lazy_static! {
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").unwrap();
}

/// Rendering capabilities and preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub color: bool,
    pub mark_whitespace: bool,
    pub context_lines: usize,
    /// Terminal columns
    pub width: usize,
}

impl RenderConfig {
    /// Probe the terminal once; `NO_COLOR` and non-tty stdout disable color
    pub fn detect(mark_whitespace: bool, context_lines: usize, no_color: bool) -> Self {
        let color = !no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
        Self {
            color,
            mark_whitespace,
            context_lines,
            width: terminal_width(),
        }
    }

    #[cfg(test)]
    pub fn plain(width: usize) -> Self {
        Self {
            color: false,
            mark_whitespace: false,
            context_lines: 3,
            width,
        }
    }
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|cols| *cols > 0)
        .or_else(ioctl_width)
        .unwrap_or(DEFAULT_WIDTH)
}

#[cfg(unix)]
fn ioctl_width() -> Option<usize> {
    // SAFETY: TIOCGWINSZ only writes into the provided winsize
    let mut size: libc::winsize = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut size) };
    (rc == 0 && size.ws_col > 0).then_some(size.ws_col as usize)
}

#[cfg(not(unix))]
fn ioctl_width() -> Option<usize> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Dim,
    Expected,
    Actual,
    Heading,
}

pub fn paint(text: &str, style: Style, cfg: &RenderConfig) -> String {
    if !cfg.color || text.is_empty() {
        return text.to_string();
    }
    match style {
        Style::Dim => text.dimmed().to_string(),
        Style::Expected => text.black().on_green().bold().to_string(),
        Style::Actual => text.bright_white().on_red().bold().to_string(),
        Style::Heading => text.white().bold().to_string(),
    }
}

fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Terminal columns occupied by `text`, escape sequences excluded
fn visible_width(text: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(text).as_str())
}

fn pad_visible(text: &str, width: usize) -> String {
    let pad = width.saturating_sub(visible_width(text));
    format!("{}{}", text, " ".repeat(pad))
}

/// Cut to at most `max` visible columns, keeping escape sequences intact
fn truncate_visible(text: &str, max: usize) -> String {
    if visible_width(text) <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    let mut styled = false;
    let mut i = 0;
    while i < text.len() {
        if let Some(m) = ANSI_RE.find_at(text, i).filter(|m| m.start() == i) {
            out.push_str(m.as_str());
            styled = true;
            i = m.end();
            continue;
        }
        let Some(ch) = text[i..].chars().next() else {
            break;
        };
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > max {
            break;
        }
        out.push(ch);
        used += w;
        i += ch.len_utf8();
    }
    if styled {
        out.push_str(RESET);
    }
    out
}

/// Replace tabs with spaces up to the next tab stop
///
/// A raw tab has no width of its own, the terminal decides where it lands,
/// so unmarked tabs would push the gutter out of line.
fn expand_tabs(line: &str) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + TAB_WIDTH);
    let mut column = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let fill = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(fill));
            column += fill;
        } else {
            out.push(ch);
            column += UnicodeWidthChar::width(ch).unwrap_or(0);
        }
    }
    out
}

fn glyph(ch: char) -> char {
    match ch {
        ' ' => '·',
        '\t' => '⇥',
        other => other,
    }
}

fn show(chars: &[char], mark_whitespace: bool) -> String {
    if mark_whitespace {
        chars.iter().map(|c| glyph(*c)).collect()
    } else {
        chars.iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// One aligned span: `a` indexes the expected side, `b` the actual side
#[derive(Debug, Clone, PartialEq, Eq)]
struct Opcode {
    op: Op,
    a: Range<usize>,
    b: Range<usize>,
}

fn change_op(a: &Range<usize>, b: &Range<usize>) -> Op {
    match (a.is_empty(), b.is_empty()) {
        (false, false) => Op::Replace,
        (false, true) => Op::Delete,
        _ => Op::Insert,
    }
}

/// Lowercase one char without changing the char count
fn fold_char(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

/// Append a span, merging it into the previous one of the same kind
fn push_span(opcodes: &mut Vec<Opcode>, equal: bool, a: Range<usize>, b: Range<usize>) {
    if let Some(last) = opcodes.last_mut() {
        if (last.op == Op::Equal) == equal {
            last.a.end = a.end;
            last.b.end = b.end;
            if !equal {
                last.op = change_op(&last.a, &last.b);
            }
            return;
        }
    }
    let op = if equal { Op::Equal } else { change_op(&a, &b) };
    opcodes.push(Opcode { op, a, b });
}

/// Character alignment of two lines as opcodes over char indices
fn align(a: &[char], b: &[char], case_insensitive: bool) -> Vec<Opcode> {
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }
    if a.len().saturating_mul(b.len()) > MAX_ALIGN_CELLS {
        let (whole_a, whole_b) = (0..a.len(), 0..b.len());
        return vec![Opcode { op: change_op(&whole_a, &whole_b), a: whole_a, b: whole_b }];
    }

    let key = |chars: &[char]| -> String {
        chars
            .iter()
            .map(|&c| if case_insensitive { fold_char(c) } else { c })
            .collect()
    };
    let changeset = Changeset::new(&key(a), &key(b), "");

    let mut opcodes = Vec::new();
    let (mut i, mut j) = (0, 0);
    for diff in &changeset.diffs {
        let (len_a, len_b, equal) = match diff {
            Difference::Same(x) => {
                let n = x.chars().count();
                (n, n, true)
            }
            Difference::Rem(x) => (x.chars().count(), 0, false),
            Difference::Add(x) => (0, x.chars().count(), false),
        };
        if len_a == 0 && len_b == 0 {
            continue;
        }
        push_span(&mut opcodes, equal, i..i + len_a, j..j + len_b);
        i += len_a;
        j += len_b;
    }
    opcodes
}

/// Style a differing line pair span by span
pub fn highlight_pair(
    expected: &str,
    actual: &str,
    case_insensitive: bool,
    mark_whitespace: bool,
    cfg: &RenderConfig,
) -> (String, String) {
    let a: Vec<char> = expected.chars().collect();
    let b: Vec<char> = actual.chars().collect();
    let mut left = String::new();
    let mut right = String::new();

    for opcode in align(&a, &b, case_insensitive) {
        let seg_a = show(&a[opcode.a.clone()], mark_whitespace);
        let seg_b = show(&b[opcode.b.clone()], mark_whitespace);
        match opcode.op {
            Op::Equal => {
                left.push_str(&paint(&seg_a, Style::Dim, cfg));
                right.push_str(&paint(&seg_b, Style::Dim, cfg));
            }
            Op::Replace | Op::Delete | Op::Insert => {
                left.push_str(&paint(&seg_a, Style::Expected, cfg));
                right.push_str(&paint(&seg_b, Style::Actual, cfg));
            }
        }
    }
    (left, right)
}

fn lines_differ(e: &str, a: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        fold(e) != fold(a)
    } else {
        e != a
    }
}

/// Two-column diff limited to `context_lines` around the differing range
pub fn render_side_by_side(expected: &str, actual: &str, case_insensitive: bool, cfg: &RenderConfig) -> String {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let n = expected_lines.len().max(actual_lines.len());
    let line_at = |lines: &[&str], i: usize| lines.get(i).copied().unwrap_or("").to_string();

    let differing: Vec<usize> = (0..n)
        .filter(|&i| lines_differ(&line_at(&expected_lines, i), &line_at(&actual_lines, i), case_insensitive))
        .collect();
    let (Some(&first), Some(&last)) = (differing.first(), differing.last()) else {
        return format!("{}\n", paint("No differences.", Style::Dim, cfg));
    };

    let start = first.saturating_sub(cfg.context_lines);
    let end = (last + cfg.context_lines).min(n - 1);

    let column_width = MIN_COLUMN_WIDTH
        .max(cfg.width.saturating_sub(GUTTER.chars().count() + (LINE_NUMBER_WIDTH + 1) * 2) / 2);
    let rule = paint(&"—".repeat(cfg.width), Style::Dim, cfg);

    let mut out = Vec::with_capacity(end - start + 4);
    out.push(format!(
        "{:>nw$} {}{}{:>nw$} {}",
        "",
        pad_visible(&paint("EXPECTED", Style::Heading, cfg), column_width),
        GUTTER,
        "",
        paint("YOUR OUTPUT", Style::Heading, cfg),
        nw = LINE_NUMBER_WIDTH,
    ));
    out.push(rule.clone());

    for i in start..=end {
        let mut left_raw = line_at(&expected_lines, i);
        let mut right_raw = line_at(&actual_lines, i);
        if !cfg.mark_whitespace {
            left_raw = expand_tabs(&left_raw);
            right_raw = expand_tabs(&right_raw);
        }

        let (left, right) = if lines_differ(&left_raw, &right_raw, case_insensitive) {
            highlight_pair(&left_raw, &right_raw, case_insensitive, cfg.mark_whitespace, cfg)
        } else {
            let l: Vec<char> = left_raw.chars().collect();
            let r: Vec<char> = right_raw.chars().collect();
            (
                paint(&show(&l, cfg.mark_whitespace), Style::Dim, cfg),
                paint(&show(&r, cfg.mark_whitespace), Style::Dim, cfg),
            )
        };

        let left = pad_visible(&truncate_visible(&left, column_width), column_width);
        let right = truncate_visible(&right, column_width);
        out.push(format!(
            "{:>nw$} {}{}{:>nw$} {}",
            i + 1,
            left,
            GUTTER,
            i + 1,
            right,
            nw = LINE_NUMBER_WIDTH,
        ));
    }

    out.push(rule);
    format!("{}\n", out.join("\n"))
}
