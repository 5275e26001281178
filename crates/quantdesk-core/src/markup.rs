//! Structured-text rendering for analyst replies.
//!
//! Replies from the agent use a small subset of Markdown: `#`/`##`/`###`
//! headings, `---` dividers, pipe tables, `-`/`*` bullets, `**bold**` spans,
//! and bold signal words such as `**STRONG BUY**`. This module turns that text
//! into typed [`DisplayBlock`]s that any front end can style. It is not a
//! Markdown parser: anything outside the subset degrades to plain text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::signal::Signal;

static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("emphasis pattern is valid"));

// Alternation order matters: the regex engine is leftmost-first, so the
// two-word tokens must precede BUY and SELL.
static SIGNAL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:STRONG BUY|STRONG SELL|BUY|HOLD|SELL)\b")
        .expect("signal pattern is valid")
});

static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-:\s]+$").expect("separator pattern is valid"));

/// A run of inline text, either plain or emphasized (`**...**`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Span {
    Plain(String),
    Emphasized(String),
}

impl Span {
    pub fn text(&self) -> &str {
        match self {
            Span::Plain(text) | Span::Emphasized(text) => text,
        }
    }

    pub fn is_emphasized(&self) -> bool {
        matches!(self, Span::Emphasized(_))
    }
}

/// One rendered line of an analyst reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayBlock {
    Heading { level: u8, text: String },
    Divider,
    TableRow { cells: Vec<String> },
    ListItem { spans: Vec<Span> },
    Callout { signal: Signal, text: String },
    Blank,
    Paragraph { spans: Vec<Span> },
}

/// Split a line into plain and emphasized spans.
///
/// Only balanced `**text**` pairs (with no `*` inside) become emphasis; any
/// other asterisks are kept literally. Empty segments are dropped, so an
/// empty line yields no spans.
pub fn render_inline(line: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    for caps in EMPHASIS.captures_iter(line) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            spans.push(Span::Plain(line[cursor..whole.start()].to_string()));
        }
        spans.push(Span::Emphasized(inner.as_str().to_string()));
        cursor = whole.end();
    }

    if cursor < line.len() {
        spans.push(Span::Plain(line[cursor..].to_string()));
    }

    spans
}

/// Remove every `**` marker, balanced or not.
pub fn strip_emphasis(text: &str) -> String {
    text.replace("**", "")
}

/// Render a full reply into display blocks, one classification per line.
pub fn render_blocks(text: &str) -> Vec<DisplayBlock> {
    let mut blocks = Vec::new();

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        match classify(line) {
            LineMatch::Emit(block) => blocks.push(block),
            LineMatch::Suppress => {}
        }
    }

    blocks
}

enum LineMatch {
    Emit(DisplayBlock),
    /// The rule claimed the line but it renders to nothing (table separators).
    Suppress,
}

type LineRule = fn(&str) -> Option<LineMatch>;

/// Evaluated top to bottom; the first rule returning `Some` wins. Lines no
/// rule claims become paragraphs.
const RULES: &[LineRule] = &[
    heading_1,
    heading_2,
    heading_3,
    divider,
    table_row,
    list_item,
    callout,
    blank,
];

fn classify(line: &str) -> LineMatch {
    RULES
        .iter()
        .find_map(|rule| rule(line))
        .unwrap_or_else(|| {
            LineMatch::Emit(DisplayBlock::Paragraph {
                spans: render_inline(line),
            })
        })
}

fn heading(line: &str, prefix: &str, level: u8) -> Option<LineMatch> {
    line.strip_prefix(prefix).map(|rest| {
        LineMatch::Emit(DisplayBlock::Heading {
            level,
            text: rest.to_string(),
        })
    })
}

fn heading_1(line: &str) -> Option<LineMatch> {
    heading(line, "# ", 1)
}

fn heading_2(line: &str) -> Option<LineMatch> {
    heading(line, "## ", 2)
}

fn heading_3(line: &str) -> Option<LineMatch> {
    heading(line, "### ", 3)
}

fn divider(line: &str) -> Option<LineMatch> {
    line.starts_with("---").then_some(LineMatch::Emit(DisplayBlock::Divider))
}

fn table_row(line: &str) -> Option<LineMatch> {
    if !line.starts_with('|') {
        return None;
    }

    let cells: Vec<String> = line
        .split('|')
        .filter(|cell| !cell.trim().is_empty() && !TABLE_SEPARATOR.is_match(cell))
        .map(|cell| strip_emphasis(cell.trim()))
        .collect();

    if cells.is_empty() {
        Some(LineMatch::Suppress)
    } else {
        Some(LineMatch::Emit(DisplayBlock::TableRow { cells }))
    }
}

fn list_item(line: &str) -> Option<LineMatch> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(|rest| {
            LineMatch::Emit(DisplayBlock::ListItem {
                spans: render_inline(rest),
            })
        })
}

fn callout(line: &str) -> Option<LineMatch> {
    let token = SIGNAL_TOKEN.find(line)?;
    let signal = Signal::from_str(token.as_str())?;
    Some(LineMatch::Emit(DisplayBlock::Callout {
        signal,
        text: strip_emphasis(line),
    }))
}

fn blank(line: &str) -> Option<LineMatch> {
    line.trim()
        .is_empty()
        .then_some(LineMatch::Emit(DisplayBlock::Blank))
}
