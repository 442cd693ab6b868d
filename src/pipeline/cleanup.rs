//! Deterministic cleanup of recognized page text before chunking.
//!
//! OCR output is full of layout noise: runs of spaces from justified text,
//! blank lines between paragraphs, and words hyphenated across line breaks.
//! None of that should reach the synthesizer. The rules below are applied
//! exactly once, in this order:
//!
//! 1. Collapse runs of horizontal whitespace to one space
//! 2. Collapse runs of newlines (and the blanks around them) to one newline
//! 3. Rejoin hyphenated breaks: `exam-\nple` and `exam- ple` → `example`
//! 4. Flatten the remaining newlines to spaces
//! 5. Trim
//!
//! The pass is lossy and not reversible.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the concatenated page text.
pub fn clean_text(input: &str) -> String {
    let s = collapse_spaces(input);
    let s = collapse_newlines(&s);
    let s = rejoin_hyphenated(&s);
    let s = flatten_newlines(&s);
    s.trim().to_string()
}

// ── Rule 1: Horizontal whitespace ────────────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());

fn collapse_spaces(input: &str) -> String {
    RE_SPACES.replace_all(input, " ").to_string()
}

// ── Rule 2: Newline runs ─────────────────────────────────────────────────────

static RE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r" ?\n[\n ]*").unwrap());

fn collapse_newlines(input: &str) -> String {
    RE_NEWLINES.replace_all(input, "\n").to_string()
}

// ── Rule 3: Hyphenated line breaks ───────────────────────────────────────────

static RE_HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-[ \n]+(\w)").unwrap());

/// Repeats until stable: neighbouring breaks such as `a-\nb-\nc` share a
/// letter, and one `replace_all` pass only joins the first of them.
fn rejoin_hyphenated(input: &str) -> String {
    let mut text = input.to_string();
    loop {
        let joined = RE_HYPHEN_BREAK.replace_all(&text, "${1}${2}").into_owned();
        if joined == text {
            return text;
        }
        text = joined;
    }
}

// ── Rule 4: Flatten newlines ─────────────────────────────────────────────────

fn flatten_newlines(input: &str) -> String {
    input.replace('\n', " ")
}
