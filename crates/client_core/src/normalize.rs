//! Cleanup applied to assistant answers before they are rendered.
//!
//! Some answers arrive with their citations pasted inline as a trailing
//! "Sources:" block instead of (or in addition to) the structured `sources`
//! list. That block is dropped here, and inline bullet glyphs are turned into
//! markdown list items. Must run before any markdown rendering.
//!
//! The heading must start on a word boundary, so words that merely end in a
//! heading token ("resources", "footnotes") never trigger the cut.

use std::sync::OnceLock;

use regex::Regex;

/// How far past the heading token the source-like markers are looked for.
const SOURCES_LOOKAHEAD_CHARS: usize = 1200;

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn heading_regex() -> Option<&'static Regex> {
    static HEADING: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &HEADING,
        r"(?i)\b(?:sources and links|sources|references|notes|note)\b\s*[:-]?",
    )
}

fn source_marker_regex() -> Option<&'static Regex> {
    static MARKERS: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&MARKERS, r"(?i)https?://|\[[0-9]+\]|ai synthesis|www\.")
}

fn bullet_regex() -> Option<&'static Regex> {
    static BULLET: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&BULLET, r"\s*•\s*")
}

fn middle_dot_regex() -> Option<&'static Regex> {
    static MIDDLE_DOT: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&MIDDLE_DOT, r"\s*·+\s*")
}

/// Returns the display form of an assistant answer.
pub fn clean_answer(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    let mut working = content.replace("\r\n", "\n").replace('\r', "\n");

    if let Some(cut) = trailing_sources_offset(&working) {
        working.truncate(cut);
        let trimmed_len = working.trim_end().len();
        working.truncate(trimmed_len);
    }

    if working.contains('•') {
        if let Some(bullet) = bullet_regex() {
            working = bullet.replace_all(&working, "\n- ").into_owned();
        }
    }
    if let Some(middle_dot) = middle_dot_regex() {
        working = middle_dot.replace_all(&working, "\n- ").into_owned();
    }

    working.trim().to_string()
}

/// Byte offset of an inline sources block, if the first heading token introduces one.
///
/// Only the first heading is considered: a "Note" early in the answer followed
/// by a URL within the lookahead window drops everything after it.
fn trailing_sources_offset(text: &str) -> Option<usize> {
    let heading = heading_regex()?.find(text)?;
    let start = heading.start();
    let window_end = text[start..]
        .char_indices()
        .nth(SOURCES_LOOKAHEAD_CHARS)
        .map(|(offset, _)| start + offset)
        .unwrap_or(text.len());

    source_marker_regex()?
        .is_match(&text[start..window_end])
        .then_some(start)
}
