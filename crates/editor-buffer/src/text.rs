//! Line splitting and character-column helpers.
//!
//! Columns are counted in `char`s; lines are stored as `String`s, so every slice goes
//! through a char → byte conversion. Pure-ASCII lines take the fast path.

use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n?|\n").expect("line break pattern is valid"));

/// Split `text` into lines.
///
/// With no explicit separator, `\r\n`, `\r` and `\n` all break lines. `N` breaks always
/// produce `N + 1` lines (a trailing separator yields a trailing empty line).
pub(crate) fn split_lines(text: &str, separator: Option<&str>) -> Vec<String> {
    match separator {
        Some(sep) if !sep.is_empty() => text.split(sep).map(str::to_string).collect(),
        _ => LINE_BREAK.split(text).map(str::to_string).collect(),
    }
}

/// Number of `char`s in `text`.
pub(crate) fn char_len(text: &str) -> usize {
    if text.is_ascii() {
        text.len()
    } else {
        text.chars().count()
    }
}

/// Byte offset of character column `ch`, clamped to the end of `text`.
pub(crate) fn byte_offset(text: &str, ch: usize) -> usize {
    if text.is_ascii() {
        return ch.min(text.len());
    }
    text.char_indices()
        .nth(ch)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Characters `[from, to)` of `text` (columns clamped).
pub(crate) fn slice_chars(text: &str, from: usize, to: usize) -> &str {
    let start = byte_offset(text, from);
    let end = byte_offset(text, to.max(from));
    &text[start..end]
}

/// Characters from column `from` to the end of `text`.
pub(crate) fn slice_from(text: &str, from: usize) -> &str {
    &text[byte_offset(text, from)..]
}

/// Characters before column `to`.
pub(crate) fn slice_to(text: &str, to: usize) -> &str {
    &text[..byte_offset(text, to)]
}
