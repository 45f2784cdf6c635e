//! Response extraction
//!
//! Completion output is free text. SQL is recovered in stages, each usable
//! on its own:
//! 1. `fenced_block` - content of the first markdown code fence
//! 2. `statement_tail` - text from the first statement keyword, cut before
//!    trailing prose
//! 3. `clean` - fence residue, trailing terminator and whitespace cleanup

use crate::generator::prompt::INSUFFICIENT_SCHEMA;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED: Regex = Regex::new(r"(?is)```(?:sql)?\s*(.*?)\s*```").unwrap();
    static ref FENCE_MARKER: Regex = Regex::new(r"(?i)```(?:sql)?").unwrap();
    static ref LINE_STARTER: Regex =
        Regex::new(r"(?m)^[ \t]*(SELECT|WITH|INSERT|UPDATE|DELETE)\b").unwrap();
    static ref ANY_STARTER: Regex = Regex::new(r"(?i)\b(SELECT|WITH|INSERT|UPDATE|DELETE)\b").unwrap();
    static ref PROSE_BREAK: Regex =
        Regex::new(r"\n[ \t]*\n\s*(?:Note:|Explanation:|[A-Z][a-z])").unwrap();
    static ref HORIZONTAL_WS: Regex = Regex::new(r"[ \t]+").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n\s*\n").unwrap();
}

/// SQL contained in a completion, or `None` when there is none
pub fn extract_sql(response: &str) -> Option<String> {
    let text = response.trim();
    if text.is_empty() || is_insufficient_schema(text) {
        return None;
    }

    let sql = match fenced_block(text) {
        Some(block) => clean(&block),
        None => match statement_tail(text) {
            Some(tail) => clean(&tail),
            None => clean(text),
        },
    };

    if sql.is_empty() {
        None
    } else {
        Some(sql)
    }
}

/// The model declined because the linked tables cannot answer the question
pub fn is_insufficient_schema(text: &str) -> bool {
    text.to_lowercase()
        .contains(&INSUFFICIENT_SCHEMA.to_lowercase())
}

pub fn fenced_block(text: &str) -> Option<String> {
    FENCED
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Slice from the first statement keyword (preferring an uppercase one that
/// opens a line) to the first paragraph break that starts prose.
pub fn statement_tail(text: &str) -> Option<String> {
    let start = LINE_STARTER
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.start())
        .or_else(|| ANY_STARTER.find(text).map(|m| m.start()))?;

    let tail = &text[start..];
    let end = PROSE_BREAK.find(tail).map(|m| m.start()).unwrap_or(tail.len());
    Some(tail[..end].trim().to_string())
}

pub fn clean(sql: &str) -> String {
    let sql = FENCE_MARKER.replace_all(sql, "");
    let sql = sql.trim();
    let sql = sql.strip_suffix(';').unwrap_or(sql).trim();
    let sql = HORIZONTAL_WS.replace_all(sql, " ");
    let sql = BLANK_LINES.replace_all(&sql, "\n\n");
    sql.trim().to_string()
}
