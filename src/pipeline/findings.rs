//! Findings post-processing: raw generated text → bulleted report lines.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Marker prefixed to every output line.
pub const BULLET: &str = "• ";

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Normalize one line for duplicate detection: lowercase, punctuation removed.
pub fn dedup_key(line: &str) -> String {
    PUNCTUATION.replace_all(&line.to_lowercase(), "").into_owned()
}

/// Uppercase the first character, leaving the rest untouched.
fn capitalize_first(line: &str) -> String {
    let mut chars = line.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Turn raw model output into unique, capitalized, period-terminated bullets.
///
/// Blank lines are dropped. A line whose [`dedup_key`] was already seen is
/// dropped; the first occurrence keeps its position. A line already ending in
/// `.` gets no second period, any other trailing punctuation still does
/// (`"!"` becomes `"!."`).
pub fn clean_findings(raw: &str) -> String {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut line = capitalize_first(line);
        if !line.ends_with('.') {
            line.push('.');
        }

        if !seen.insert(dedup_key(&line)) {
            continue;
        }
        cleaned.push(format!("{BULLET}{line}"));
    }

    cleaned.join("\n")
}
