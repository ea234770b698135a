//! Classification of raw BibTeX lines.
//!
//! Entries are never parsed as a grammar. A line starting with `@` opens an entry, a line
//! holding only `}` closes it, and a keywords field is recognized on its own line.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bibtex::KeywordsMatch;
use crate::{Result, TagError};

static CITATION_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@\s*\w+\s*[{(]\s*([^,\s{}()]+)\s*,").unwrap());

static KEYWORDS_FIELD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*keywords\s*=").unwrap());

/// An [Iterator] over the lines of a text, each including its terminator.
///
/// `\n`, `\r\n` and a lone `\r` all end a line, so files saved with old Mac line
/// endings are still walked line by line.
pub(crate) struct Lines<'a> {
    rest: &'a str,
}

impl<'a> Lines<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let end = match self.rest.find(['\n', '\r']) {
            Some(i) if self.rest[i..].starts_with("\r\n") => i + 2,
            Some(i) => i + 1,
            None => self.rest.len(),
        };
        let (line, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(line)
    }
}

/// Checks if a line opens a new entry
pub(crate) fn is_entry_start(line: &str) -> bool {
    line.starts_with('@')
}

/// Checks if a line closes the current entry
pub(crate) fn is_entry_end(line: &str) -> bool {
    line.trim() == "}"
}

/// Checks if a line holds the keywords field.
///
/// [`KeywordsMatch::Substring`] accepts any line mentioning `keywords`, including
/// e.g. a title. [`KeywordsMatch::Field`] requires `keywords` to be the field name.
pub(crate) fn is_keywords_line(line: &str, matching: KeywordsMatch) -> bool {
    match matching {
        KeywordsMatch::Substring => line.contains("keywords"),
        KeywordsMatch::Field => KEYWORDS_FIELD_REGEX.is_match(line),
    }
}

/// Returns the citation key of an entry-start line, e.g. `smith2020` for
/// `@article{smith2020,`.
pub(crate) fn citation_key(line: &str) -> Option<&str> {
    CITATION_KEY_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Returns the raw value of a field line: everything after the first `=`, trimmed.
///
/// # Errors
///
/// Returns `TagError::MalformedInput` if the line has no `=`.
pub(crate) fn field_value(line: &str, line_number: usize) -> Result<&str> {
    line.split_once('=')
        .map(|(_, value)| value.trim())
        .ok_or_else(|| TagError::MalformedInput {
            message: format!("keywords line without `=`: '{}'", line.trim_end()),
            line: line_number,
        })
}

/// Splits a raw keywords value such as `{a, b},` into its tokens.
pub(crate) fn split_keywords(value: &str) -> Vec<&str> {
    let value = value.trim_end_matches(',').trim();
    let value = strip_delimiters(value, '{', '}')
        .or_else(|| strip_delimiters(value, '"', '"'))
        .unwrap_or(value);

    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn strip_delimiters(value: &str, open: char, close: char) -> Option<&str> {
    value.strip_prefix(open)?.strip_suffix(close)
}

/// Builds a complete keywords field line.
pub(crate) fn keywords_line<S: AsRef<str>>(tokens: &[S], line_ending: &str) -> String {
    let joined = tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ");
    format!("  keywords = {{{joined}}},{line_ending}")
}

/// Returns the terminator of a line, defaulting to `\n` for the last unterminated line.
pub(crate) fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\r') {
        "\r"
    } else {
        "\n"
    }
}
