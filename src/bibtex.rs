//! Line-oriented BibTeX keyword rewriter.
//!
//! The bibliography is walked one line at a time. Each line starting with `@` opens a new
//! entry and resolves its record id; a `keywords` line inside the entry is replaced, and an
//! entry without one gets a synthesized line right before its closing brace. Everything
//! else is copied byte for byte. Lines may end in `\n`, `\r\n` or a lone `\r`; a
//! written keywords line uses the terminator of the line it replaces or precedes.
//!
//! # Example
//!
//! ```
//! use bibtag::{CategoryTags, IdSource, KeywordRewriter, TagMapping};
//!
//! let mut categories = CategoryTags::new();
//! categories.insert("vis".to_string(), vec!["overview".to_string()]);
//! let mut tags = TagMapping::new();
//! tags.insert("smith2020", categories);
//!
//! let bib = "@article{smith2020,\n  keywords = {old},\n}\n";
//! let rewrite = KeywordRewriter::new()
//!     .rewrite(bib, &tags, &IdSource::CitationKey)
//!     .unwrap();
//!
//! assert_eq!(rewrite.text, "@article{smith2020,\n  keywords = {vis:overview},\n}\n");
//! assert_eq!(rewrite.summary.replaced, 1);
//! ```

mod line;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::records::RecordList;
use crate::{Result, TagError, TagMapping};
use line::{
    Lines, citation_key, field_value, is_entry_end, is_entry_start, is_keywords_line,
    keywords_line, line_ending, split_keywords,
};

/// What happens to keywords already present in an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeywordMode {
    /// Existing keywords are discarded
    #[default]
    Replace,
    /// New tokens come first, followed by existing tokens not already among them
    Merge,
}

/// How the keywords line of an entry is recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeywordsMatch {
    /// Any line containing `keywords`
    #[default]
    Substring,
    /// Only a line whose field name is `keywords`
    Field,
}

/// Where the record id of each entry comes from.
#[derive(Debug, Clone, Copy)]
pub enum IdSource<'a> {
    /// The Nth entry takes the id of the Nth record
    Positional(&'a RecordList),
    /// Each entry is identified by its own citation key
    CitationKey,
}

/// Configuration for rewriting a bibliography.
///
/// # Examples
///
/// ```
/// use bibtag::{KeywordMode, KeywordsMatch, RewriteConfig};
///
/// let mut config = RewriteConfig::new();
/// config
///     .set_mode(KeywordMode::Merge)
///     .set_keywords_match(KeywordsMatch::Field)
///     .set_strict(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RewriteConfig {
    mode: KeywordMode,
    keywords_match: KeywordsMatch,
    /// Fail when entry and record counts differ
    strict: bool,
}

impl RewriteConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: KeywordMode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn set_keywords_match(&mut self, keywords_match: KeywordsMatch) -> &mut Self {
        self.keywords_match = keywords_match;
        self
    }

    /// Sets whether a positional rewrite fails unless every record was consumed
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }
}

/// Counts of what a rewrite did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Entries seen
    pub entries: usize,
    /// Existing keywords lines overwritten
    pub replaced: usize,
    /// Keywords lines synthesized before a closing brace
    pub inserted: usize,
    /// Entries whose id has no tags
    pub untagged: usize,
}

/// Result of a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    /// The rewritten bibliography
    pub text: String,
    pub summary: RewriteSummary,
}

/// State of the entry currently being walked.
#[derive(Debug, Default)]
struct EntryState {
    id: Option<String>,
    keywords_written: bool,
}

/// Rewrites the keywords of a BibTeX bibliography from a [`TagMapping`].
#[derive(Debug, Clone, Default)]
pub struct KeywordRewriter {
    config: RewriteConfig,
}

impl KeywordRewriter {
    /// Creates a new rewriter with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new rewriter with custom configuration
    #[must_use]
    pub fn with_config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }

    /// Rewrites `bib`, inserting or replacing the keywords of every entry whose id has tags.
    ///
    /// # Errors
    ///
    /// - [`TagError::RecordsExhausted`] if positional ids run out before the entries do
    /// - [`TagError::MalformedInput`] if a matched keywords line has no `=`
    /// - [`TagError::RecordCountMismatch`] in strict mode when not every record was used
    pub fn rewrite(&self, bib: &str, tags: &TagMapping, ids: &IdSource<'_>) -> Result<Rewrite> {
        let mut text = String::with_capacity(bib.len());
        let mut summary = RewriteSummary::default();
        let mut entry = EntryState::default();
        let mut cursor = 0;

        for (index, line) in Lines::new(bib).enumerate() {
            let line_number = index + 1;

            if is_entry_start(line) {
                let id = match ids {
                    IdSource::Positional(records) => {
                        let record = records.get(cursor).ok_or(TagError::RecordsExhausted {
                            entry: cursor + 1,
                            line: line_number,
                        })?;
                        Some(record.id.clone())
                    }
                    IdSource::CitationKey => {
                        let key = citation_key(line).map(String::from);
                        if key.is_none() {
                            warn!(line = line_number, "entry without a citation key");
                        }
                        key
                    }
                };
                cursor += 1;
                summary.entries += 1;
                if !id.as_deref().is_some_and(|id| has_tags(tags, id)) {
                    summary.untagged += 1;
                }
                entry = EntryState {
                    id,
                    keywords_written: false,
                };
                text.push_str(line);
            } else if is_keywords_line(line, self.config.keywords_match) {
                let existing = field_value(line, line_number)?;
                match self.tokens(tags, &entry) {
                    Some(tokens) => {
                        let tokens = match self.config.mode {
                            KeywordMode::Replace => tokens,
                            KeywordMode::Merge => merge_keywords(tokens, existing),
                        };
                        debug!(id = ?entry.id, line = line_number, "replacing keywords");
                        text.push_str(&keywords_line(&tokens, line_ending(line)));
                        summary.replaced += 1;
                    }
                    None => text.push_str(line),
                }
                entry.keywords_written = true;
            } else if is_entry_end(line) && !entry.keywords_written {
                if let Some(tokens) = self.tokens(tags, &entry) {
                    debug!(id = ?entry.id, line = line_number, "inserting keywords");
                    text.push_str(&keywords_line(&tokens, line_ending(line)));
                    summary.inserted += 1;
                    entry.keywords_written = true;
                }
                text.push_str(line);
            } else {
                text.push_str(line);
            }
        }

        if let IdSource::Positional(records) = ids {
            if cursor != records.len() {
                if self.config.strict {
                    return Err(TagError::RecordCountMismatch {
                        entries: cursor,
                        records: records.len(),
                    });
                }
                warn!(
                    entries = cursor,
                    records = records.len(),
                    "entry and record counts differ"
                );
            }
        }

        info!(
            entries = summary.entries,
            replaced = summary.replaced,
            inserted = summary.inserted,
            untagged = summary.untagged,
            "rewrote bibliography"
        );
        Ok(Rewrite { text, summary })
    }

    fn tokens(&self, tags: &TagMapping, entry: &EntryState) -> Option<Vec<String>> {
        entry
            .id
            .as_deref()
            .and_then(|id| tags.keyword_tokens(id))
    }
}

fn has_tags(tags: &TagMapping, id: &str) -> bool {
    tags.keyword_tokens(id).is_some()
}

/// Appends the existing tokens of a keywords value to the new ones, skipping repeats.
fn merge_keywords(tokens: Vec<String>, existing: &str) -> Vec<String> {
    tokens
        .into_iter()
        .chain(split_keywords(existing).into_iter().map(String::from))
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Record;
    use crate::CategoryTags;
    use pretty_assertions::assert_eq;

    fn mapping(records: &[(&str, &[(&str, &[&str])])]) -> TagMapping {
        records
            .iter()
            .map(|(id, categories)| {
                let categories: CategoryTags = categories
                    .iter()
                    .map(|(category, tags)| {
                        (
                            category.to_string(),
                            tags.iter().map(|t| t.to_string()).collect(),
                        )
                    })
                    .collect();
                (id.to_string(), categories)
            })
            .collect()
    }

    fn records(ids: &[&str]) -> RecordList {
        ids.iter()
            .map(|id| Record {
                id: id.to_string(),
                fields: Default::default(),
            })
            .collect()
    }

    fn rewrite(bib: &str, tags: &TagMapping, ids: &[&str]) -> Rewrite {
        let records = records(ids);
        KeywordRewriter::new()
            .rewrite(bib, tags, &IdSource::Positional(&records))
            .unwrap()
    }

    #[test]
    fn test_replaces_existing_keywords() {
        let bib = "\
@article{smith2020,
  title = {Overview first},
  keywords = {visualization, survey},
  year = {2020},
}
";
        let tags = mapping(&[(
            "42",
            &[("vis", &["overview", "detail"]), ("task", &["compare"])],
        )]);

        let result = rewrite(bib, &tags, &["42"]);
        assert_eq!(
            result.text,
            "\
@article{smith2020,
  title = {Overview first},
  keywords = {vis:overview, vis:detail, task:compare},
  year = {2020},
}
"
        );
        assert_eq!(
            result.summary,
            RewriteSummary {
                entries: 1,
                replaced: 1,
                inserted: 0,
                untagged: 0,
            }
        );
    }

    #[test]
    fn test_inserts_before_closing_brace() {
        let bib = "@book{doe2019,\n  title = {Details},\n}\n";
        let tags = mapping(&[("A", &[("x", &["1"])])]);

        let result = rewrite(bib, &tags, &["A"]);
        assert_eq!(
            result.text,
            "@book{doe2019,\n  title = {Details},\n  keywords = {x:1},\n}\n"
        );
        assert_eq!(result.summary.inserted, 1);
    }

    #[test]
    fn test_untagged_entry_is_untouched() {
        let bib = "\
@article{a,
  keywords = {keep me},
}

@article{b,
  title = {No keywords},
}
";
        let tags = mapping(&[("other", &[("x", &["1"])])]);

        let result = rewrite(bib, &tags, &["A", "B"]);
        assert_eq!(result.text, bib);
        assert_eq!(result.summary.untagged, 2);
    }

    #[test]
    fn test_two_entries_end_to_end() {
        let bib = "\
@article{first,
  title = {One},
}
@article{second,
  title = {Two},
  keywords = {original},
}
";
        let tags = mapping(&[("A", &[("x", &["1"])]), ("B", &[])]);

        let result = rewrite(bib, &tags, &["A", "B"]);
        assert_eq!(
            result.text,
            "\
@article{first,
  title = {One},
  keywords = {x:1},
}
@article{second,
  title = {Two},
  keywords = {original},
}
"
        );
    }

    #[test]
    fn test_rewrite_is_stable_on_own_output() {
        let bib = "\
@article{first,
  title = {One},
}
@article{second,
  keywords = {stale},
}
";
        let tags = mapping(&[("A", &[("x", &["1"])]), ("B", &[("y", &["2", "3"])])]);

        let once = rewrite(bib, &tags, &["A", "B"]);
        let twice = rewrite(&once.text, &tags, &["A", "B"]);
        assert_eq!(once.text, twice.text);
        assert_eq!(twice.summary.replaced, 2);
        assert_eq!(twice.summary.inserted, 0);
    }

    #[test]
    fn test_reordered_records_misattribute() {
        let bib = "@article{first,\n}\n@article{second,\n}\n";
        let tags = mapping(&[("A", &[("x", &["1"])]), ("B", &[("y", &["2"])])]);

        let result = rewrite(bib, &tags, &["B", "A"]);
        assert_eq!(
            result.text,
            "@article{first,\n  keywords = {y:2},\n}\n@article{second,\n  keywords = {x:1},\n}\n"
        );
    }

    #[test]
    fn test_records_exhausted() {
        let bib = "@article{a,\n}\n@article{b,\n}\n";
        let records = records(&["A"]);

        let result = KeywordRewriter::new().rewrite(
            bib,
            &TagMapping::new(),
            &IdSource::Positional(&records),
        );
        assert!(matches!(
            result,
            Err(TagError::RecordsExhausted { entry: 2, line: 3 })
        ));
    }

    #[test]
    fn test_strict_count_mismatch() {
        let bib = "@article{a,\n}\n";
        let records = records(&["A", "B"]);
        let mut config = RewriteConfig::new();
        config.set_strict(true);

        let result = KeywordRewriter::new().with_config(config).rewrite(
            bib,
            &TagMapping::new(),
            &IdSource::Positional(&records),
        );
        assert!(matches!(
            result,
            Err(TagError::RecordCountMismatch {
                entries: 1,
                records: 2
            })
        ));

        // lenient by default
        let result = KeywordRewriter::new()
            .rewrite(bib, &TagMapping::new(), &IdSource::Positional(&records))
            .unwrap();
        assert_eq!(result.text, bib);
    }

    #[test]
    fn test_keywords_line_without_equals_fails() {
        let bib = "@article{a,\n  % keywords follow\n}\n";

        let records = records(&["A"]);
        let result = KeywordRewriter::new().rewrite(
            bib,
            &TagMapping::new(),
            &IdSource::Positional(&records),
        );
        assert!(matches!(
            result,
            Err(TagError::MalformedInput { line: 2, .. })
        ));
    }

    #[test]
    fn test_substring_match_hits_title() {
        let bib = "@article{a,\n  title = {Mining keywords},\n}\n";
        let tags = mapping(&[("A", &[("x", &["1"])])]);

        let result = rewrite(bib, &tags, &["A"]);
        assert_eq!(result.text, "@article{a,\n  keywords = {x:1},\n}\n");
    }

    #[test]
    fn test_field_match_skips_title() {
        let bib = "@article{a,\n  title = {Mining keywords},\n}\n";
        let tags = mapping(&[("A", &[("x", &["1"])])]);
        let records = records(&["A"]);
        let mut config = RewriteConfig::new();
        config.set_keywords_match(KeywordsMatch::Field);

        let result = KeywordRewriter::new()
            .with_config(config)
            .rewrite(bib, &tags, &IdSource::Positional(&records))
            .unwrap();
        assert_eq!(
            result.text,
            "@article{a,\n  title = {Mining keywords},\n  keywords = {x:1},\n}\n"
        );
    }

    #[test]
    fn test_merge_mode() {
        let bib = "@article{a,\n  keywords = {survey, x:1},\n}\n";
        let tags = mapping(&[("A", &[("x", &["1", "2"])])]);
        let records = records(&["A"]);
        let mut config = RewriteConfig::new();
        config.set_mode(KeywordMode::Merge);

        let result = KeywordRewriter::new()
            .with_config(config)
            .rewrite(bib, &tags, &IdSource::Positional(&records))
            .unwrap();
        assert_eq!(
            result.text,
            "@article{a,\n  keywords = {x:1, x:2, survey},\n}\n"
        );
    }

    #[test]
    fn test_citation_key_ids() {
        let bib = "@article{smith2020,\n}\n@misc{doe2021,\n}\n";
        let tags = mapping(&[("doe2021", &[("task", &["explore"])])]);

        let result = KeywordRewriter::new()
            .rewrite(bib, &tags, &IdSource::CitationKey)
            .unwrap();
        assert_eq!(
            result.text,
            "@article{smith2020,\n}\n@misc{doe2021,\n  keywords = {task:explore},\n}\n"
        );
        assert_eq!(result.summary.untagged, 1);
    }

    #[test]
    fn test_preserves_crlf_and_missing_final_newline() {
        let bib = "@article{a,\r\n  title = {T},\r\n}";
        let tags = mapping(&[("A", &[("x", &["1"])])]);

        let result = rewrite(bib, &tags, &["A"]);
        assert_eq!(
            result.text,
            "@article{a,\r\n  title = {T},\r\n  keywords = {x:1},\n}"
        );
    }

    #[test]
    fn test_carriage_return_only_file() {
        let bib = "@article{a,\r  keywords = {old},\r}\r@article{b,\r}\r";
        let tags = mapping(&[("A", &[("x", &["1"])]), ("B", &[("y", &["2"])])]);

        let result = rewrite(bib, &tags, &["A", "B"]);
        assert_eq!(
            result.text,
            "@article{a,\r  keywords = {x:1},\r}\r@article{b,\r  keywords = {y:2},\r}\r"
        );
        assert_eq!(result.summary.entries, 2);
    }

    #[test]
    fn test_only_first_closing_brace_gets_keywords() {
        let bib = "@article{a,\n  abstract = {\n  nested\n}\n}\n";
        let tags = mapping(&[("A", &[("x", &["1"])])]);

        let result = rewrite(bib, &tags, &["A"]);
        assert_eq!(
            result.text,
            "@article{a,\n  abstract = {\n  nested\n  keywords = {x:1},\n}\n}\n"
        );
        assert_eq!(result.summary.inserted, 1);
    }

    #[test]
    fn test_lines_before_first_entry() {
        let bib = "% exported keywords list\n}\n@article{a,\n}\n";
        let tags = mapping(&[("A", &[("x", &["1"])])]);

        let result = KeywordRewriter::new()
            .rewrite(bib, &tags, &IdSource::Positional(&records(&["A"])));
        // the comment mentions keywords but has no `=`
        assert!(matches!(
            result,
            Err(TagError::MalformedInput { line: 1, .. })
        ));

        let bib = "% preamble\n}\n@article{a,\n}\n";
        let result = rewrite(bib, &tags, &["A"]);
        assert_eq!(
            result.text,
            "% preamble\n}\n@article{a,\n  keywords = {x:1},\n}\n"
        );
    }
}
