//! Merge categorized tags from a CSV table into the `keywords` fields of a BibTeX bibliography.
//!
//! `bibtag` joins three exports of the same library of papers:
//!
//! - a semicolon-delimited CSV table from a categorization tool, whose columns are
//!   named `"Category > Tag"` and whose cells mark a tag as present (`1`) or absent (`0`),
//! - a CSL JSON export from the reference manager, used to resolve record ids by position,
//! - a BibTeX export from the same reference manager, rewritten line by line.
//!
//! The Nth BibTeX entry is matched with the Nth JSON record, whose `id` selects the tags
//! from the CSV table. Tags are written as `category:tag` tokens.
//!
//! # Basic Usage
//!
//! ```rust
//! use bibtag::{IdSource, KeywordRewriter, RecordList, TagTableParser};
//!
//! let table = "Paper#Ref;Vis > Overview;Vis > Detail\nPaper#A1;1;0";
//! let tags = TagTableParser::new().parse(table).unwrap();
//!
//! let records = RecordList::parse(r#"[{"id": "A1"}]"#).unwrap();
//!
//! let bib = "@article{smith2020,\n  title = {Example},\n}\n";
//! let rewrite = KeywordRewriter::new()
//!     .rewrite(bib, &tags, &IdSource::Positional(&records))
//!     .unwrap();
//!
//! assert_eq!(
//!     rewrite.text,
//!     "@article{smith2020,\n  title = {Example},\n  keywords = {vis:overview},\n}\n"
//! );
//! ```
//!
//! # Error Handling
//!
//! The library uses a custom [`Result`] type that wraps [`TagError`]:
//!
//! ```rust
//! use bibtag::{TagError, TagTableParser};
//!
//! match TagTableParser::new().parse("Title;Vis > Overview\nfoo;1") {
//!     Ok(tags) => println!("Parsed {} records", tags.len()),
//!     Err(TagError::MissingColumn(column)) => eprintln!("No id column: {}", column),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

extern crate csv as csv_crate;

pub mod bibtex;
pub mod csv;
pub mod pipeline;
pub mod records;

// Reexports
pub use bibtex::{
    IdSource, KeywordMode, KeywordRewriter, KeywordsMatch, Rewrite, RewriteConfig,
    RewriteSummary,
};
pub use csv::{CsvConfig, TagTableParser};
pub use pipeline::{IdStrategy, PipelineConfig, PipelinePaths};
pub use records::{Record, RecordList};

/// A specialized Result type for tag merging operations.
pub type Result<T> = std::result::Result<T, TagError>;

/// Represents errors that can occur while loading inputs or rewriting a bibliography.
#[derive(Error, Debug)]
pub enum TagError {
    #[error("IO error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    InvalidFormat(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid column header: {header} - {message}")]
    InvalidHeader { header: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ran out of records at BibTeX entry {entry} (line {line})")]
    RecordsExhausted { entry: usize, line: usize },

    #[error("BibTeX has {entries} entries but {records} records were supplied")]
    RecordCountMismatch { entries: usize, records: usize },

    #[error("Malformed input: {message} at line {line}")]
    MalformedInput { message: String, line: usize },
}

impl From<csv_crate::Error> for TagError {
    fn from(err: csv_crate::Error) -> Self {
        TagError::InvalidFormat(err.to_string())
    }
}

/// Tags of a single record, grouped by category.
///
/// Categories and the tags inside them keep the order in which they were first seen.
pub type CategoryTags = IndexMap<String, Vec<String>>;

/// Mapping from record id to its categorized tags.
///
/// Record ids keep the order of the rows they were read from. Inserting an id that is
/// already present replaces its tags but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TagMapping {
    records: IndexMap<String, CategoryTags>,
}

impl TagMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the categories of a record, replacing any previous ones.
    pub fn insert(&mut self, id: impl Into<String>, categories: CategoryTags) {
        self.records.insert(id.into(), categories);
    }

    /// Returns the categories of a record.
    pub fn get(&self, id: &str) -> Option<&CategoryTags> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over records in row order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryTags)> {
        self.records.iter().map(|(id, tags)| (id.as_str(), tags))
    }

    /// Returns the `category:tag` tokens of a record, categories in insertion order and
    /// tags in insertion order within each category.
    ///
    /// Returns `None` when the record is unknown or carries no tag at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use bibtag::{CategoryTags, TagMapping};
    ///
    /// let mut categories = CategoryTags::new();
    /// categories.insert("vis".to_string(), vec!["overview".to_string()]);
    /// categories.insert("task".to_string(), vec!["compare".to_string()]);
    ///
    /// let mut mapping = TagMapping::new();
    /// mapping.insert("42", categories);
    ///
    /// assert_eq!(
    ///     mapping.keyword_tokens("42").unwrap(),
    ///     vec!["vis:overview", "task:compare"]
    /// );
    /// assert!(mapping.keyword_tokens("7").is_none());
    /// ```
    pub fn keyword_tokens(&self, id: &str) -> Option<Vec<String>> {
        let tokens: Vec<String> = self
            .get(id)?
            .iter()
            .flat_map(|(category, tags)| tags.iter().map(move |tag| format!("{category}:{tag}")))
            .collect();
        if tokens.is_empty() { None } else { Some(tokens) }
    }
}

impl FromIterator<(String, CategoryTags)> for TagMapping {
    fn from_iter<I: IntoIterator<Item = (String, CategoryTags)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
