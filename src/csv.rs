//! CSV tag table parser.
//!
//! The tag table is exported by a categorization tool: one row per paper, one id column
//! whose cells look like `"<label>#<id>"`, and one column per tag named
//! `"<Category> > <Tag>"`. A cell holding the zero marker means the paper does not carry
//! that tag; any other value means it does.
//!
//! # Example
//!
//! ```
//! use bibtag::TagTableParser;
//!
//! let input = "Paper#Ref;Vis > Overview;Vis > Detail\nPaper#42;1;0";
//!
//! let tags = TagTableParser::new().parse(input).unwrap();
//! assert_eq!(tags.get("42").unwrap()["vis"], vec!["overview".to_string()]);
//! ```

use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use tracing::{debug, info};

use crate::{CategoryTags, Result, TagError, TagMapping};

/// Default name of the column holding the composite record id.
pub const DEFAULT_ID_COLUMN: &str = "Paper#Ref";

/// Configuration for parsing a tag table.
///
/// # Examples
///
/// ```
/// use bibtag::csv::CsvConfig;
///
/// let mut config = CsvConfig::new();
/// config.set_id_column("Item#Key").set_delimiter(b',');
/// ```
#[derive(Debug, Clone)]
pub struct CsvConfig {
    /// Delimiter to use for parsing the CSV
    delimiter: u8,
    /// Header of the column holding the composite record id
    id_column: String,
    /// The record id is whatever follows the last occurrence of this character
    id_separator: char,
    /// Columns whose header starts with this prefix are ignored
    placeholder_prefix: String,
    /// Cell value marking a tag as absent
    absent_marker: String,
    /// Separator between category and tag in a column header
    tag_separator: String,
    /// Whether categories and tags are lowercased
    lowercase: bool,
    /// Whether rows may have a different number of cells than the header
    flexible: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvConfig {
    /// Creates a configuration matching the categorization tool's export.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delimiter: b';',
            id_column: DEFAULT_ID_COLUMN.to_string(),
            id_separator: '#',
            placeholder_prefix: "Unnamed".to_string(),
            absent_marker: "0".to_string(),
            tag_separator: " > ".to_string(),
            lowercase: true,
            flexible: true,
        }
    }

    /// Sets the delimiter character
    pub fn set_delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the header of the id column
    pub fn set_id_column(&mut self, column: &str) -> &mut Self {
        self.id_column = column.to_string();
        self
    }

    pub fn set_id_separator(&mut self, separator: char) -> &mut Self {
        self.id_separator = separator;
        self
    }

    /// Sets the header prefix of columns to ignore (e.g. unnamed index columns)
    pub fn set_placeholder_prefix(&mut self, prefix: &str) -> &mut Self {
        self.placeholder_prefix = prefix.to_string();
        self
    }

    /// Sets the cell value that marks a tag as absent
    pub fn set_absent_marker(&mut self, marker: &str) -> &mut Self {
        self.absent_marker = marker.to_string();
        self
    }

    pub fn set_tag_separator(&mut self, separator: &str) -> &mut Self {
        self.tag_separator = separator.to_string();
        self
    }

    pub fn set_lowercase(&mut self, lowercase: bool) -> &mut Self {
        self.lowercase = lowercase;
        self
    }

    /// Sets whether rows may be shorter or longer than the header
    pub fn set_flexible(&mut self, flexible: bool) -> &mut Self {
        self.flexible = flexible;
        self
    }

    /// Extracts the record id from a composite id cell.
    ///
    /// A cell without the separator is used whole.
    pub fn record_id<'a>(&self, cell: &'a str) -> &'a str {
        cell.rsplit_once(self.id_separator).map_or(cell, |(_, id)| id)
    }
}

/// What a column of the tag table contributes to a row.
#[derive(Debug, Clone, PartialEq)]
enum Column {
    Id,
    Ignored,
    Tag { category: String, tag: String },
    /// A header without exactly one category separator; only an error once a row sets it.
    Malformed(String),
}

/// Parser turning a tag table into a [`TagMapping`].
///
/// # Examples
///
/// ```
/// use bibtag::csv::{CsvConfig, TagTableParser};
///
/// let mut config = CsvConfig::new();
/// config.set_delimiter(b',');
///
/// let input = "Paper#Ref,Task > Compare\nP#7,1";
/// let tags = TagTableParser::new().with_config(config).parse(input).unwrap();
/// assert_eq!(tags.keyword_tokens("7").unwrap(), vec!["task:compare"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TagTableParser {
    config: CsvConfig,
}

impl TagTableParser {
    /// Creates a new parser with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CsvConfig::new(),
        }
    }

    /// Creates a new parser with custom configuration
    #[must_use]
    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// Parses a whole tag table.
    ///
    /// # Errors
    ///
    /// - [`TagError::MissingColumn`] if the header lacks the id column
    /// - [`TagError::InvalidHeader`] if a tag that is set sits in a column whose header
    ///   is not exactly `Category > Tag`
    /// - [`TagError::InvalidFormat`] if the CSV itself is malformed
    pub fn parse(&self, input: &str) -> Result<TagMapping> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .flexible(self.config.flexible)
            .from_reader(input.as_bytes());

        let headers = reader.headers()?.clone();
        let columns = self.classify_headers(&headers);
        let id_index = columns
            .iter()
            .position(|c| *c == Column::Id)
            .ok_or_else(|| TagError::MissingColumn(self.config.id_column.clone()))?;

        let mut mapping = TagMapping::new();
        for (row, result) in reader.records().enumerate() {
            let record = result?;
            // header is line 1
            let line = record
                .position()
                .map_or(row + 2, |p| p.line() as usize);

            let cell = record.get(id_index).ok_or_else(|| TagError::MalformedInput {
                message: format!("row has no `{}` cell", self.config.id_column),
                line,
            })?;
            let id = self.config.record_id(cell);
            let categories = self.parse_row(&columns, &record)?;
            debug!(id, categories = categories.len(), line, "parsed tag row");
            mapping.insert(id, categories);
        }

        info!(records = mapping.len(), "loaded tag table");
        Ok(mapping)
    }

    fn classify_headers(&self, headers: &StringRecord) -> Vec<Column> {
        headers
            .iter()
            .map(|header| {
                if header == self.config.id_column {
                    Column::Id
                } else if header.starts_with(&self.config.placeholder_prefix) {
                    Column::Ignored
                } else {
                    match header
                        .split(self.config.tag_separator.as_str())
                        .collect_tuple::<(&str, &str)>()
                    {
                        Some((category, tag)) => Column::Tag {
                            category: self.normalize(category),
                            tag: self.normalize(tag),
                        },
                        None => Column::Malformed(header.to_string()),
                    }
                }
            })
            .collect()
    }

    /// Collects the tags set in a row, grouped by category in column order.
    fn parse_row(&self, columns: &[Column], record: &StringRecord) -> Result<CategoryTags> {
        let mut categories = CategoryTags::new();

        for (i, column) in columns.iter().enumerate() {
            // cells missing from a short row are not the absent marker
            let value = record.get(i).unwrap_or("");
            if value == self.config.absent_marker {
                continue;
            }
            match column {
                Column::Id | Column::Ignored => {}
                Column::Tag { category, tag } => {
                    categories
                        .entry(category.clone())
                        .or_default()
                        .push(tag.clone());
                }
                Column::Malformed(header) => {
                    return Err(TagError::InvalidHeader {
                        header: header.clone(),
                        message: format!(
                            "expected `Category{}Tag`",
                            self.config.tag_separator
                        ),
                    });
                }
            }
        }

        Ok(categories)
    }

    fn normalize(&self, part: &str) -> String {
        if self.config.lowercase {
            part.to_lowercase()
        } else {
            part.to_string()
        }
    }
}
