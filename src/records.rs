//! Reference manager JSON export.
//!
//! The export is a JSON array of CSL items. Only the order of the items and their `id`
//! is used to pair them with BibTeX entries; every other field is kept as-is.
//!
//! # Example
//!
//! ```
//! use bibtag::RecordList;
//!
//! let input = r#"[{"id": "A", "title": "First"}, {"id": 7}]"#;
//!
//! let records = RecordList::parse(input).unwrap();
//! assert_eq!(records.len(), 2);
//! assert_eq!(records.get(1).unwrap().id, "7");
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::Result;

/// A single item of the JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Item id; numeric ids are kept in their decimal form
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Every other field of the item
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

/// The ordered list of exported items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordList {
    records: Vec<Record>,
}

impl RecordList {
    /// Parses a JSON array of items.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TagError::Json`] if the input is not valid JSON, is not an
    /// array, or contains an item without an `id`.
    pub fn parse(input: &str) -> Result<Self> {
        let list: Self = serde_json::from_str(input)?;
        info!(records = list.len(), "loaded record list");
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Iterates over the item ids in export order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }
}

impl From<Vec<Record>> for RecordList {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for RecordList {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
