//! File-level pipeline: load the tag table and the record list, rewrite the bibliography,
//! write the result.
//!
//! All inputs are read to completion before anything is written. The output file is
//! written in one go and overwrites whatever was there.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::bibtex::{IdSource, KeywordRewriter, RewriteConfig, RewriteSummary};
use crate::csv::{CsvConfig, TagTableParser};
use crate::records::RecordList;
use crate::{Result, TagError, TagMapping};

/// How entries are paired with tag table rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// Through the JSON export, by position
    #[default]
    Positional,
    /// Through each entry's citation key; the JSON export is not read
    CitationKey,
}

/// Locations of the pipeline's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub bib: PathBuf,
    pub output: PathBuf,
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self {
            csv: PathBuf::from("table2-combCite.csv"),
            json: PathBuf::from("exploratory.json"),
            bib: PathBuf::from("exploratory.bib"),
            output: PathBuf::from("references.bib"),
        }
    }
}

/// Configuration of every stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub csv: CsvConfig,
    pub rewrite: RewriteConfig,
    pub ids: IdStrategy,
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| TagError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads and parses a tag table file.
pub fn load_tags(path: &Path, config: &CsvConfig) -> Result<TagMapping> {
    TagTableParser::new()
        .with_config(config.clone())
        .parse(&read(path)?)
}

/// Loads and parses a JSON record export.
pub fn load_records(path: &Path) -> Result<RecordList> {
    RecordList::parse(&read(path)?)
}

/// Renders a tag mapping as pretty JSON, for inspecting what the tag table yielded.
pub fn dump_tags(tags: &TagMapping) -> Result<String> {
    Ok(serde_json::to_string_pretty(tags)?)
}

/// Runs the whole pipeline with an already loaded tag mapping.
pub fn run_with_tags(
    paths: &PipelinePaths,
    config: &PipelineConfig,
    tags: &TagMapping,
) -> Result<RewriteSummary> {
    let records = match config.ids {
        IdStrategy::Positional => Some(load_records(&paths.json)?),
        IdStrategy::CitationKey => None,
    };
    let bib = read(&paths.bib)?;

    let ids = match &records {
        Some(records) => IdSource::Positional(records),
        None => IdSource::CitationKey,
    };
    let rewrite = KeywordRewriter::new()
        .with_config(config.rewrite.clone())
        .rewrite(&bib, tags, &ids)?;

    fs::write(&paths.output, rewrite.text).map_err(|source| TagError::File {
        path: paths.output.clone(),
        source,
    })?;
    info!(output = %paths.output.display(), "wrote bibliography");

    Ok(rewrite.summary)
}

/// Runs the whole pipeline.
///
/// # Errors
///
/// Any failure to read, parse, rewrite or write aborts the run. A partially written
/// output file is not cleaned up.
pub fn run(paths: &PipelinePaths, config: &PipelineConfig) -> Result<RewriteSummary> {
    let tags = load_tags(&paths.csv, &config.csv)?;
    run_with_tags(paths, config, &tags)
}
