use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use bibtag::pipeline::{self, IdStrategy, PipelineConfig, PipelinePaths};
use bibtag::{CsvConfig, KeywordMode, KeywordsMatch, RewriteConfig};

/// Fill the keywords of a BibTeX export with tags from a categorization table
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Semicolon-delimited tag table with `Category > Tag` columns
    #[arg(long, default_value = "table2-combCite.csv")]
    csv: PathBuf,

    /// JSON export of the same library, in BibTeX entry order
    #[arg(long, default_value = "exploratory.json")]
    json: PathBuf,

    /// BibTeX export to rewrite
    #[arg(long, default_value = "exploratory.bib")]
    bib: PathBuf,

    /// Where to write the rewritten bibliography (overwritten)
    #[arg(short, long, default_value = "references.bib")]
    output: PathBuf,

    /// What to do with keywords already present in an entry
    #[arg(long, value_enum, default_value_t = ModeArg::Replace)]
    mode: ModeArg,

    /// How the keywords line of an entry is recognized
    #[arg(long = "match", value_enum, default_value_t = MatchArg::Substring)]
    keywords_match: MatchArg,

    /// How entries are paired with tag table rows
    #[arg(long, value_enum, default_value_t = IdsArg::Positional)]
    ids: IdsArg,

    /// Fail when the number of entries and JSON records differ
    #[arg(long)]
    strict: bool,

    /// Print the parsed tag table as JSON before rewriting
    #[arg(long)]
    print_tags: bool,

    /// Delimiter of the tag table
    #[arg(long, default_value_t = ';')]
    delimiter: char,

    /// Header of the tag table's id column
    #[arg(long, default_value = bibtag::csv::DEFAULT_ID_COLUMN)]
    id_column: String,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Replace,
    Merge,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatchArg {
    Substring,
    Field,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IdsArg {
    Positional,
    CitationKey,
}

impl Cli {
    fn paths(&self) -> PipelinePaths {
        PipelinePaths {
            csv: self.csv.clone(),
            json: self.json.clone(),
            bib: self.bib.clone(),
            output: self.output.clone(),
        }
    }

    fn config(&self) -> anyhow::Result<PipelineConfig> {
        let delimiter = u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .with_context(|| format!("delimiter must be ASCII, got {:?}", self.delimiter))?;

        let mut csv = CsvConfig::new();
        csv.set_delimiter(delimiter).set_id_column(&self.id_column);

        let mut rewrite = RewriteConfig::new();
        rewrite
            .set_mode(match self.mode {
                ModeArg::Replace => KeywordMode::Replace,
                ModeArg::Merge => KeywordMode::Merge,
            })
            .set_keywords_match(match self.keywords_match {
                MatchArg::Substring => KeywordsMatch::Substring,
                MatchArg::Field => KeywordsMatch::Field,
            })
            .set_strict(self.strict);

        let ids = match self.ids {
            IdsArg::Positional => IdStrategy::Positional,
            IdsArg::CitationKey => IdStrategy::CitationKey,
        };

        Ok(PipelineConfig { csv, rewrite, ids })
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = cli.paths();
    let config = cli.config()?;

    let tags = pipeline::load_tags(&paths.csv, &config.csv)
        .with_context(|| format!("loading tag table {}", paths.csv.display()))?;
    if cli.print_tags {
        println!("{}", pipeline::dump_tags(&tags)?);
    }

    let summary = pipeline::run_with_tags(&paths, &config, &tags)
        .with_context(|| format!("rewriting {}", paths.bib.display()))?;

    println!(
        "Wrote {}: {} entries, {} keywords replaced, {} inserted, {} untagged",
        paths.output.display(),
        summary.entries,
        summary.replaced,
        summary.inserted,
        summary.untagged
    );
    Ok(())
}
