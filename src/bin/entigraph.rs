//! entigraph command-line runner.
//!
//! Reads the mention feed (and optionally the secondary relationship feed),
//! runs the pipeline, writes the artifacts and prints the summary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use entigraph::{artifacts, EntigraphResult, Pipeline, PipelineConfig, Summary};

#[derive(Parser)]
#[command(name = "entigraph", version, about = "Entity resolution and relationship graph builder")]
struct Cli {
    /// Mention feed (JSON lines).
    #[arg(long)]
    mentions: PathBuf,

    /// Secondary relationship feed (JSON lines).
    #[arg(long)]
    relationships: Option<PathBuf>,

    /// Output directory for the artifacts.
    #[arg(long, default_value = "entigraph-out")]
    out: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Overrides the high-cardinality threshold from the config file.
    #[arg(long)]
    high_cardinality_threshold: Option<usize>,

    /// Runs every stage on the calling thread.
    #[arg(long)]
    sequential: bool,

    /// Reports residual duplicates instead of failing on them.
    #[arg(long)]
    allow_residual_duplicates: bool,
}

impl Cli {
    fn config(&self) -> EntigraphResult<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(threshold) = self.high_cardinality_threshold {
            config.high_cardinality_threshold = threshold;
        }
        if self.sequential {
            config.parallel = false;
        }
        if self.allow_residual_duplicates {
            config.fail_on_residual_duplicates = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_summary(summary: &Summary) {
    println!("raw records ingested:        {}", summary.raw_records_ingested);
    println!("malformed records skipped:   {}", summary.malformed_records_skipped);
    println!(
        "entities (before / after):   {} / {}",
        summary.entities_before_dedup, summary.entities_after_dedup
    );
    println!("groups merged:               {}", summary.groups_merged);
    println!(
        "conflation (residual / type / partial): {} / {} / {}",
        summary.residual_variation_groups, summary.type_conflicts, summary.partial_matches
    );
    println!("unresolved mentions:         {}", summary.mentions_unresolved);
    println!("unresolved secondary names:  {}", summary.secondary_names_unresolved);
    println!(
        "documents (total / high-cardinality): {} / {}",
        summary.documents_processed, summary.high_cardinality_documents
    );
    println!(
        "edges (co-occurrence / secondary / merged): {} / {} / {}",
        summary.cooccurrence_edges, summary.secondary_edges, summary.merged_edges
    );
    println!("nodes:                       {}", summary.nodes);
}

fn run(cli: &Cli) -> EntigraphResult<()> {
    let config = cli.config()?;
    let write_manifest = config.write_manifest;
    let output =
        Pipeline::new(config).run_files(&cli.mentions, cli.relationships.as_deref())?;
    artifacts::write_all(&cli.out, &output, write_manifest)?;
    print_summary(&output.summary);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
