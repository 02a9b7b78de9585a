//! Document Pipeline CLI - Intake and chapter processing tool
//!
//! Command-line interface for admitting raw documents into the staging area
//! and driving the downstream processing stages.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

use commands::intake::IntakeCommand;
use commands::jobs::JobsCommand;
use commands::mark_failed::MarkFailedCommand;
use commands::process::ProcessCommand;

#[derive(Parser)]
#[command(
    name = "docpipe",
    version,
    about = "Document intake and chapter processing pipeline",
    long_about = "Admit raw documents into the staging area exactly once, then run the\n\
                  downstream stages: image extraction, OCR, markdown generation, and\n\
                  final manual assembly.",
    after_help = "EXAMPLES:\n  \
                  # Admit a freshly uploaded document\n  \
                  docpipe intake --bucket doc-ingest --key intake-raw/provisioning.docx\n\n  \
                  # Admit from a recorded object-created event\n  \
                  docpipe intake --event event.json\n\n  \
                  # Run the full pipeline for a staged chapter\n  \
                  docpipe process --bucket doc-ingest --chapter provisioning\n\n  \
                  # Re-run only the later stages\n  \
                  docpipe process --bucket doc-ingest --chapter provisioning --stages markdown_generation,assembly\n\n  \
                  # Inspect admission records\n  \
                  docpipe jobs --basename provisioning\n\n\
                  For more details on a specific command:\n  \
                  docpipe <COMMAND> --help"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Admit a raw document into the staging area
    Intake(IntakeCommand),

    /// Run processing stages for a staged chapter
    Process(ProcessCommand),

    /// Inspect admission jobs recorded in the ledger
    Jobs(JobsCommand),

    /// Annotate a job record as failed
    MarkFailed(MarkFailedCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Execute command
    match cli.command {
        Commands::Intake(cmd) => cmd.execute().await,
        Commands::Process(cmd) => cmd.execute().await,
        Commands::Jobs(cmd) => cmd.execute().await,
        Commands::MarkFailed(cmd) => cmd.execute().await,
    }
}
