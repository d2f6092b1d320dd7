//! Bronze Ingest - one ingestion task per invocation

use bronze_common::logging::{init_logging, LogConfig, LogLevel};
use bronze_ingest::pipeline::{self, pathway_commons};
use bronze_ingest::{jobs, IngestConfig, IngestContext, IngestError, SourceGroup, SourcesDocument};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bronze-ingest")]
#[command(author, version, about = "Version-gated bronze layer ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a REST API source
    Api {
        #[arg(short, long)]
        id: String,
    },

    /// Ingest an FTP directory source
    Ftp {
        #[arg(short, long)]
        id: String,
    },

    /// Ingest an ontology from OLS
    Ols {
        #[arg(short, long)]
        id: String,
    },

    /// Ingest files linked from web pages
    Web {
        #[arg(short, long)]
        id: String,
    },

    /// Ingest a BioPortal ontology
    #[command(name = "bioportal")]
    BioPortal {
        #[arg(short, long)]
        id: String,
    },

    /// Ingest the Pathway Commons HGNC export
    #[command(alias = "pathway_commons")]
    PathwayCommons,

    /// Re-run extraction for an already ingested source
    Extract {
        #[arg(short, long)]
        id: String,
    },

    /// Print the task list for the scheduler as JSON
    Plan,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), IngestError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| IngestError::Config(format!("cannot render output: {e}")))?;
    println!("{text}");
    Ok(())
}

async fn ingest(
    config: IngestConfig,
    sources: &SourcesDocument,
    group: SourceGroup,
    id: &str,
) -> Result<(), IngestError> {
    let ctx = IngestContext::connect(config).await?;
    let outcome = pipeline::run_source(&ctx, sources, group, id).await?;
    print_json(&outcome)
}

async fn run(command: Command) -> Result<(), IngestError> {
    let config = IngestConfig::from_env()?;
    let sources = SourcesDocument::load(&config.sources_path)?;

    match command {
        Command::Api { id } => ingest(config, &sources, SourceGroup::Api, &id).await,
        Command::Ftp { id } => ingest(config, &sources, SourceGroup::Ftp, &id).await,
        Command::Ols { id } => ingest(config, &sources, SourceGroup::Ols, &id).await,
        Command::Web { id } => ingest(config, &sources, SourceGroup::Web, &id).await,
        Command::BioPortal { id } => ingest(config, &sources, SourceGroup::BioPortal, &id).await,
        Command::PathwayCommons => {
            ingest(config, &sources, SourceGroup::Custom, pathway_commons::SOURCE_ID).await
        },
        Command::Extract { id } => {
            let ctx = IngestContext::connect(config).await?;
            let files = ctx.extractor().extract_source(&id).await?;
            info!(source = %id, files = files.len(), "Extraction complete");
            print_json(&files)
        },
        Command::Plan => {
            let tasks = jobs::plan_tasks(&config.jobs, &sources)?;
            info!(tasks = tasks.len(), "Planned tasks");
            print_json(&tasks)
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bronze-ingest")
        .build();

    let _guard = match log_config.merge_env().and_then(|config| init_logging(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e:#}");
            return ExitCode::from(2);
        },
    };

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "Ingestion failed");
            ExitCode::from(e.exit_code())
        },
    }
}
