use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

mod cli;

#[derive(Parser)]
#[command(name = "pricing-ingest")]
#[command(about = "Ingest and validate spreadsheet pricing submissions", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a workbook; it is stored as PENDING
    Upload(UploadArgs),
    /// Validate a file's header and process its rows
    Process(FileArgs),
    /// Show the status and rejection log of a file
    Results(ResultsArgs),
    /// List uploaded files, newest first
    List,
    /// Delete a PENDING or FAILED file
    Delete(FileArgs),
    /// Show active catalog parameters
    Catalog,
    /// Write a blank submission template for the current catalog
    Template(TemplateArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// Workbook to upload
    path: PathBuf,
    /// Override the MIME type guessed from the extension
    #[arg(long)]
    content_type: Option<String>,
}

#[derive(Args)]
struct FileArgs {
    file_id: Uuid,
}

#[derive(Args)]
struct ResultsArgs {
    file_id: Uuid,
    /// Print the results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct TemplateArgs {
    /// Output .xlsx path
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = pricing_ingest::IngestConfig::load(cli.config.as_deref())?;

    let default_filter = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let app = cli::App::connect(&config).await?;

    match cli.command {
        Commands::Upload(args) => app.upload(&args.path, args.content_type.as_deref()).await,
        Commands::Process(args) => app.process(args.file_id).await,
        Commands::Results(args) => app.results(args.file_id, args.json).await,
        Commands::List => app.list().await,
        Commands::Delete(args) => app.delete(args.file_id).await,
        Commands::Catalog => app.catalog().await,
        Commands::Template(args) => app.template(&args.output).await,
    }
}
