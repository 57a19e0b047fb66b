use crate::export::{export_filename, write_eligible_csv};
use crate::infra::{open_service, store};
use crate::server;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use placement_ready::config::AppConfig;
use placement_ready::eligibility::{PlacementError, RequestContext};
use placement_ready::error::AppError;
use placement_ready::telemetry;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Placement Readiness Tracker",
    about = "Serve and operate the placement readiness tracker",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Bring the database schema up to date and print what changed
    Migrate(StorageArgs),
    /// Re-evaluate every stored profile against the current criteria
    Recompute(StorageArgs),
    /// Write the eligible students to a CSV file
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct StorageArgs {
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ExportArgs {
    #[command(flatten)]
    pub(crate) storage: StorageArgs,
    /// Destination file; defaults to a dated name in the working directory
    #[arg(long, short)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate(args) => run_migrate(args),
        Command::Recompute(args) => run_recompute(args),
        Command::Export(args) => run_export(args),
    }
}

fn operator_config(args: StorageArgs) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::load()?;
    if let Some(database) = args.database {
        config.storage.database_path = database;
    }
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}

fn run_migrate(args: StorageArgs) -> Result<(), AppError> {
    let config = operator_config(args)?;
    let report = store(&config.storage).migrate()?;
    print_json(&report)
}

fn run_recompute(args: StorageArgs) -> Result<(), AppError> {
    let config = operator_config(args)?;
    let service = open_service(&config.storage)?;

    match service.recompute_all(&RequestContext::operator()) {
        Ok(report) => print_json(&report),
        Err(PlacementError::PartialCascade(report)) => {
            print_json(&report)?;
            Err(PlacementError::PartialCascade(report).into())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let config = operator_config(args.storage)?;
    let service = open_service(&config.storage)?;
    let students = service.list_eligible(&RequestContext::operator())?;

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(export_filename(Local::now().date_naive())));
    let file = File::create(&path)?;
    let written = write_eligible_csv(BufWriter::new(file), &students)?;
    println!("wrote {written} eligible student(s) to {}", path.display());
    Ok(())
}
