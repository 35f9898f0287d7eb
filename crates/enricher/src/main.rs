use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing::{error, warn};

use enricher::catalog::{self, CatalogSource};
use enricher::config::{load_config, validate_config, Config, StorageConfig};
use enricher::db::{state_repo, Database};
use enricher::error::{ConfigError, Result};
use enricher::export::{Consolidator, Exporter};
use enricher::generation::{GeminiClient, ImagenClient, VertexClient};
use enricher::pipeline::{Orchestrator, RunOptions};
use enricher::state::ProcessingStatus;
use enricher::{logging, secrets, storage};

#[derive(Parser, Debug)]
#[command(
    name = "enricher",
    version,
    about = "Resumable enrichment of product catalogs with generated images and descriptions",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, global = true, value_name = "PATH", default_value = "enricher.json")]
    config: PathBuf,

    /// Override the state store location
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enrich every eligible catalog record, resuming where the last run stopped
    Run(RunArgs),
    /// Join the catalog with the state store and publish the final report
    Consolidate,
    /// Show counts per status and the records that failed
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Records fetched from the catalog per page
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Total attempts allowed per record across runs
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Minimum delay between external-service calls, in milliseconds
    #[arg(long, value_name = "MS")]
    request_delay_ms: Option<u64>,

    /// Stop after attempting this many records
    #[arg(long, value_name = "N")]
    max_records: Option<usize>,

    /// Number of worker threads
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Skip progress snapshot export
    #[arg(long)]
    no_export: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Maximum number of failed records to list
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(config.logging.format, config.logging.filter.as_deref()) {
        eprintln!("warning: {}", e);
    }

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(&config, args),
        Commands::Consolidate => cmd_consolidate(&config),
        Commands::Status(args) => cmd_status(&config, args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, connectivity = e.is_connectivity(), "Command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads the config file and applies command-line overrides.
fn load(cli: &Cli) -> std::result::Result<Config, ConfigError> {
    let mut config = load_config(&cli.config)?;

    if let Some(path) = &cli.database {
        config.database_path = Some(path.to_string_lossy().into_owned());
    }
    if let Commands::Run(args) = &cli.command {
        let run = &mut config.run;
        if let Some(v) = args.batch_size {
            run.batch_size = v;
        }
        if let Some(v) = args.max_attempts {
            run.max_attempts = v;
        }
        if let Some(v) = args.request_delay_ms {
            run.request_delay_ms = v;
        }
        if let Some(v) = args.max_records {
            run.max_records = Some(v);
        }
        if let Some(v) = args.workers {
            run.workers = v;
        }
    }

    validate_config(&config)?;
    Ok(config)
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config
        .database_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "Cannot determine state store location; set database_path".to_string(),
        })?;
    Ok(Database::open(&path)?)
}

fn open_catalog(config: &Config) -> Result<Arc<dyn CatalogSource>> {
    Ok(Arc::from(catalog::open(&config.catalog)?))
}

/// Local stores need no credentials.
fn storage_token(config: &Config) -> Result<SecretString> {
    match &config.storage {
        StorageConfig::Filesystem { .. } => Ok(SecretString::from(String::new())),
        StorageConfig::Gcs { .. } => Ok(secrets::resolve_access_token(&config.generation)?),
    }
}

fn cmd_run(config: &Config, args: &RunArgs) -> Result<ExitCode> {
    let db = open_database(config)?;
    let catalog = open_catalog(config)?;

    let token = secrets::resolve_access_token(&config.generation)?;
    let vertex = Arc::new(VertexClient::new(&config.generation, token.clone())?);
    let images = Arc::new(ImagenClient::new(
        Arc::clone(&vertex),
        &config.generation.image_model,
    ));
    let descriptions = Arc::new(GeminiClient::new(
        vertex,
        &config.generation.description_model,
    ));
    let store = storage::open(&config.storage, token, config.generation.timeout())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handler = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            eprintln!("Forced exit");
            std::process::exit(130);
        }
        eprintln!("Stopping after the current record (Ctrl-C again to force)");
    });
    if let Err(e) = handler {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }

    let mut orchestrator =
        Orchestrator::new(db, catalog, images, descriptions, Arc::clone(&store))
            .with_shutdown(shutdown);
    if !args.no_export {
        orchestrator = orchestrator.with_observer(Arc::new(Exporter::new(
            store,
            &config.output_directory,
            config.run.snapshot_every,
            Utc::now(),
        )));
    }

    let summary = orchestrator.run(&RunOptions::from_config(&config.run))?;

    println!("examined:           {}", summary.examined);
    println!("skipped:            {}", summary.skipped);
    println!("attempted:          {}", summary.attempted);
    println!("completed:          {}", summary.completed);
    println!("failed:             {}", summary.failed);
    println!("permanently failed: {}", summary.permanently_failed);
    if summary.abandoned > 0 {
        println!("abandoned:          {}", summary.abandoned);
    }
    if summary.interrupted {
        println!("interrupted:        yes");
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_consolidate(config: &Config) -> Result<ExitCode> {
    let db = open_database(config)?;
    let catalog = open_catalog(config)?;
    let store = storage::open(
        &config.storage,
        storage_token(config)?,
        config.generation.timeout(),
    )?;

    let output = Consolidator::new(
        db,
        catalog,
        store,
        &config.output_directory,
        config.run.batch_size,
    )
    .run()?;

    let s = &output.summary;
    println!("report:             {}", output.local_path.display());
    println!("uploaded:           {}", output.uri);
    println!("total:              {}", s.total);
    println!("completed:          {}", s.completed);
    println!("failed:             {}", s.failed);
    println!("permanently failed: {}", s.permanently_failed);
    println!("pending:            {}", s.pending);
    println!("processing:         {}", s.processing);
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(config: &Config, args: &StatusArgs) -> Result<ExitCode> {
    let db = open_database(config)?;

    for (status, count) in state_repo::count_by_status(&db)? {
        println!("{:<20}{}", status.as_str(), count);
    }
    let eligible = state_repo::retry_eligible(&db, config.run.max_attempts)?;
    println!("{:<20}{}", "retry eligible", eligible.len());

    let mut failures = state_repo::query_by_status(&db, ProcessingStatus::PermanentlyFailed)?;
    failures.extend(state_repo::query_by_status(&db, ProcessingStatus::Failed)?);
    if failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    for state in failures.iter().take(args.limit) {
        println!(
            "{:>10}  {:<18}  attempts={}  {}",
            state.id,
            state.status.as_str(),
            state.attempt_count,
            state.last_error.as_deref().unwrap_or("-")
        );
    }
    if failures.len() > args.limit {
        println!("... and {} more", failures.len() - args.limit);
    }
    Ok(ExitCode::SUCCESS)
}
