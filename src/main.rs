use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use watch_wrapped::config::AppConfig;
use watch_wrapped::logging::{init_logging, OperationTimer};
use watch_wrapped::metrics::PipelineMetrics;
use watch_wrapped::service::PipelineService;
use watch_wrapped::state::RunPhase;
use watch_wrapped::validation::InputValidator;
use watch_wrapped::YouTubeApi;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory of the pipeline's data and cache files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the catalog API key
    Setup {
        /// YouTube Data API key
        #[arg(long)]
        api_key: String,
    },
    /// Mark a run as started
    Start,
    /// Request the current run to stop after its batch
    Stop,
    /// Print processing status as JSON
    Status,
    /// Run one scheduled enrichment step
    Process,
    /// Start if needed and keep enriching until finished or stopped
    Run,
    /// Print the summary for a year
    Summarize {
        /// Calendar year or "all"
        #[arg(short, long, default_value = "all")]
        year: String,

        /// Recompute even if a cached summary exists
        #[arg(long)]
        force: bool,
    },
    /// Print headline numbers for every year
    Years,
    /// Delete the enriched dataset and cached summaries
    Reset,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;
    if let Some(dir) = &cli.data_dir {
        InputValidator::validate_data_dir(dir)?;
        config.data_dir.clone_from(dir);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
        config.validate()?;
    }

    // Initialize logging
    let log_file = config.logging.file_path.as_deref().map(Path::new);
    let _guard = init_logging(Some(&config.get_log_level()), log_file, config.logging.format == "json")?;

    info!(data_dir = %config.data_dir.display(), "Starting watch-wrapped");
    let service = PipelineService::new(config);

    // Process command
    match &cli.command {
        Commands::Setup { api_key } => {
            service.setup(api_key)?;
            print_json(&serde_json::json!({"success": true}))?;
        },
        Commands::Start => {
            service.start()?;
            print_json(&service.status()?)?;
        },
        Commands::Stop => {
            let phase = service.stop()?;
            print_json(&serde_json::json!({"success": true, "phase": phase}))?;
        },
        Commands::Status => print_json(&service.status()?)?,
        Commands::Process => {
            let api = build_api(&service)?;
            let mut metrics = PipelineMetrics::default();
            let outcome = service.step(&api, &mut metrics)?;
            print_json(&serde_json::json!({"outcome": outcome, "status": service.status()?}))?;
        },
        Commands::Run => run_to_completion(&service)?,
        Commands::Summarize { year, force } => {
            let year = InputValidator::parse_year_selector(year)?;
            let store = service.summaries();
            let summary = if *force {
                store.regenerate(year)?
            } else {
                store.load_or_generate(year)?
            };
            print_json(&summary)?;
        },
        Commands::Years => print_json(&service.summaries().overview()?)?,
        Commands::Reset => {
            service.reset_enriched()?;
            print_json(&serde_json::json!({"success": true}))?;
        },
    }

    Ok(())
}

/// Start a run unless one is active, then step until it ends
fn run_to_completion(service: &PipelineService) -> Result<()> {
    let timer = OperationTimer::new("run");
    if service.load_state()?.phase() != RunPhase::Running {
        service.start().context("Failed to start processing")?;
    }

    let api = build_api(service)?;
    let mut metrics = PipelineMetrics::default();
    let outcome = service.run(&api, &mut metrics)?;
    let elapsed = timer.finish();

    debug!(cache_hit_ratio = metrics.cache_hit_ratio(), "Catalog cache usage");
    print_json(&serde_json::json!({
        "outcome": outcome,
        "batches": metrics.batches,
        "rows_enriched": metrics.rows_enriched,
        "rows_failed": metrics.rows_failed,
        "catalog_requests": metrics.catalog_requests,
        "elapsed_secs": elapsed.as_secs(),
    }))
}

fn build_api(service: &PipelineService) -> Result<YouTubeApi> {
    let api_key = service
        .api_key()?
        .context("No API key configured; run `watch-wrapped setup --api-key <KEY>` first")?;
    Ok(YouTubeApi::new(&service.config().catalog, &api_key)?)
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
