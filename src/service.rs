//! Run control and summary bookkeeping on top of the enrichment engine.
//!
//! [`PipelineService`] is what a control surface (the CLI, a scheduler, an
//! HTTP handler) talks to: it starts and stops runs, executes scheduled
//! steps, reports status and resets the enriched dataset. [`SummaryStore`]
//! owns the cached yearly summaries.

use std::time::Duration;

use chrono::{Local, TimeZone};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregation::Aggregator;
use crate::catalog::CatalogApi;
use crate::config::AppConfig;
use crate::dataset::{read_enriched_events_if_exists, read_json_if_exists, write_json_atomic};
use crate::enrichment::{BatchOutcome, EnrichmentEngine, EnrichmentSettings};
use crate::error::{Result, WrappedError};
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::models::{YearSelector, YearlySummary};
use crate::state::{PipelinePaths, PipelineState, ProcessingStatus, RunPhase};
use crate::validation::InputValidator;

/// What a scheduled step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// A batch was written; schedule another step
    Continue,
    /// No rows were left; the run is over
    Finished,
    /// A stop request was acknowledged
    Stopped,
    /// No run is active
    Idle,
}

/// Control surface of the pipeline
pub struct PipelineService {
    config: AppConfig,
    paths: PipelinePaths,
}

impl PipelineService {
    /// Service over the artifacts under `config.data_dir`
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let paths = PipelinePaths::new(config.data_dir.clone());
        Self { config, paths }
    }

    /// Artifact locations
    #[must_use]
    pub const fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    /// Loaded configuration
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current persisted state
    pub fn load_state(&self) -> Result<PipelineState> {
        PipelineState::load(self.paths.state_file())
    }

    /// API key from the configuration, else the one stored by [`Self::setup`]
    pub fn api_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.config.catalog.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(Some(key.to_string()));
        }
        Ok(self.load_state()?.api_key().map(str::to_string))
    }

    /// Validate and store the catalog API key.
    pub fn setup(&self, api_key: &str) -> Result<()> {
        InputValidator::validate_api_key(api_key).map_err(|e| WrappedError::InvalidInput(e.to_string()))?;
        let mut state = self.load_state()?;
        state.set_api_key(api_key)?;
        info!("API key stored");
        Ok(())
    }

    /// Begin a run. Needs the raw row table and an API key.
    pub fn start(&self) -> Result<()> {
        let raw = self.paths.watch_history_csv();
        if !raw.exists() {
            return Err(WrappedError::Precondition(format!(
                "no raw watch history at {}",
                raw.display()
            )));
        }
        if self.api_key()?.is_none() {
            return Err(WrappedError::Precondition("no catalog API key configured".to_string()));
        }

        let mut state = self.load_state()?;
        state.begin()?;
        info!("Processing started");
        Ok(())
    }

    /// Request a stop. Takes effect at the next batch boundary.
    pub fn stop(&self) -> Result<RunPhase> {
        let mut state = self.load_state()?;
        state.set_keep_running(false)?;
        info!(phase = ?state.phase(), "Stop requested");
        Ok(state.phase())
    }

    /// Run at most one enrichment batch.
    pub fn step<A: CatalogApi + ?Sized>(&self, api: &A, metrics: &mut PipelineMetrics) -> Result<StepOutcome> {
        let mut state = self.load_state()?;
        match state.phase() {
            RunPhase::Idle | RunPhase::Exhausted => return Ok(StepOutcome::Idle),
            RunPhase::Stopping => {
                state.set_processing(false)?;
                info!("Stop acknowledged");
                return Ok(StepOutcome::Stopped);
            },
            RunPhase::Running => {},
        }

        let engine = EnrichmentEngine::new(api, EnrichmentSettings::from_config(&self.paths, &self.config.catalog));
        let outcome = engine.process_batch(
            &mut state,
            &self.paths.watch_history_csv(),
            &self.paths.enriched_csv(),
            self.config.enrichment.batch_size,
            self.config.enrichment.year_filter,
            metrics,
        )?;

        match outcome {
            BatchOutcome::Processed { remaining, .. } => {
                // The enriched table was rewritten, so cached summaries are stale.
                self.summaries().clear()?;
                info!(remaining, "Batch complete");
                Ok(StepOutcome::Continue)
            },
            BatchOutcome::Exhausted => {
                // New rows make every cached summary stale.
                self.summaries().clear()?;
                Ok(StepOutcome::Finished)
            },
            BatchOutcome::Skipped => {
                state.set_processing(false)?;
                Ok(StepOutcome::Stopped)
            },
        }
    }

    /// Keep stepping until the run finishes, is stopped, or fails too often.
    ///
    /// A failed step is logged and retried on the next tick. After
    /// `max_consecutive_failures` failures in a row the run is marked as no
    /// longer processing and the last error is returned.
    pub fn run<A: CatalogApi + ?Sized>(&self, api: &A, metrics: &mut PipelineMetrics) -> Result<StepOutcome> {
        let poll_interval = Duration::from_secs(self.config.enrichment.poll_interval_secs);
        let max_failures = self.config.enrichment.max_consecutive_failures;
        let mut failures = 0;

        loop {
            match self.step(api, metrics) {
                Ok(StepOutcome::Continue) => failures = 0,
                Ok(outcome) => {
                    info!(?outcome, batches = metrics.batches, rows = metrics.rows_enriched, "Run ended");
                    return Ok(outcome);
                },
                Err(e) => {
                    failures += 1;
                    if failures >= max_failures {
                        error!(error = %e, failures, "Giving up after repeated failures");
                        let mut state = self.load_state()?;
                        state.set_processing(false)?;
                        return Err(e);
                    }
                    warn!(error = %e, failures, "Batch failed; retrying on next tick");
                },
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Delete the enriched dataset and every cached summary.
    ///
    /// The metadata cache and category map are kept, so re-enrichment is
    /// served mostly from disk.
    pub fn reset_enriched(&self) -> Result<()> {
        let state = self.load_state()?;
        if state.phase() == RunPhase::Running {
            return Err(WrappedError::Precondition(
                "cannot reset while processing; stop the run first".to_string(),
            ));
        }

        let enriched = self.paths.enriched_csv();
        if enriched.exists() {
            std::fs::remove_file(&enriched)?;
            info!(path = %enriched.display(), "Enriched dataset deleted");
        }
        self.summaries().clear()
    }

    /// Progress report
    pub fn status(&self) -> Result<ProcessingStatus> {
        let state = self.load_state()?;
        let mut status = ProcessingStatus::collect(&self.paths, &state)?;
        if !status.has_api_key {
            status.has_api_key = self.api_key()?.is_some();
        }
        Ok(status)
    }

    /// Sorted distinct years present in the enriched dataset
    pub fn available_years(&self) -> Result<Vec<i32>> {
        let rows = read_enriched_events_if_exists(&self.paths.enriched_csv())?;
        Ok(Aggregator::local().available_years(&rows))
    }

    /// Summary store over the same data directory
    #[must_use]
    pub fn summaries(&self) -> SummaryStore {
        SummaryStore::new(self.paths.clone())
    }
}

/// Headline numbers of one cached summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearOverview {
    /// Year the numbers cover
    pub year: YearSelector,
    /// Number of watch events
    pub total_views: u64,
    /// Whole hours watched
    pub total_hours: u64,
    /// Distinct active days
    pub total_days: u64,
    /// Average watch time per active day, `H:MM`
    pub average_per_day: String,
    /// Whether a page was published for this year
    pub published: bool,
}

/// Cached yearly summaries, one JSON file per year plus `all`
pub struct SummaryStore<Tz: TimeZone = Local> {
    paths: PipelinePaths,
    aggregator: Aggregator<Tz>,
}

impl SummaryStore<Local> {
    /// Store aggregating in the host's local timezone
    #[must_use]
    pub const fn new(paths: PipelinePaths) -> Self {
        Self {
            paths,
            aggregator: Aggregator::local(),
        }
    }
}

impl<Tz: TimeZone> SummaryStore<Tz> {
    /// Store aggregating with `aggregator`
    #[must_use]
    pub const fn with_aggregator(paths: PipelinePaths, aggregator: Aggregator<Tz>) -> Self {
        Self { paths, aggregator }
    }

    /// Cached summary for `year`, computed and saved first if absent.
    pub fn load_or_generate(&self, year: YearSelector) -> Result<YearlySummary> {
        match read_json_if_exists(&self.paths.yearly_summary(year))? {
            Some(summary) => Ok(summary),
            None => self.regenerate(year),
        }
    }

    /// Recompute the summary for `year` from the full enriched dataset and save it.
    pub fn regenerate(&self, year: YearSelector) -> Result<YearlySummary> {
        let timer = OperationTimer::new("summarize");
        let rows = read_enriched_events_if_exists(&self.paths.enriched_csv())?;
        let summary = self.aggregator.summarize(&rows, year);

        let path = self.paths.yearly_summary(year);
        write_json_atomic(&path, &summary)?;
        PipelineMetrics::record_summary(&year.to_string(), timer.finish());
        info!(%year, views = summary.total_views, path = %path.display(), "Summary saved");
        Ok(summary)
    }

    /// Headline numbers for every year in the dataset, then for `all`.
    ///
    /// Empty when there is no enriched dataset yet.
    pub fn overview(&self) -> Result<Vec<YearOverview>> {
        let rows = read_enriched_events_if_exists(&self.paths.enriched_csv())?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let selectors = self
            .aggregator
            .available_years(&rows)
            .into_iter()
            .map(YearSelector::Year)
            .chain(std::iter::once(YearSelector::All));

        let mut overview = Vec::new();
        for year in selectors {
            let summary = self.load_or_generate(year)?;
            overview.push(YearOverview {
                year,
                total_views: summary.total_views,
                total_hours: summary.total_hours,
                total_days: summary.total_days,
                average_per_day: summary.average_per_day(),
                published: self.paths.published_page(year).exists(),
            });
        }
        Ok(overview)
    }

    /// Delete every cached summary file.
    pub fn clear(&self) -> Result<()> {
        let dir = self.paths.cache_dir();
        if !dir.exists() {
            return Ok(());
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_summary = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("youtube-wrapped-") && name.ends_with(".json"));
            if is_summary {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Cached summaries cleared");
        }
        Ok(())
    }
}
