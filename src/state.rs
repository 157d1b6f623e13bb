//! Persisted run-control flags and artifact bookkeeping.
//!
//! The state file is a small JSON object shared with whatever drives the
//! pipeline (CLI, scheduler, HTTP control surface). Keys this crate does not
//! know about are preserved on every write.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::dataset::{count_rows, read_enriched_events_if_exists, read_json_if_exists, write_json_atomic};
use crate::error::Result;
use crate::models::YearSelector;

/// Locations of every pipeline artifact under one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    root: PathBuf,
}

impl PipelinePaths {
    /// Paths rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { root: data_dir.into() }
    }

    /// Root data directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw export as downloaded
    #[must_use]
    pub fn watch_history_html(&self) -> PathBuf {
        self.root.join("data").join("watch-history.html")
    }

    /// Raw row table
    #[must_use]
    pub fn watch_history_csv(&self) -> PathBuf {
        self.root.join("data").join("watch-history.csv")
    }

    /// Enriched row table
    #[must_use]
    pub fn enriched_csv(&self) -> PathBuf {
        self.root.join("data").join("watch-history-enriched.csv")
    }

    /// Summary marker
    #[must_use]
    pub fn summary_json(&self) -> PathBuf {
        self.root.join("data").join("watch-history-summary.json")
    }

    /// Published page marker
    #[must_use]
    pub fn wrapped_html(&self) -> PathBuf {
        self.root.join("data").join("youtube-wrapped.html")
    }

    /// Page published for one year (or `all`)
    #[must_use]
    pub fn published_page(&self, year: YearSelector) -> PathBuf {
        self.root.join("public").join(format!("youtube-wrapped-{year}.html"))
    }

    /// Cache directory
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Pipeline state file
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.cache_dir().join("config.json")
    }

    /// Metadata cache document
    #[must_use]
    pub fn metadata_cache(&self) -> PathBuf {
        self.cache_dir().join("youtube_metadata.json")
    }

    /// Category map for one region
    #[must_use]
    pub fn category_map(&self, region_code: &str) -> PathBuf {
        self.cache_dir().join(format!("youtube_category_{region_code}.json"))
    }

    /// Cached summary for one year (or `all`)
    #[must_use]
    pub fn yearly_summary(&self, year: YearSelector) -> PathBuf {
        self.cache_dir().join(format!("youtube-wrapped-{year}.json"))
    }
}

/// Where a run stands, derived from the persisted flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Nothing scheduled
    Idle,
    /// Batches keep being scheduled
    Running,
    /// Stop requested; acknowledged at the next batch boundary
    Stopping,
    /// The last run ran out of rows to enrich
    Exhausted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    processing: bool,
    #[serde(default)]
    keep_running: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    exhausted: bool,
    #[serde(default, rename = "youtube-api-key", skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Persisted run-control record
///
/// Every setter writes the file immediately, since other processes poll it.
#[derive(Debug, Clone)]
pub struct PipelineState {
    path: PathBuf,
    doc: StateDocument,
}

impl PipelineState {
    /// Load the state file, or start fresh (all flags false) if it is absent.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = read_json_if_exists(&path)?.unwrap_or_default();
        Ok(Self { path, doc })
    }

    /// Whether a run is marked active
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        self.doc.processing
    }

    /// Whether further batches should be scheduled
    #[must_use]
    pub const fn is_keep_running(&self) -> bool {
        self.doc.keep_running
    }

    /// Derived run phase
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        match (self.doc.processing, self.doc.keep_running) {
            (true, true) => RunPhase::Running,
            (true, false) => RunPhase::Stopping,
            _ if self.doc.exhausted => RunPhase::Exhausted,
            _ => RunPhase::Idle,
        }
    }

    /// Stored API key, if `setup` was run
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.doc.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Set the processing flag and save
    pub fn set_processing(&mut self, processing: bool) -> Result<()> {
        self.doc.processing = processing;
        self.save()
    }

    /// Set the keep-running flag and save
    pub fn set_keep_running(&mut self, keep_running: bool) -> Result<()> {
        self.doc.keep_running = keep_running;
        self.save()
    }

    /// Mark a run as started and save
    pub fn begin(&mut self) -> Result<()> {
        self.doc.processing = true;
        self.doc.keep_running = true;
        self.doc.exhausted = false;
        self.save()
    }

    /// Record natural exhaustion (no rows left) and save
    pub fn finish_exhausted(&mut self) -> Result<()> {
        self.doc.processing = false;
        self.doc.keep_running = false;
        self.doc.exhausted = true;
        info!("Enrichment exhausted; run finished");
        self.save()
    }

    /// Store the API key and save
    pub fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        self.doc.api_key = Some(api_key.to_string());
        self.save()
    }

    /// Write the state file
    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.doc)
    }
}

/// Progress report for the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingStatus {
    /// Derived run phase
    pub phase: RunPhase,
    /// Whether a run is marked active
    pub is_processing: bool,
    /// Rows in the raw table
    pub total_rows: usize,
    /// Rows in the enriched table, successful or not
    pub processed_rows: usize,
    /// Enriched rows that carry a duration
    pub enriched_rows: usize,
    /// Enriched rows the catalog did not know
    pub missing_rows: usize,
    /// Whether every raw row has been processed
    pub is_complete: bool,
    /// Raw export present
    pub source_data_exists: bool,
    /// Enriched table present
    pub enriched_data_exists: bool,
    /// Summary present
    pub summary_exists: bool,
    /// Published page present
    pub published_exists: bool,
    /// API key available from the state file
    pub has_api_key: bool,
}

impl ProcessingStatus {
    /// Collect the status from the files under `paths`.
    pub fn collect(paths: &PipelinePaths, state: &PipelineState) -> Result<Self> {
        let total_rows = count_rows(&paths.watch_history_csv())?;
        let enriched = read_enriched_events_if_exists(&paths.enriched_csv())?;
        let processed_rows = enriched.len();
        let enriched_rows = enriched.iter().filter(|row| row.duration_seconds.is_some()).count();
        let missing_rows = enriched
            .iter()
            .filter(|row| {
                row.error
                    .as_deref()
                    .is_some_and(|e| e.to_lowercase().contains("not found"))
            })
            .count();

        Ok(Self {
            phase: state.phase(),
            is_processing: state.is_processing(),
            total_rows,
            processed_rows,
            enriched_rows,
            missing_rows,
            is_complete: processed_rows == total_rows,
            source_data_exists: paths.watch_history_html().exists(),
            enriched_data_exists: paths.enriched_csv().exists(),
            summary_exists: paths.summary_json().exists(),
            published_exists: paths.wrapped_html().exists(),
            has_api_key: state.api_key().is_some(),
        })
    }
}
