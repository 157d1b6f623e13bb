//! The resumable enrichment pipeline.
//!
//! [`EnrichmentEngine::process_batch`] enriches one bounded batch of raw rows
//! per call and is meant to be invoked repeatedly until it reports
//! [`BatchOutcome::Exhausted`]. Rows already present in the enriched table,
//! successful or not, are never processed again.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, TimeZone};
use tracing::{debug, info, warn};

use crate::cache::MetadataCache;
use crate::catalog::{CatalogApi, CatalogClient, MAX_IDS_PER_REQUEST};
use crate::categories::CategoryMap;
use crate::config::CatalogConfig;
use crate::dataset::{read_enriched_events_if_exists, read_watch_events, write_enriched_events};
use crate::error::Result;
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::models::{CatalogEntry, EnrichedEvent, NaturalKey, VideoMetadata, WatchEvent};
use crate::state::{PipelinePaths, PipelineState};
use crate::utils::{extract_video_id, parse_iso8601_duration, parse_watch_time, VIDEO_ID_NOT_FOUND};

/// Where the engine keeps its caches and how it talks to the catalog
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// Metadata cache document
    pub metadata_cache: PathBuf,
    /// Category map file for `region_code`
    pub category_map: PathBuf,
    /// Region whose category names are used
    pub region_code: String,
    /// Rows per catalog sub-batch
    pub chunk_size: usize,
}

impl EnrichmentSettings {
    /// Settings for the standard artifact layout
    #[must_use]
    pub fn from_config(paths: &PipelinePaths, catalog: &CatalogConfig) -> Self {
        Self {
            metadata_cache: paths.metadata_cache(),
            category_map: paths.category_map(&catalog.region_code),
            region_code: catalog.region_code.clone(),
            chunk_size: catalog.max_ids_per_request.clamp(1, MAX_IDS_PER_REQUEST),
        }
    }
}

/// Result of one `process_batch` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// `keep_running` was false; no file was touched
    Skipped,
    /// No rows were left; the run flags were cleared
    Exhausted,
    /// A batch was written
    Processed {
        /// Rows written without an error
        enriched: usize,
        /// Rows written with an error
        failed: usize,
        /// Rows still waiting after this batch
        remaining: usize,
    },
}

/// Turns raw watch events into enriched rows, one bounded batch at a time.
pub struct EnrichmentEngine<'a, A: CatalogApi + ?Sized, Tz: TimeZone = Local> {
    api: &'a A,
    settings: EnrichmentSettings,
    tz: Tz,
}

impl<'a, A: CatalogApi + ?Sized> EnrichmentEngine<'a, A, Local> {
    /// Engine interpreting naive watch times in the host's local timezone
    pub const fn new(api: &'a A, settings: EnrichmentSettings) -> Self {
        Self {
            api,
            settings,
            tz: Local,
        }
    }
}

impl<'a, A: CatalogApi + ?Sized, Tz: TimeZone> EnrichmentEngine<'a, A, Tz> {
    /// Interpret naive watch times in `tz` instead.
    pub fn with_timezone<Tz2: TimeZone>(self, tz: Tz2) -> EnrichmentEngine<'a, A, Tz2> {
        EnrichmentEngine {
            api: self.api,
            settings: self.settings,
            tz,
        }
    }

    /// Enrich the next batch of at most `batch_size` rows.
    ///
    /// With a `year_filter`, only rows whose watch time parses into that year
    /// are candidates. New rows are written ahead of the existing ones and the
    /// whole enriched table is replaced in one go. Per-row catalog failures
    /// end up in the `error` column; only local file problems return `Err`.
    pub fn process_batch(
        &self,
        state: &mut PipelineState,
        raw_path: &Path,
        enriched_path: &Path,
        batch_size: usize,
        year_filter: Option<i32>,
        metrics: &mut PipelineMetrics,
    ) -> Result<BatchOutcome> {
        if !state.is_keep_running() {
            debug!("keep_running is false; skipping batch");
            return Ok(BatchOutcome::Skipped);
        }

        let timer = OperationTimer::new("enrichment_batch");
        let raw = read_watch_events(raw_path)?;
        let mut cache = MetadataCache::load(&self.settings.metadata_cache)?;
        let existing = read_enriched_events_if_exists(enriched_path)?;

        let mut seen: HashSet<NaturalKey> = existing.iter().map(EnrichedEvent::natural_key).collect();
        let pending: Vec<&WatchEvent> = raw
            .iter()
            .filter(|row| self.in_year(row, year_filter))
            .filter(|row| seen.insert(row.natural_key()))
            .collect();

        if pending.is_empty() {
            state.finish_exhausted()?;
            return Ok(BatchOutcome::Exhausted);
        }

        let batch = &pending[..pending.len().min(batch_size)];
        let remaining = pending.len() - batch.len();
        info!(
            batch = batch.len(),
            remaining,
            already_enriched = existing.len(),
            "Enriching batch"
        );

        let client = CatalogClient::new(self.api).with_chunk_size(self.settings.chunk_size);
        let mut new_rows = Vec::with_capacity(batch.len() + existing.len());
        for chunk in batch.chunks(self.settings.chunk_size.max(1)) {
            new_rows.extend(enrich_chunk(&client, chunk, &mut cache, metrics));
        }

        cache.flush()?;

        if new_rows.iter().any(|row| row.category_id.is_some()) {
            let categories = CategoryMap::load_or_fetch(self.api, &self.settings.region_code, &self.settings.category_map)?;
            for row in &mut new_rows {
                row.category_name = row
                    .category_id
                    .as_deref()
                    .and_then(|id| categories.name(id))
                    .map(str::to_string);
            }
        }

        let failed = new_rows.iter().filter(|row| row.error.is_some()).count();
        let enriched = new_rows.len() - failed;

        new_rows.extend(existing);
        write_enriched_events(enriched_path, &new_rows)?;

        metrics.record_batch(enriched, failed, timer.finish());
        info!(enriched, failed, total = new_rows.len(), "Batch written");

        Ok(BatchOutcome::Processed {
            enriched,
            failed,
            remaining,
        })
    }

    fn in_year(&self, row: &WatchEvent, year_filter: Option<i32>) -> bool {
        year_filter.is_none_or(|year| {
            parse_watch_time(&row.watch_time, &self.tz).is_some_and(|at| at.year() == year)
        })
    }
}

fn enrich_chunk<A: CatalogApi + ?Sized>(
    client: &CatalogClient<'_, A>,
    chunk: &[&WatchEvent],
    cache: &mut MetadataCache,
    metrics: &mut PipelineMetrics,
) -> Vec<EnrichedEvent> {
    let ids: Vec<Option<&str>> = chunk.iter().map(|row| extract_video_id(&row.video_link)).collect();

    let mut unique: Vec<String> = Vec::new();
    let mut queued: HashSet<&str> = HashSet::new();
    for id in ids.iter().flatten().copied() {
        if queued.insert(id) {
            unique.push(id.to_string());
        }
    }

    let fetched = client.fetch(&unique, cache, metrics);
    let by_id: HashMap<&str, &CatalogEntry> = unique.iter().map(String::as_str).zip(fetched.iter()).collect();

    chunk
        .iter()
        .zip(ids)
        .map(|(raw, id)| {
            let mut row = EnrichedEvent::from_raw(raw);
            match id.and_then(|id| by_id.get(id).map(|entry| (id, *entry))) {
                None => row.error = Some(VIDEO_ID_NOT_FOUND.to_string()),
                Some((_, CatalogEntry::Failure(message))) => row.error = Some(message.clone()),
                Some((id, CatalogEntry::Metadata(metadata))) => merge_metadata(&mut row, id, metadata),
            }
            row
        })
        .collect()
}

// Catalog values win over the export's own title and channel fields.
fn merge_metadata(row: &mut EnrichedEvent, id: &str, metadata: &VideoMetadata) {
    row.duration_seconds = match metadata.duration_iso() {
        Some(raw) => {
            let parsed = parse_iso8601_duration(raw);
            if parsed.is_none() {
                warn!(video_id = id, duration = raw, "Unparseable duration; leaving it empty");
            }
            parsed
        },
        None => {
            warn!(video_id = id, "Catalog returned no duration");
            None
        },
    };
    row.category_id = metadata.category_id().map(str::to_string);
    if let Some(channel) = metadata.channel_title() {
        row.channel_name = Some(channel.to_string());
    }
    if let Some(channel_id) = metadata.channel_id() {
        row.channel_link = Some(format!("https://www.youtube.com/channel/{channel_id}"));
    }
    if let Some(title) = metadata.title() {
        row.video_name = Some(title.to_string());
    }
}
