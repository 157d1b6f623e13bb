use metrics::{counter, histogram};
use std::time::Duration;

/// Metric names emitted through the `metrics` facade
pub mod names {
    /// Rows written to the enriched dataset with metadata
    pub const ROWS_ENRICHED: &str = "watch_wrapped_rows_enriched_total";
    /// Rows written to the enriched dataset with an error
    pub const ROWS_FAILED: &str = "watch_wrapped_rows_failed_total";
    /// Catalog requests, labelled by status
    pub const CATALOG_REQUESTS: &str = "watch_wrapped_catalog_requests_total";
    /// Metadata cache lookups, labelled by result
    pub const CACHE_LOOKUPS: &str = "watch_wrapped_cache_lookups_total";
    /// Batch wall time
    pub const BATCH_DURATION: &str = "watch_wrapped_batch_duration_seconds";
    /// Summary generation wall time
    pub const SUMMARY_DURATION: &str = "watch_wrapped_summary_duration_seconds";
}

/// Per-run tallies, mirrored to the `metrics` facade as they are recorded.
///
/// Without an installed recorder the facade calls are no-ops; the in-process
/// fields are what the pipeline reports back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineMetrics {
    /// Rows enriched with metadata
    pub rows_enriched: u64,
    /// Rows written with an error
    pub rows_failed: u64,
    /// Catalog requests issued
    pub catalog_requests: u64,
    /// Catalog requests that failed at the transport/HTTP level
    pub catalog_failures: u64,
    /// Identifiers answered from the cache
    pub cache_hits: u64,
    /// Identifiers that needed a request
    pub cache_misses: u64,
    /// Batches written
    pub batches: u64,
}

impl PipelineMetrics {
    /// Record one catalog request
    pub fn record_catalog_request(&mut self, success: bool) {
        self.catalog_requests += 1;
        if !success {
            self.catalog_failures += 1;
        }
        counter!(names::CATALOG_REQUESTS, "status" => if success { "success" } else { "error" }).increment(1);
    }

    /// Record a cache hit
    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
        counter!(names::CACHE_LOOKUPS, "result" => "hit").increment(1);
    }

    /// Record a cache miss
    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
        counter!(names::CACHE_LOOKUPS, "result" => "miss").increment(1);
    }

    /// Record a written batch
    pub fn record_batch(&mut self, enriched: usize, failed: usize, duration: Duration) {
        self.batches += 1;
        self.rows_enriched += enriched as u64;
        self.rows_failed += failed as u64;
        counter!(names::ROWS_ENRICHED).increment(enriched as u64);
        counter!(names::ROWS_FAILED).increment(failed as u64);
        histogram!(names::BATCH_DURATION).record(duration.as_secs_f64());
    }

    /// Record a summary generation
    pub fn record_summary(year: &str, duration: Duration) {
        histogram!(names::SUMMARY_DURATION, "year" => year.to_string()).record(duration.as_secs_f64());
    }

    /// Share of looked-up identifiers answered from the cache
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
