//! Watch Wrapped - Watch History Enrichment and Yearly Summaries
//!
//! A Rust library that enriches a personal video watch-history export with
//! catalog metadata and aggregates it into yearly "wrapped" reports.
//!
//! # Features
//!
//! - Resumable, batch-at-a-time enrichment against the YouTube Data API
//! - Persistent metadata and category caches
//! - Deterministic yearly and all-time summaries
//! - Run control (start, stop, status) through a persisted state file

/// Aggregation of enriched rows into yearly summaries
pub mod aggregation;
/// Persistent catalog metadata cache
pub mod cache;
/// Catalog API seam and the cache-backed batch fetcher
pub mod catalog;
/// Category id to name mapping
pub mod categories;
/// Configuration management
pub mod config;
/// CSV and JSON file I/O
pub mod dataset;
/// Batch enrichment pipeline
pub mod enrichment;
/// Error types
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Run control and summary store
pub mod service;
/// Persisted pipeline state and artifact layout
pub mod state;
/// Link, duration and timestamp parsing
pub mod utils;
/// Input validation
pub mod validation;

// Re-export key components for easier access
pub use aggregation::{summarize, Aggregator};
pub use catalog::{CatalogApi, CatalogClient, YouTubeApi};
pub use enrichment::{BatchOutcome, EnrichmentEngine, EnrichmentSettings};
pub use error::{Result, WrappedError};
pub use models::{EnrichedEvent, WatchEvent, YearSelector, YearlySummary};
pub use service::{PipelineService, StepOutcome, SummaryStore};
pub use state::{PipelinePaths, PipelineState, ProcessingStatus, RunPhase};
