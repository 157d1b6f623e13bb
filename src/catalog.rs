//! Catalog API access.
//!
//! [`CatalogApi`] is the network seam: one call per batch-by-id lookup and
//! one per category listing. [`YouTubeApi`] is the blocking HTTP
//! implementation. [`CatalogClient`] layers the metadata cache, the 50-id
//! request limit and per-chunk failure capture on top of any `CatalogApi`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::MetadataCache;
use crate::config::CatalogConfig;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::models::{CatalogEntry, VideoMetadata};

/// Most identifiers the catalog accepts in one batch-by-id request
pub const MAX_IDS_PER_REQUEST: usize = 50;

/// Response body of the batch-by-id video lookup
///
/// A body without `items` counts as an empty result. Items are kept as raw
/// JSON so one odd item cannot fail the whole chunk.
#[derive(Debug, Default, Deserialize)]
pub struct VideoListResponse {
    /// Returned video resources
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Response body of the category listing
#[derive(Debug, Default, Deserialize)]
pub struct CategoryListResponse {
    /// Returned categories
    #[serde(default)]
    pub items: Vec<CategoryItem>,
}

/// One category of the listing
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryItem {
    /// Category identifier
    pub id: String,
    /// Display information
    #[serde(default)]
    pub snippet: Option<CategorySnippet>,
}

/// Display information of a category
#[derive(Debug, Clone, Deserialize)]
pub struct CategorySnippet {
    /// Display name
    #[serde(default)]
    pub title: Option<String>,
}

/// Network access to the catalog
#[cfg_attr(test, mockall::automock)]
pub trait CatalogApi {
    /// Look up at most [`MAX_IDS_PER_REQUEST`] videos in a single request.
    fn list_videos(&self, ids: &[String]) -> Result<VideoListResponse>;

    /// List the video categories of a region.
    fn list_categories(&self, region_code: &str) -> Result<CategoryListResponse>;
}

/// Blocking HTTP client for the YouTube Data API, rate limited to one request
/// per configured interval.
pub struct YouTubeApi {
    client: Client,
    base_url: String,
    api_key: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl YouTubeApi {
    /// Build a client for `api_key` using the catalog settings.
    pub fn new(config: &CatalogConfig, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            min_interval: Duration::from_millis(config.request_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    fn rate_limit(&self) {
        let mut last = self.last_request.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn get_json<T>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.rate_limit();

        let url = format!("{}/{endpoint}", self.base_url);
        // The request URL carries the API key; keep it out of error text.
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(reqwest::Error::without_url)?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?;

        Ok(response.json().map_err(reqwest::Error::without_url)?)
    }
}

impl CatalogApi for YouTubeApi {
    fn list_videos(&self, ids: &[String]) -> Result<VideoListResponse> {
        let joined = ids.join(",");
        self.get_json("videos", &[("part", "snippet,contentDetails"), ("id", joined.as_str())])
    }

    fn list_categories(&self, region_code: &str) -> Result<CategoryListResponse> {
        self.get_json("videoCategories", &[("part", "snippet"), ("regionCode", region_code)])
    }
}

/// Text recorded for an identifier the catalog did not return
#[must_use]
pub fn not_found_message(id: &str) -> String {
    format!("Warning: Video ID {id} not found or inaccessible.")
}

/// Cache-backed, chunked metadata fetcher
pub struct CatalogClient<'a, A: CatalogApi + ?Sized> {
    api: &'a A,
    chunk_size: usize,
}

impl<'a, A: CatalogApi + ?Sized> CatalogClient<'a, A> {
    /// Client issuing requests of at most [`MAX_IDS_PER_REQUEST`] ids.
    pub const fn new(api: &'a A) -> Self {
        Self {
            api,
            chunk_size: MAX_IDS_PER_REQUEST,
        }
    }

    /// Use smaller requests; values outside `1..=50` are clamped.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_IDS_PER_REQUEST);
        self
    }

    /// Resolve `ids` to metadata or failure text, in the order given.
    ///
    /// Cached entries (including cached failures) are returned without a
    /// request. The rest are requested in chunks; a chunk-level transport
    /// failure marks every id of that chunk with the error text and is not
    /// cached, while ids missing from a successful response are cached as
    /// terminal "not found" failures. Never returns an error.
    pub fn fetch(&self, ids: &[String], cache: &mut MetadataCache, metrics: &mut PipelineMetrics) -> Vec<CatalogEntry> {
        let mut resolved: HashMap<&str, CatalogEntry> = HashMap::with_capacity(ids.len());
        let mut absent: Vec<String> = Vec::new();
        let mut queued: HashSet<&str> = HashSet::new();

        for id in ids {
            if let Some(entry) = cache.get(id) {
                metrics.record_cache_hit();
                resolved.insert(id.as_str(), entry.clone());
            } else if queued.insert(id.as_str()) {
                metrics.record_cache_miss();
                absent.push(id.clone());
            }
        }

        let mut fetched: HashMap<String, CatalogEntry> = HashMap::with_capacity(absent.len());
        for chunk in absent.chunks(self.chunk_size) {
            self.fetch_chunk(chunk, cache, metrics, &mut fetched);
        }

        ids.iter()
            .map(|id| {
                resolved
                    .get(id.as_str())
                    .or_else(|| fetched.get(id))
                    .cloned()
                    .unwrap_or_else(|| CatalogEntry::Failure(not_found_message(id)))
            })
            .collect()
    }

    fn fetch_chunk(
        &self,
        chunk: &[String],
        cache: &mut MetadataCache,
        metrics: &mut PipelineMetrics,
        fetched: &mut HashMap<String, CatalogEntry>,
    ) {
        debug!(ids = chunk.len(), "Requesting catalog metadata");
        let response = match self.api.list_videos(chunk) {
            Ok(response) => {
                metrics.record_catalog_request(true);
                response
            },
            Err(e) => {
                metrics.record_catalog_request(false);
                warn!(ids = chunk.len(), error = %e, "Catalog request failed; marking chunk as failed");
                let message = e.to_string();
                for id in chunk {
                    fetched.insert(id.clone(), CatalogEntry::Failure(message.clone()));
                }
                return;
            },
        };

        let mut returned: HashMap<String, VideoMetadata> = HashMap::new();
        for item in response.items {
            match serde_json::from_value::<VideoMetadata>(item) {
                Ok(metadata) => {
                    returned.insert(metadata.id.clone(), metadata);
                },
                Err(e) => warn!(error = %e, "Skipping malformed catalog item"),
            }
        }

        let mut new_entries = Vec::with_capacity(chunk.len());
        for id in chunk {
            let entry = returned.remove(id).map_or_else(
                || CatalogEntry::Failure(not_found_message(id)),
                |metadata| CatalogEntry::Metadata(Box::new(metadata)),
            );
            new_entries.push((id.clone(), entry.clone()));
            fetched.insert(id.clone(), entry);
        }
        cache.put_many(new_entries);
    }
}
