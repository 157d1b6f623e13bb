//! On-disk metadata cache shared across runs.
//!
//! Entries are never evicted. A cached "not found" answer is as final as a
//! cached success.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::dataset::write_json_atomic;
use crate::error::Result;
use crate::models::CatalogEntry;

/// Persistent id -> metadata (or terminal error) store.
///
/// Loaded fully into memory at the start of a run and rewritten fully by
/// [`MetadataCache::flush`], which is a no-op unless entries were added since
/// the last load or flush.
#[derive(Debug)]
pub struct MetadataCache {
    path: PathBuf,
    entries: HashMap<String, CatalogEntry>,
    persisted_len: usize,
}

impl MetadataCache {
    /// Load the cache document, or start empty if it does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries: HashMap<String, CatalogEntry> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "Loaded metadata cache");
        let persisted_len = entries.len();
        Ok(Self { path, entries, persisted_len })
    }

    /// An empty cache that has never been written, backed by `path`.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
            persisted_len: 0,
        }
    }

    /// Cached entry for an identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Insert or replace entries.
    pub fn put_many<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, CatalogEntry)>,
    {
        self.entries.extend(entries);
    }

    /// Number of cached identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the cache grew since it was loaded or last flushed.
    #[must_use]
    pub fn has_grown(&self) -> bool {
        self.entries.len() > self.persisted_len
    }

    /// Rewrite the backing file if the cache grew. Returns whether it wrote.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.has_grown() {
            return Ok(false);
        }
        write_json_atomic(&self.path, &self.entries)?;
        info!(
            path = %self.path.display(),
            entries = self.entries.len(),
            added = self.entries.len() - self.persisted_len,
            "Metadata cache saved"
        );
        self.persisted_len = self.entries.len();
        Ok(true)
    }
}
