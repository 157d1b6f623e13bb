//! Category id to display name lookup, fetched once per region.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::catalog::CatalogApi;
use crate::dataset::{read_json_if_exists, write_json_atomic};
use crate::error::Result;

/// Category id -> display name for one region.
///
/// Fetched once and then served from its file forever; a different region
/// needs a different file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    names: HashMap<String, String>,
}

impl CategoryMap {
    /// Load the persisted mapping, or fetch it from the catalog and persist it.
    ///
    /// An existing file is returned verbatim without consulting the catalog.
    /// Fetch and file errors propagate.
    pub fn load_or_fetch<A: CatalogApi + ?Sized>(api: &A, region_code: &str, path: &Path) -> Result<Self> {
        if let Some(names) = read_json_if_exists::<HashMap<String, String>>(path)? {
            return Ok(Self { names });
        }

        let response = api.list_categories(region_code)?;
        let names: HashMap<String, String> = response
            .items
            .into_iter()
            .filter_map(|item| {
                let title = item.snippet.and_then(|s| s.title)?;
                Some((item.id, title))
            })
            .collect();

        write_json_atomic(path, &names)?;
        info!(region = region_code, categories = names.len(), path = %path.display(), "Category map saved");
        Ok(Self { names })
    }

    /// Display name for a category id.
    #[must_use]
    pub fn name(&self, category_id: &str) -> Option<&str> {
        self.names.get(category_id).map(String::as_str)
    }

    /// Number of known categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no categories are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
