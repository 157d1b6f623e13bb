//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;

use serde_json::{json, Value};
use watch_wrapped::catalog::{CatalogApi, CategoryItem, CategoryListResponse, CategorySnippet, VideoListResponse};
use watch_wrapped::models::WatchEvent;
use watch_wrapped::state::{PipelinePaths, PipelineState};
use watch_wrapped::{Result, WrappedError};

/// In-memory catalog that records every request it receives
#[derive(Default)]
pub struct FakeCatalog {
    videos: HashMap<String, Value>,
    categories: Vec<(String, String)>,
    fail_with: RefCell<Option<String>>,
    pub video_calls: RefCell<Vec<Vec<String>>>,
    pub category_calls: Cell<usize>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            categories: vec![
                ("10".to_string(), "Music".to_string()),
                ("20".to_string(), "Gaming".to_string()),
            ],
            ..Self::default()
        }
    }

    /// Register a video with a duration, category and channel
    pub fn with_video(mut self, id: &str, duration: &str, category_id: &str) -> Self {
        self.videos.insert(
            id.to_string(),
            json!({
                "id": id,
                "snippet": {
                    "title": format!("Title {id}"),
                    "categoryId": category_id,
                    "channelTitle": format!("Channel {id}"),
                    "channelId": format!("UC{id}")
                },
                "contentDetails": {"duration": duration}
            }),
        );
        self
    }

    /// Make every video request fail with `message`
    pub fn fail_requests(&self, message: &str) {
        *self.fail_with.borrow_mut() = Some(message.to_string());
    }

    /// Ids requested across all calls, flattened
    pub fn requested_ids(&self) -> Vec<String> {
        self.video_calls.borrow().iter().flatten().cloned().collect()
    }
}

impl CatalogApi for FakeCatalog {
    fn list_videos(&self, ids: &[String]) -> Result<VideoListResponse> {
        self.video_calls.borrow_mut().push(ids.to_vec());
        if let Some(message) = self.fail_with.borrow().clone() {
            return Err(WrappedError::Other(message));
        }
        // Answer in reverse order to make sure callers re-order.
        let items = ids.iter().rev().filter_map(|id| self.videos.get(id).cloned()).collect();
        Ok(VideoListResponse { items })
    }

    fn list_categories(&self, _region_code: &str) -> Result<CategoryListResponse> {
        self.category_calls.set(self.category_calls.get() + 1);
        Ok(CategoryListResponse {
            items: self
                .categories
                .iter()
                .map(|(id, title)| CategoryItem {
                    id: id.clone(),
                    snippet: Some(CategorySnippet {
                        title: Some(title.clone()),
                    }),
                })
                .collect(),
        })
    }
}

/// Raw row for video `id` watched at `at`
pub fn watch(id: &str, at: &str) -> WatchEvent {
    WatchEvent {
        video_name: Some(format!("raw {id}")),
        video_link: format!("https://www.youtube.com/watch?v={id}"),
        channel_name: Some("raw channel".to_string()),
        channel_link: Some("https://www.youtube.com/channel/raw".to_string()),
        watch_time: at.to_string(),
    }
}

/// State file under `root` with a run already started
pub fn running_state(root: &Path) -> PipelineState {
    let paths = PipelinePaths::new(root);
    let mut state = PipelineState::load(paths.state_file()).unwrap();
    state.begin().unwrap();
    state
}
