//! Data models for watch events, catalog metadata and yearly summaries
//!
//! Row types map one-to-one onto the CSV tables on disk. Optional columns are
//! written as empty fields and read back as `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::WrappedError;

/// Natural key of a watch event: `(video_link, watch_time)`
pub type NaturalKey = (String, String);

/// One historical watch event as extracted from the export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Video title, empty in the export for some minimal records
    pub video_name: Option<String>,
    /// Link to the watched video
    pub video_link: String,
    /// Channel display name
    pub channel_name: Option<String>,
    /// Link to the channel
    pub channel_link: Option<String>,
    /// Free-form watch timestamp, kept verbatim
    pub watch_time: String,
}

impl WatchEvent {
    /// Key used to detect rows that were already enriched
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        (self.video_link.clone(), self.watch_time.clone())
    }
}

/// A watch event augmented with catalog metadata or a terminal error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    /// Video title, overwritten from the catalog when available
    pub video_name: Option<String>,
    /// Link to the watched video
    pub video_link: String,
    /// Channel display name, overwritten from the catalog when available
    pub channel_name: Option<String>,
    /// Channel link, rebuilt from the catalog channel id when available
    pub channel_link: Option<String>,
    /// Free-form watch timestamp, kept verbatim
    pub watch_time: String,
    /// Video length in whole seconds
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration_seconds: Option<i64>,
    /// Catalog category identifier
    #[serde(default, deserialize_with = "lenient_category_id")]
    pub category_id: Option<String>,
    /// Human-readable category name
    pub category_name: Option<String>,
    /// Error recorded for this row, if the lookup failed
    pub error: Option<String>,
}

impl EnrichedEvent {
    /// Start an enriched row from its raw counterpart, metadata still empty
    #[must_use]
    pub fn from_raw(raw: &WatchEvent) -> Self {
        Self {
            video_name: raw.video_name.clone(),
            video_link: raw.video_link.clone(),
            channel_name: raw.channel_name.clone(),
            channel_link: raw.channel_link.clone(),
            watch_time: raw.watch_time.clone(),
            ..Self::default()
        }
    }

    /// Key used to detect rows that were already enriched
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        (self.video_link.clone(), self.watch_time.clone())
    }
}

// Older enriched files were written through a dataframe and carry floats
// ("180.0") in the integer column.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(Some(value));
    }
    let parsed = raw.parse::<f64>().ok().filter(|v| v.is_finite());
    #[allow(clippy::cast_possible_truncation)]
    let truncated = parsed.map(|v| v.trunc() as i64);
    truncated.map_or_else(
        || Err(serde::de::Error::custom(format!("invalid duration_seconds: {raw}"))),
        |v| Ok(Some(v)),
    )
}

fn lenient_category_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).map(|s| {
        match s.strip_suffix(".0") {
            Some(int) if !int.is_empty() && int.chars().all(|c| c.is_ascii_digit()) => int.to_string(),
            _ => s,
        }
    }))
}

/// `snippet` block of a catalog video resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Video title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Category identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Channel display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_title: Option<String>,
    /// Channel identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Remaining snippet fields, preserved verbatim in the cache
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `contentDetails` block of a catalog video resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDetails {
    /// ISO-8601 duration such as `PT4M13S`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Remaining fields, preserved verbatim in the cache
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Catalog metadata for one video, as returned by the catalog API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Catalog item identifier
    pub id: String,
    /// Title, category and channel information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<Snippet>,
    /// Duration information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_details: Option<ContentDetails>,
    /// Remaining resource fields, preserved verbatim in the cache
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoMetadata {
    /// Raw ISO-8601 duration string, if the catalog supplied one
    #[must_use]
    pub fn duration_iso(&self) -> Option<&str> {
        self.content_details.as_ref()?.duration.as_deref()
    }

    /// Category identifier from the snippet
    #[must_use]
    pub fn category_id(&self) -> Option<&str> {
        self.snippet.as_ref()?.category_id.as_deref()
    }

    /// Video title from the snippet
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.snippet.as_ref()?.title.as_deref()
    }

    /// Channel name from the snippet
    #[must_use]
    pub fn channel_title(&self) -> Option<&str> {
        self.snippet.as_ref()?.channel_title.as_deref()
    }

    /// Channel identifier from the snippet
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.snippet.as_ref()?.channel_id.as_deref()
    }
}

/// Outcome of resolving one identifier, as stored in the metadata cache
///
/// A stored failure is terminal: it is returned from the cache as-is and the
/// identifier is never requested again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogEntry {
    /// Error or warning text
    Failure(String),
    /// Metadata fetched from the catalog
    Metadata(Box<VideoMetadata>),
}

impl CatalogEntry {
    /// Metadata if this entry resolved successfully
    #[must_use]
    pub fn metadata(&self) -> Option<&VideoMetadata> {
        match self {
            Self::Metadata(metadata) => Some(metadata),
            Self::Failure(_) => None,
        }
    }

    /// Failure text if this entry is an error
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failure(message) => Some(message),
            Self::Metadata(_) => None,
        }
    }
}

/// Which slice of history a summary covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YearSelector {
    /// A single calendar year
    Year(i32),
    /// The whole history
    All,
}

impl YearSelector {
    /// Whether a timestamp's year falls in this selection
    #[must_use]
    pub const fn matches(self, year: i32) -> bool {
        match self {
            Self::Year(wanted) => wanted == year,
            Self::All => true,
        }
    }
}

impl fmt::Display for YearSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for YearSelector {
    type Err = WrappedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<i32>()
            .map(Self::Year)
            .map_err(|_| WrappedError::InvalidInput(format!("year must be an integer or \"all\", got {s:?}")))
    }
}

impl Serialize for YearSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Year(year) => serializer.serialize_i32(*year),
            Self::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for YearSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Year(i32),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Year(year) => Ok(Self::Year(year)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Fixed-shape statistical report for one year or the whole history
///
/// Always recomputed from the full enriched dataset, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlySummary {
    /// Year this summary covers
    pub year: YearSelector,
    /// Five most frequent category names across the whole cleaned history
    pub top_categories: Vec<String>,
    /// Five channels with the most watch time
    pub top_channels: Vec<String>,
    /// First-seen link for each entry of `top_channels`
    pub top_channels_links: Vec<String>,
    /// Video links for each entry of `top_videos`
    pub top_videos_links: Vec<String>,
    /// Thumbnail URLs for each entry of `top_videos`
    pub top_videos_thumbs: Vec<String>,
    /// Five most viewed videos
    pub top_videos: Vec<String>,
    /// Number of watch events
    pub total_views: u64,
    /// Whole hours watched
    pub total_hours: u64,
    /// Minutes left over after `total_hours`
    pub total_minutes: u64,
    /// Weekday with the most views
    pub top_day: Option<String>,
    /// Distinct calendar dates with at least one view
    pub total_days: u64,
    /// Whole hours of the per-day average
    pub average_hours: u64,
    /// Minutes left over in the per-day average
    pub average_minutes: u64,
    /// Year of the busiest date
    pub top_day_date_year: Option<i32>,
    /// Month of the busiest date
    pub top_day_date_month: Option<u32>,
    /// Day of month of the busiest date
    pub top_day_date_day: Option<u32>,
    /// Weekday name of the busiest date
    pub top_day_date_day_name: Option<String>,
    /// Whole minutes watched on the busiest date
    pub top_day_minutes: u64,
}

impl YearlySummary {
    /// All-zero summary used when there is nothing to count
    #[must_use]
    pub const fn empty(year: YearSelector) -> Self {
        Self {
            year,
            top_categories: Vec::new(),
            top_channels: Vec::new(),
            top_channels_links: Vec::new(),
            top_videos_links: Vec::new(),
            top_videos_thumbs: Vec::new(),
            top_videos: Vec::new(),
            total_views: 0,
            total_hours: 0,
            total_minutes: 0,
            top_day: None,
            total_days: 0,
            average_hours: 0,
            average_minutes: 0,
            top_day_date_year: None,
            top_day_date_month: None,
            top_day_date_day: None,
            top_day_date_day_name: None,
            top_day_minutes: 0,
        }
    }

    /// Average watch time per active day, formatted `H:MM`
    #[must_use]
    pub fn average_per_day(&self) -> String {
        format!("{}:{:02}", self.average_hours, self.average_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_selector_round_trips_through_text() {
        assert_eq!("2023".parse::<YearSelector>().unwrap(), YearSelector::Year(2023));
        assert_eq!("ALL".parse::<YearSelector>().unwrap(), YearSelector::All);
        assert!("twenty".parse::<YearSelector>().is_err());
        assert_eq!(YearSelector::All.to_string(), "all");
    }

    #[test]
    fn test_year_selector_json_shape() {
        assert_eq!(serde_json::to_string(&YearSelector::Year(2024)).unwrap(), "2024");
        assert_eq!(serde_json::to_string(&YearSelector::All).unwrap(), "\"all\"");
        let parsed: YearSelector = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(parsed, YearSelector::All);
    }

    #[test]
    fn test_catalog_entry_distinguishes_failures() {
        let failure: CatalogEntry = serde_json::from_str("\"Video ID not found\"").unwrap();
        assert_eq!(failure.failure(), Some("Video ID not found"));

        let metadata: CatalogEntry = serde_json::from_str(
            r#"{"id":"abc","kind":"youtube#video","snippet":{"title":"T","categoryId":"10","thumbnails":{}},"contentDetails":{"duration":"PT3M"}}"#,
        )
        .unwrap();
        let metadata = metadata.metadata().unwrap();
        assert_eq!(metadata.category_id(), Some("10"));
        assert_eq!(metadata.duration_iso(), Some("PT3M"));
        assert!(metadata.extra.contains_key("kind"));
    }

    #[test]
    fn test_enriched_row_reads_dataframe_floats() {
        let data = "video_name,video_link,channel_name,channel_link,watch_time,duration_seconds,category_id,category_name,error\n\
                    A,https://www.youtube.com/watch?v=a,,,2023-01-01T10:00:00,180.0,10.0,Music,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let row: EnrichedEvent = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.duration_seconds, Some(180));
        assert_eq!(row.category_id.as_deref(), Some("10"));
        assert_eq!(row.channel_name, None);
        assert_eq!(row.error, None);
    }
}
