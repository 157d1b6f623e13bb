//! Yearly "wrapped" statistics.
//!
//! [`Aggregator::summarize`] is a pure function of the enriched rows, the
//! requested year and the timezone used to place naive watch times on the
//! calendar. Rows with an error, or longer than [`MAX_DURATION_SECONDS`], are
//! dropped from the whole history before the year filter is applied.
//!
//! Ranking ties are resolved deterministically:
//! - categories and videos keep first-encountered order among equal counts;
//! - channels with equal watch time keep name order;
//! - the busiest weekday among equal counts is the alphabetically first name;
//! - the busiest date among equal totals is the earliest date.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};

use crate::models::{EnrichedEvent, YearSelector, YearlySummary};
use crate::utils::{parse_watch_time, thumbnail_url, weekday_name};

/// Longest duration still counted; longer rows are looping-playback artifacts
pub const MAX_DURATION_SECONDS: i64 = 4 * 3600;

/// Length of every top-N list
pub const TOP_N: usize = 5;

/// Summary engine bound to the timezone used for calendar placement
#[derive(Debug, Clone)]
pub struct Aggregator<Tz: TimeZone> {
    tz: Tz,
}

impl Aggregator<Local> {
    /// Aggregator placing watch times in the host's local timezone
    #[must_use]
    pub const fn local() -> Self {
        Self { tz: Local }
    }
}

impl<Tz: TimeZone> Aggregator<Tz> {
    /// Aggregator placing watch times in `tz`
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Compute the summary of `rows` for `year`. Never fails; empty input
    /// yields [`YearlySummary::empty`].
    #[must_use]
    pub fn summarize(&self, rows: &[EnrichedEvent], year: YearSelector) -> YearlySummary {
        let cleaned: Vec<Watched<'_, Tz>> = rows
            .iter()
            .filter(|row| is_countable(row))
            .map(|row| Watched {
                row,
                at: parse_watch_time(&row.watch_time, &self.tz),
            })
            .collect();

        let selected: Vec<&Watched<'_, Tz>> = cleaned
            .iter()
            .filter(|w| match year {
                YearSelector::All => true,
                YearSelector::Year(_) => w.at.as_ref().is_some_and(|at| year.matches(at.year())),
            })
            .collect();

        if selected.is_empty() {
            return YearlySummary::empty(year);
        }

        let mut summary = YearlySummary::empty(year);

        summary.top_categories = top_by_count(cleaned.iter().filter_map(|w| w.row.category_name.as_deref()));

        let (channels, channel_links) = top_channels(&selected);
        summary.top_channels = channels;
        summary.top_channels_links = channel_links;

        let (videos, thumbs, links) = top_videos(&selected);
        summary.top_videos = videos;
        summary.top_videos_thumbs = thumbs;
        summary.top_videos_links = links;

        summary.total_views = selected.len() as u64;

        let total_minutes = selected.iter().map(|w| w.seconds()).sum::<u64>() / 60;
        summary.total_hours = total_minutes / 60;
        summary.total_minutes = total_minutes % 60;

        summary.top_day = busiest_weekday(&selected).map(str::to_string);

        let seconds_per_date = seconds_per_date(&selected);
        summary.total_days = seconds_per_date.len() as u64;
        if summary.total_days > 0 {
            let average = total_minutes / summary.total_days;
            summary.average_hours = average / 60;
            summary.average_minutes = average % 60;
        }

        if let Some((date, seconds)) = busiest_date(&seconds_per_date) {
            summary.top_day_date_year = Some(date.year());
            summary.top_day_date_month = Some(date.month());
            summary.top_day_date_day = Some(date.day());
            summary.top_day_date_day_name = Some(weekday_name(date.weekday()).to_string());
            summary.top_day_minutes = seconds / 60;
        }

        summary
    }

    /// Distinct years with at least one parseable watch time, ascending.
    #[must_use]
    pub fn available_years(&self, rows: &[EnrichedEvent]) -> Vec<i32> {
        let years: HashSet<i32> = rows
            .iter()
            .filter_map(|row| parse_watch_time(&row.watch_time, &self.tz))
            .map(|at| at.year())
            .collect();
        let mut years: Vec<i32> = years.into_iter().collect();
        years.sort_unstable();
        years
    }
}

/// Summarize in the host's local timezone.
#[must_use]
pub fn summarize(rows: &[EnrichedEvent], year: YearSelector) -> YearlySummary {
    Aggregator::local().summarize(rows, year)
}

struct Watched<'a, Tz: TimeZone> {
    row: &'a EnrichedEvent,
    at: Option<DateTime<Tz>>,
}

impl<Tz: TimeZone> Watched<'_, Tz> {
    fn seconds(&self) -> u64 {
        self.row
            .duration_seconds
            .and_then(|d| u64::try_from(d).ok())
            .unwrap_or(0)
    }

    fn date(&self) -> Option<NaiveDate> {
        self.at.as_ref().map(DateTime::date_naive)
    }
}

fn is_countable(row: &EnrichedEvent) -> bool {
    row.error.is_none() && row.duration_seconds.is_some_and(|d| d <= MAX_DURATION_SECONDS)
}

/// Top N keys by occurrence, ties kept in first-encountered order.
fn top_by_count<'a, I>(values: I) -> Vec<String>
where
    I: Iterator<Item = &'a str>,
{
    first_seen_counts(values)
        .into_iter()
        .take(TOP_N)
        .map(|(value, _)| value.to_string())
        .collect()
}

fn first_seen_counts<K, I>(values: I) -> Vec<(K, u64)>
where
    K: Eq + Hash + Copy,
    I: Iterator<Item = K>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, u64)> = Vec::new();
    for value in values {
        match index.get(&value) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(value, counts.len());
                counts.push((value, 1));
            },
        }
    }
    // Stable: equal counts keep first-encountered order.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn top_channels<Tz: TimeZone>(selected: &[&Watched<'_, Tz>]) -> (Vec<String>, Vec<String>) {
    let mut seconds: BTreeMap<&str, u64> = BTreeMap::new();
    let mut first_link: HashMap<&str, &str> = HashMap::new();
    for w in selected {
        let Some(name) = w.row.channel_name.as_deref() else {
            continue;
        };
        *seconds.entry(name).or_insert(0) += w.seconds();
        first_link
            .entry(name)
            .or_insert_with(|| w.row.channel_link.as_deref().unwrap_or(""));
    }

    let mut ranked: Vec<(&str, u64)> = seconds.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(TOP_N)
        .map(|(name, _)| {
            let link = first_link.get(name).copied().unwrap_or("");
            (name.to_string(), link.to_string())
        })
        .unzip()
}

fn top_videos<Tz: TimeZone>(selected: &[&Watched<'_, Tz>]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut first_link: HashMap<&str, &str> = HashMap::new();
    for w in selected {
        if let Some(name) = w.row.video_name.as_deref() {
            first_link.entry(name).or_insert(w.row.video_link.as_str());
        }
    }

    let ranked = first_seen_counts(selected.iter().filter_map(|w| w.row.video_name.as_deref()));

    let mut names = Vec::with_capacity(TOP_N);
    let mut thumbs = Vec::with_capacity(TOP_N);
    let mut links = Vec::with_capacity(TOP_N);
    for (name, _) in ranked.into_iter().take(TOP_N) {
        let link = first_link.get(name).copied().unwrap_or("");
        names.push(name.to_string());
        thumbs.push(thumbnail_url(link));
        links.push(link.to_string());
    }
    (names, thumbs, links)
}

fn busiest_weekday<Tz: TimeZone>(selected: &[&Watched<'_, Tz>]) -> Option<&'static str> {
    let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
    for date in selected.iter().filter_map(|w| w.date()) {
        *counts.entry(weekday_name(date.weekday())).or_insert(0) += 1;
    }
    // BTreeMap iterates names alphabetically; keep the first of any tie.
    let mut best: Option<(&'static str, u64)> = None;
    for (name, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name)
}

fn seconds_per_date<Tz: TimeZone>(selected: &[&Watched<'_, Tz>]) -> BTreeMap<NaiveDate, u64> {
    let mut per_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for w in selected {
        if let Some(date) = w.date() {
            *per_date.entry(date).or_insert(0) += w.seconds();
        }
    }
    per_date
}

fn busiest_date(per_date: &BTreeMap<NaiveDate, u64>) -> Option<(NaiveDate, u64)> {
    let mut best: Option<(NaiveDate, u64)> = None;
    for (&date, &seconds) in per_date {
        if best.is_none_or(|(_, top)| seconds > top) {
            best = Some((date, seconds));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(name: &str, channel: &str, time: &str, seconds: i64) -> EnrichedEvent {
        EnrichedEvent {
            video_name: Some(name.to_string()),
            video_link: format!("https://www.youtube.com/watch?v={name}"),
            channel_name: Some(channel.to_string()),
            channel_link: Some(format!("https://www.youtube.com/channel/{channel}")),
            watch_time: time.to_string(),
            duration_seconds: Some(seconds),
            ..EnrichedEvent::default()
        }
    }

    #[test]
    fn test_first_seen_counts_is_stable() {
        let ranked = first_seen_counts(["b", "a", "a", "b", "c"].into_iter());
        assert_eq!(ranked, vec![("b", 2), ("a", 2), ("c", 1)]);
    }

    #[test]
    fn test_weekday_tie_prefers_alphabetical_name() {
        // 2023-01-02 is a Monday, 2023-01-06 a Friday.
        let rows = vec![
            row("a", "x", "2023-01-02T12:00:00Z", 60),
            row("b", "x", "2023-01-06T12:00:00Z", 60),
        ];
        let summary = Aggregator::new(Utc).summarize(&rows, YearSelector::Year(2023));
        assert_eq!(summary.top_day.as_deref(), Some("Friday"));
    }

    #[test]
    fn test_busiest_date_tie_prefers_earliest() {
        let rows = vec![
            row("a", "x", "2023-03-05T12:00:00Z", 600),
            row("b", "x", "2023-03-01T12:00:00Z", 600),
        ];
        let summary = Aggregator::new(Utc).summarize(&rows, YearSelector::All);
        assert_eq!(summary.top_day_date_day, Some(1));
        assert_eq!(summary.top_day_date_day_name.as_deref(), Some("Wednesday"));
        assert_eq!(summary.top_day_minutes, 10);
    }

    #[test]
    fn test_channel_ties_follow_name_order() {
        let rows = vec![
            row("a", "zeta", "2023-03-05T12:00:00Z", 60),
            row("b", "alpha", "2023-03-05T13:00:00Z", 60),
        ];
        let summary = Aggregator::new(Utc).summarize(&rows, YearSelector::All);
        assert_eq!(summary.top_channels, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_unparseable_times_count_only_for_all() {
        let rows = vec![row("a", "x", "not a time", 120), row("b", "x", "2023-03-05T12:00:00Z", 60)];
        let all = Aggregator::new(Utc).summarize(&rows, YearSelector::All);
        assert_eq!(all.total_views, 2);
        assert_eq!(all.total_days, 1);
        assert_eq!(all.total_minutes, 3);

        let year = Aggregator::new(Utc).summarize(&rows, YearSelector::Year(2023));
        assert_eq!(year.total_views, 1);
    }

    #[test]
    fn test_rows_without_duration_are_not_counted() {
        let mut unknown = row("v", "x", "2023-01-01T12:00:00Z", 0);
        unknown.duration_seconds = None;
        let summary = Aggregator::new(Utc).summarize(&[unknown], YearSelector::Year(2023));
        assert_eq!(summary.total_views, 0);
        assert_eq!(summary.total_days, 0);
        assert!(summary.top_videos.is_empty());
    }

    #[test]
    fn test_available_years_sorted() {
        let rows = vec![
            row("a", "x", "2024-03-05T12:00:00Z", 60),
            row("b", "x", "2022-03-05T12:00:00Z", 60),
            row("c", "x", "garbage", 60),
            row("d", "x", "2024-08-05T12:00:00Z", 60),
        ];
        assert_eq!(Aggregator::new(Utc).available_years(&rows), vec![2022, 2024]);
    }
}
