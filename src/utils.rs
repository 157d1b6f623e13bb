//! Parsing helpers shared by the enrichment and aggregation stages.
//!
//! Everything here is pure: link and duration parsing, watch-time parsing into
//! a caller-chosen timezone, and weekday naming.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use regex::Regex;

/// Error text recorded for rows whose link carries no catalog identifier
pub const VIDEO_ID_NOT_FOUND: &str = "Video ID not found";

/// Thumbnail used when no identifier can be extracted from a link
pub const PLACEHOLDER_THUMBNAIL: &str = "/api/placeholder/80/60";

#[allow(clippy::expect_used)]
fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"v=([^&]+)").expect("literal pattern"))
}

#[allow(clippy::expect_used)]
fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:[.,]\d+)?)S)?)?$")
            .expect("literal pattern")
    })
}

/// Extract the catalog identifier from the `v=` parameter of a video link.
#[must_use]
pub fn extract_video_id(video_link: &str) -> Option<&str> {
    video_id_pattern()
        .captures(video_link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Thumbnail URL for a video link, or the placeholder when it has no identifier.
#[must_use]
pub fn thumbnail_url(video_link: &str) -> String {
    extract_video_id(video_link).map_or_else(
        || PLACEHOLDER_THUMBNAIL.to_string(),
        |id| format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"),
    )
}

/// Parse an ISO-8601 duration (`PT1H2M3S`, `P1DT30M`, `P0D`) into whole seconds.
///
/// Calendar components (years, months) have no fixed length and are rejected.
/// Fractional seconds are truncated.
#[must_use]
pub fn parse_iso8601_duration(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    // A bare "P" or a dangling "T" carries no components.
    if raw.len() < 3 || raw.ends_with('T') {
        return None;
    }
    let caps = duration_pattern().captures(raw)?;

    let component = |index: usize| -> Option<i64> {
        caps.get(index).map_or(Some(0), |m| m.as_str().parse::<i64>().ok())
    };
    let weeks = component(1)?;
    let days = component(2)?;
    let hours = component(3)?;
    let minutes = component(4)?;
    let seconds = match caps.get(5) {
        Some(m) => {
            let whole = m.as_str().split(['.', ',']).next().unwrap_or("0");
            whole.parse::<i64>().ok()?
        },
        None => 0,
    };

    weeks
        .checked_mul(7 * 86_400)?
        .checked_add(days.checked_mul(86_400)?)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%b %d, %Y, %I:%M:%S %p",
    "%b %d, %Y, %H:%M:%S",
    "%d %b %Y, %H:%M:%S",
];

/// Parse a free-form watch timestamp into `tz`.
///
/// Timestamps carrying an offset are converted into `tz`; naive timestamps
/// are interpreted as wall-clock time in `tz`. A trailing zone abbreviation
/// (as written by the export) is honoured for UTC/GMT and otherwise treated
/// as local time. Returns `None` for anything unparseable, and for naive
/// times that do not exist in `tz` (DST gaps).
pub fn parse_watch_time<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let cleaned = raw.replace(['\u{202f}', '\u{a0}'], " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(aware) = parse_with_offset(cleaned) {
        return Some(aware.with_timezone(tz));
    }

    let (body, zone) = split_zone_abbreviation(cleaned);
    let naive = parse_naive(body)?;
    match zone {
        Some(abbr) if is_utc_abbreviation(abbr) => Some(Utc.from_utc_datetime(&naive).with_timezone(tz)),
        _ => tz.from_local_datetime(&naive).earliest(),
    }
}

fn parse_with_offset(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        OFFSET_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(raw, format).ok())
    })
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn split_zone_abbreviation(raw: &str) -> (&str, Option<&str>) {
    match raw.rsplit_once(' ') {
        Some((body, last))
            if (2..=5).contains(&last.len()) && last.chars().all(|c| c.is_ascii_uppercase()) && last != "AM" && last != "PM" =>
        {
            (body.trim_end(), Some(last))
        },
        _ => (raw, None),
    }
}

fn is_utc_abbreviation(abbr: &str) -> bool {
    matches!(abbr, "UTC" | "GMT" | "Z")
}

/// Full English name of a weekday (`Monday`, `Tuesday`, ...).
#[must_use]
pub const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_extract_video_id() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), Some("dQw4w9WgXcQ"));
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=abc&t=10s"), Some("abc"));
        assert_eq!(extract_video_id("https://www.youtube.com/post/xyz"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v="), None);
    }

    #[test]
    fn test_thumbnail_url_fallback() {
        assert_eq!(
            thumbnail_url("https://www.youtube.com/watch?v=abc"),
            "https://i.ytimg.com/vi/abc/mqdefault.jpg"
        );
        assert_eq!(thumbnail_url("https://music.example.com/track/1"), PLACEHOLDER_THUMBNAIL);
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse_iso8601_duration("PT3M"), Some(180));
        assert_eq!(parse_iso8601_duration("PT30M"), Some(1800));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("PT4.9S"), Some(4));
        assert_eq!(parse_iso8601_duration("P1W"), Some(604_800));
    }

    #[test]
    fn test_parse_durations_rejects_garbage() {
        assert_eq!(parse_iso8601_duration(""), None);
        assert_eq!(parse_iso8601_duration("P"), None);
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("P1M"), None);
        assert_eq!(parse_iso8601_duration("3 minutes"), None);
    }

    #[test]
    fn test_parse_watch_time_aware_is_converted() {
        let parsed = parse_watch_time("2023-01-01T10:00:00Z", &Utc).unwrap();
        assert_eq!((parsed.year(), parsed.hour()), (2023, 10));

        let parsed = parse_watch_time("2023-06-01T10:00:00-05:00", &Utc).unwrap();
        assert_eq!(parsed.hour(), 15);

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let parsed = parse_watch_time("2022-12-31T23:30:00+00:00", &plus_two).unwrap();
        assert_eq!((parsed.year(), parsed.hour()), (2023, 1));
    }

    #[test]
    fn test_parse_watch_time_naive_is_localized() {
        let minus_three = FixedOffset::west_opt(3 * 3600).unwrap();
        let parsed = parse_watch_time("2023-01-01 10:00:00", &minus_three).unwrap();
        assert_eq!(parsed.hour(), 10);
        assert_eq!(parsed.offset().local_minus_utc(), -3 * 3600);
        assert!(parse_watch_time("2023-03-04T05:06:07.123456", &Utc).is_some());
        assert!(parse_watch_time("2023-03-04", &Utc).is_some());
    }

    #[test]
    fn test_parse_watch_time_takeout_style() {
        let parsed = parse_watch_time("Jan 5, 2023, 10:15:00\u{202f}PM GMT", &Utc).unwrap();
        assert_eq!((parsed.day(), parsed.hour(), parsed.minute()), (5, 22, 15));
        let parsed = parse_watch_time("5 Jan 2023, 22:15:00 UTC", &Utc).unwrap();
        assert_eq!(parsed.hour(), 22);
    }

    #[test]
    fn test_parse_watch_time_garbage() {
        assert!(parse_watch_time("", &Utc).is_none());
        assert!(parse_watch_time("yesterday-ish", &Utc).is_none());
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name(Weekday::Sun), "Sunday");
        assert_eq!(weekday_name(Weekday::Wed), "Wednesday");
    }
}
