//! iCal feed fetching and parsing.
//!
//! The engine depends only on the [`FeedSource`] contract: a URL yields an
//! ordered list of events or an error. The HTTP implementation parses with
//! the `icalendar` crate's parser.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use icalendar::parser::{read_calendar, unfold, Component};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use keyway_core::types::CalendarEvent;

/// Per-fetch network timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from fetching or parsing a feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("fetching feed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(u16),

    #[error("parsing feed: {0}")]
    Parse(String),
}

/// Source of calendar events for the sync pipeline.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, FeedError>> + Send;
}

/// HTTP + iCal implementation of [`FeedSource`].
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client }
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<CalendarEvent>, FeedError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }
        let body = response.text().await?;
        parse_events(&body)
    }
}

/// Parse iCal text into events, ordered by start time.
///
/// Events without a UID or DTSTART are skipped; a missing DTEND falls back
/// to one day after the start, matching how booking feeds describe
/// single-night stays.
pub fn parse_events(content: &str) -> Result<Vec<CalendarEvent>, FeedError> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| FeedError::Parse(e.to_string()))?;

    let mut events: Vec<CalendarEvent> = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(parse_vevent)
        .collect();

    events.sort_by_key(|e| e.dt_start);
    Ok(events)
}

fn parse_vevent(vevent: &Component) -> Option<CalendarEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();

    let dt_start = to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let dt_end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_utc)
        .unwrap_or(dt_start + chrono::Duration::days(1));

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape(p.val.as_ref()))
        .unwrap_or_default();
    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| unescape(p.val.as_ref()))
        .unwrap_or_default();
    let location = vevent.find_prop("LOCATION").map(|p| unescape(p.val.as_ref()));

    Some(CalendarEvent {
        uid,
        summary,
        description,
        location,
        dt_start,
        dt_end,
    })
}

/// Collapse a parsed date-or-datetime onto UTC. DATE values are taken at
/// midnight; zoned values are taken at face value since booking feeds ship
/// check-in/check-out as dates and the time of day is replaced downstream
/// anyway.
fn to_utc(value: DatePerhapsTime) -> DateTime<Utc> {
    match value {
        DatePerhapsTime::Date(date) => date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc(),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => dt,
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => naive.and_utc(),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, .. }) => {
            date_time.and_utc()
        }
    }
}

/// Undo RFC 5545 text escaping.
fn unescape(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}
