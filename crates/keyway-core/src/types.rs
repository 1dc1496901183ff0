use chrono::{DateTime, Utc};

/// All entity primary keys are opaque TEXT UUIDs.
pub type DbId = String;

/// All stored timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

/// A reservation event parsed from an iCal feed.
///
/// The engine depends only on this shape, not on iCal tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub uid: String,
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
    pub dt_start: Timestamp,
    pub dt_end: Timestamp,
}
