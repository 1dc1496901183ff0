//! Calendar subscription entity models.

use keyway_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `calendar_subscriptions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CalendarSubscription {
    pub id: DbId,
    pub name: String,
    pub url: String,
    pub sync_interval_min: i64,
    pub last_sync_at: Option<Timestamp>,
    pub sync_status: String,
    pub sync_error: Option<String>,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a calendar subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCalendar {
    pub name: String,
    pub url: String,
    #[serde(default = "default_interval")]
    pub sync_interval_min: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Locks that receive PINs derived from this calendar's events.
    #[serde(default)]
    pub lock_ids: Vec<DbId>,
}

fn default_interval() -> i64 {
    keyway_core::settings::defaults::DEFAULT_SYNC_INTERVAL_MIN
}

fn default_enabled() -> bool {
    true
}

/// Patch payload for a calendar subscription.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCalendar {
    pub name: Option<String>,
    pub url: Option<String>,
    pub sync_interval_min: Option<i64>,
    pub enabled: Option<bool>,
}

/// Counts reported by one calendar sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub calendar_id: DbId,
    pub calendar_name: String,
    pub events_found: usize,
    pub pins_created: usize,
    pub pins_updated: usize,
    pub pins_removed: usize,
    /// Non-fatal per-event failures; the sync still completes.
    pub event_errors: Vec<String>,
    pub synced_at: Timestamp,
}
