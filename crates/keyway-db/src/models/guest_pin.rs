//! Guest PIN entity models.

use keyway_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `guest_pins` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GuestPin {
    pub id: DbId,
    pub calendar_id: DbId,
    pub event_uid: String,
    pub event_summary: Option<String>,
    pub pin_code: String,
    pub generation_method: String,
    pub custom_pin: Option<String>,
    pub valid_from: Timestamp,
    pub valid_until: Timestamp,
    pub status: String,
    pub regeneration_eligible: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GuestPin {
    /// Whether `now` falls inside the validity window (half-open).
    pub fn is_inside_window(&self, now: Timestamp) -> bool {
        keyway_core::window::window_contains(self.valid_from, self.valid_until, now)
    }

    /// Regeneration is only allowed well before check-in.
    pub fn can_regenerate(&self, now: Timestamp) -> bool {
        self.regeneration_eligible && self.valid_from - now >= chrono::Duration::hours(24)
    }
}

/// Insert payload for a guest PIN, produced by the calendar sync pipeline.
#[derive(Debug, Clone)]
pub struct NewGuestPin {
    pub calendar_id: DbId,
    pub event_uid: String,
    pub event_summary: Option<String>,
    pub pin_code: String,
    pub generation_method: String,
    pub custom_pin: Option<String>,
    pub valid_from: Timestamp,
    pub valid_until: Timestamp,
    pub status: String,
    pub regeneration_eligible: bool,
}

/// A row from the `guest_pin_locks` assignment table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GuestPinLock {
    pub guest_pin_id: DbId,
    pub lock_id: DbId,
    pub slot_number: i64,
    pub sync_status: String,
    pub last_synced_at: Option<Timestamp>,
    pub error_message: Option<String>,
}

/// A guest PIN together with its per-lock assignments.
#[derive(Debug, Clone, Serialize)]
pub struct GuestPinWithLocks {
    #[serde(flatten)]
    pub pin: GuestPin,
    pub locks: Vec<GuestPinLock>,
}

/// One pending assignment joined with its parent PIN, as consumed by the
/// 30-second drain sweep.
#[derive(Debug, Clone, FromRow)]
pub struct PendingGuestSync {
    pub guest_pin_id: DbId,
    pub lock_id: DbId,
    pub slot_number: i64,
    pub pin_code: String,
    pub status: String,
}
