//! Static PIN entity models.

use keyway_core::schedule::DayWindow;
use keyway_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `static_pins` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StaticPin {
    pub id: DbId,
    pub name: String,
    pub pin_code: String,
    pub enabled: bool,
    pub always_active: bool,
    pub slot_number: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `static_pin_schedules` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StaticPinSchedule {
    #[serde(default)]
    pub id: DbId,
    #[serde(default)]
    pub static_pin_id: DbId,
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
}

impl StaticPinSchedule {
    pub fn window(&self) -> DayWindow {
        DayWindow {
            day_of_week: self.day_of_week,
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }
}

/// A row from the `static_pin_locks` assignment table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StaticPinLock {
    pub static_pin_id: DbId,
    pub lock_id: DbId,
    pub slot_number: i64,
    pub sync_status: String,
    pub last_synced_at: Option<Timestamp>,
}

/// A static PIN together with its schedule windows.
#[derive(Debug, Clone, Serialize)]
pub struct StaticPinWithSchedules {
    #[serde(flatten)]
    pub pin: StaticPin,
    pub schedules: Vec<StaticPinSchedule>,
}

impl StaticPinWithSchedules {
    pub fn windows(&self) -> Vec<DayWindow> {
        self.schedules.iter().map(|s| s.window()).collect()
    }
}

/// A static PIN with schedules and lock assignments, as the API lists them.
#[derive(Debug, Clone, Serialize)]
pub struct StaticPinDetail {
    #[serde(flatten)]
    pub pin: StaticPin,
    pub schedules: Vec<StaticPinSchedule>,
    pub locks: Vec<StaticPinLock>,
}

/// Insert payload for a static PIN.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStaticPin {
    pub name: String,
    pub pin_code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub always_active: bool,
    #[serde(default = "default_slot")]
    pub slot_number: i64,
    #[serde(default)]
    pub schedules: Vec<StaticPinSchedule>,
    #[serde(default)]
    pub lock_ids: Vec<DbId>,
}

fn default_enabled() -> bool {
    true
}

fn default_slot() -> i64 {
    1
}

/// Patch payload for a static PIN.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStaticPin {
    pub name: Option<String>,
    pub pin_code: Option<String>,
    pub enabled: Option<bool>,
    pub always_active: Option<bool>,
    pub slot_number: Option<i64>,
}

/// One pending static assignment joined with its parent PIN, as consumed
/// by the drain sweep.
#[derive(Debug, Clone, FromRow)]
pub struct PendingStaticSync {
    pub static_pin_id: DbId,
    pub lock_id: DbId,
    pub slot_number: i64,
    pub pin_code: String,
    pub enabled: bool,
}
