//! In-process event bus for engine lifecycle notifications.

pub mod bus;

pub use bus::{EngineEvent, EventBus};

/// Event type names published by the engine.
pub mod types {
    pub const PIN_STATUS_CHANGED: &str = "pin.status_changed";
    pub const PIN_SYNC_STATUS_CHANGED: &str = "pin.sync_status_changed";
    pub const PIN_CONFLICT_DETECTED: &str = "pin.conflict_detected";
    pub const CALENDAR_SYNC_COMPLETED: &str = "calendar.sync_completed";
    pub const CALENDAR_SYNC_ERROR: &str = "calendar.sync_error";
    pub const LOCK_STATUS_CHANGED: &str = "lock.status_changed";
}
