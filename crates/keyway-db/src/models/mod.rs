//! Entity structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches

pub mod calendar;
pub mod guest_pin;
pub mod lock;
pub mod setting;
pub mod static_pin;

/// Sync status values shared by guest and static lock assignments.
pub mod sync_status {
    pub const PENDING: &str = "pending";
    pub const SYNCED: &str = "synced";
    pub const FAILED: &str = "failed";
    pub const REMOVED: &str = "removed";
}

/// Calendar subscription sync states.
pub mod calendar_sync_status {
    pub const PENDING: &str = "pending";
    pub const SYNCING: &str = "syncing";
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
}
