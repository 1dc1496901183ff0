//! Managed lock entity models.

use keyway_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Communication protocol of a lock.
pub mod protocol {
    pub const ZWAVE: &str = "zwave";
    pub const ZIGBEE: &str = "zigbee";
    pub const WIFI: &str = "wifi";
    pub const UNKNOWN: &str = "unknown";

    pub fn is_valid(s: &str) -> bool {
        matches!(s, ZWAVE | ZIGBEE | WIFI | UNKNOWN)
    }
}

/// Direct (non-intermediated) transport kinds.
pub mod direct_integration {
    pub const ZWAVE_JS_UI: &str = "zwave_js_ui";
    pub const ZIGBEE2MQTT: &str = "zigbee2mqtt";

    pub fn is_valid(s: &str) -> bool {
        matches!(s, ZWAVE_JS_UI | ZIGBEE2MQTT)
    }
}

/// A row from the `managed_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ManagedLock {
    pub id: DbId,
    pub entity_id: String,
    pub name: String,
    pub protocol: String,
    pub total_slots: i64,
    pub guest_slots: i64,
    pub static_slots: i64,
    pub online: bool,
    pub lock_state: String,
    pub battery_level: Option<i64>,
    pub last_seen_at: Option<Timestamp>,
    pub direct_integration: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a managed lock (typically from discovery).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLock {
    pub entity_id: String,
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub total_slots: i64,
    #[serde(default)]
    pub guest_slots: i64,
    #[serde(default)]
    pub static_slots: i64,
    pub direct_integration: Option<String>,
}

fn default_protocol() -> String {
    protocol::UNKNOWN.to_string()
}

/// Patch payload for a managed lock.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLock {
    pub name: Option<String>,
    pub total_slots: Option<i64>,
    pub guest_slots: Option<i64>,
    pub static_slots: Option<i64>,
    /// `Some(None)` clears the direct integration.
    #[serde(default, with = "double_option")]
    pub direct_integration: Option<Option<String>>,
}

/// Distinguishes an absent field from an explicit null in patch payloads.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

/// Observed runtime state pushed by the status refresh.
#[derive(Debug, Clone)]
pub struct LockStatusUpdate {
    pub online: bool,
    pub lock_state: String,
    pub battery_level: Option<i64>,
}
