//! Operating-parameter keys and parsing.
//!
//! Settings are stored as strings in the `settings` table; this module
//! owns the key names, defaults, and the clamped parsing the engine uses.

/// Setting keys, mirrored by the seed migration.
pub mod keys {
    pub const DEFAULT_SYNC_INTERVAL_MIN: &str = "default_sync_interval_min";
    pub const MIN_PIN_LENGTH: &str = "min_pin_length";
    pub const MAX_PIN_LENGTH: &str = "max_pin_length";
    pub const CHECKIN_TIME: &str = "checkin_time";
    pub const CHECKOUT_TIME: &str = "checkout_time";
    pub const BATTERY_EFFICIENT_MODE: &str = "battery_efficient_mode";
    pub const BATCH_WINDOW_SECONDS: &str = "batch_window_seconds";
    pub const ZWAVE_JS_UI_WS_URL: &str = "zwave_js_ui_ws_url";
}

/// Default values, as seeded.
pub mod defaults {
    pub const DEFAULT_SYNC_INTERVAL_MIN: i64 = 15;
    pub const MIN_PIN_LENGTH: usize = 4;
    pub const MAX_PIN_LENGTH: usize = 8;
    pub const CHECKIN_TIME: &str = "15:00";
    pub const CHECKOUT_TIME: &str = "11:00";
    pub const BATCH_WINDOW_SECONDS: u64 = 30;
}

/// Parse the PIN length settings, clamping to `4..=8` with `min <= max`.
///
/// Malformed or out-of-range values fall back to the defaults rather than
/// failing: a bad setting must not stop PIN derivation.
pub fn parse_pin_lengths(min_str: &str, max_str: &str) -> (usize, usize) {
    let mut min = defaults::MIN_PIN_LENGTH;
    let mut max = defaults::MAX_PIN_LENGTH;

    if let Ok(v) = min_str.trim().parse::<usize>() {
        if (4..=8).contains(&v) {
            min = v;
        }
    }
    if let Ok(v) = max_str.trim().parse::<usize>() {
        if v >= min && v <= 8 {
            max = v;
        }
    }
    if max < min {
        max = min;
    }

    (min, max)
}

/// Parse a boolean setting; anything but "true"/"1" is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

/// Parse a positive integer setting, falling back on malformed input.
pub fn parse_positive(value: &str, fallback: u64) -> u64 {
    match value.trim().parse::<u64>() {
        Ok(v) if v > 0 => v,
        _ => fallback,
    }
}
