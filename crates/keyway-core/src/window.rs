//! Validity-window arithmetic for guest PINs.
//!
//! A reservation's dates come from the calendar event; the time-of-day
//! components are replaced with the configured check-in and check-out
//! times while the date is preserved.

use chrono::NaiveTime;

use crate::schedule::is_valid_hhmm;
use crate::types::Timestamp;

/// Fallback check-in time when the setting is malformed.
pub const DEFAULT_CHECKIN: (u32, u32) = (15, 0);

/// Fallback check-out time when the setting is malformed.
pub const DEFAULT_CHECKOUT: (u32, u32) = (11, 0);

/// Parse "HH:MM", falling back to `default` on malformed input.
pub fn parse_hhmm_or(s: &str, default: (u32, u32)) -> (u32, u32) {
    if !is_valid_hhmm(s) {
        return default;
    }
    let hour = s[..2].parse().unwrap_or(default.0);
    let minute = s[3..].parse().unwrap_or(default.1);
    (hour, minute)
}

/// Replace the time-of-day of `date` with `(hour, minute)`.
pub fn apply_time_of_day(date: Timestamp, hour: u32, minute: u32) -> Timestamp {
    date.with_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_else(|| {
        NaiveTime::from_hms_opt(DEFAULT_CHECKIN.0, DEFAULT_CHECKIN.1, 0).unwrap()
    }))
    .single()
    .unwrap_or(date)
}

/// Compute `valid_from` from an event start date and the check-in setting.
pub fn apply_checkin_time(dt_start: Timestamp, checkin: &str) -> Timestamp {
    let (h, m) = parse_hhmm_or(checkin, DEFAULT_CHECKIN);
    apply_time_of_day(dt_start, h, m)
}

/// Compute `valid_until` from an event end date and the check-out setting.
pub fn apply_checkout_time(dt_end: Timestamp, checkout: &str) -> Timestamp {
    let (h, m) = parse_hhmm_or(checkout, DEFAULT_CHECKOUT);
    apply_time_of_day(dt_end, h, m)
}

/// Whether `now` falls inside `[valid_from, valid_until)`.
pub fn window_contains(valid_from: Timestamp, valid_until: Timestamp, now: Timestamp) -> bool {
    now >= valid_from && now < valid_until
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn checkin_replaces_time_and_keeps_date() {
        let start = Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).unwrap();
        let from = apply_checkin_time(start, "15:00");
        assert_eq!(from, Utc.with_ymd_and_hms(2030, 1, 10, 15, 0, 0).unwrap());
    }

    #[test]
    fn checkout_replaces_time_and_keeps_date() {
        let end = Utc.with_ymd_and_hms(2030, 1, 12, 9, 30, 0).unwrap();
        let until = apply_checkout_time(end, "11:00");
        assert_eq!(until, Utc.with_ymd_and_hms(2030, 1, 12, 11, 0, 0).unwrap());
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let start = Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(
            apply_checkin_time(start, "3pm"),
            Utc.with_ymd_and_hms(2030, 1, 10, 15, 0, 0).unwrap()
        );
        assert_eq!(
            apply_checkout_time(start, ""),
            Utc.with_ymd_and_hms(2030, 1, 10, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn window_containment_is_half_open() {
        let from = Utc.with_ymd_and_hms(2030, 1, 10, 15, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2030, 1, 12, 11, 0, 0).unwrap();
        assert!(!window_contains(from, until, from - chrono::Duration::minutes(1)));
        assert!(window_contains(from, until, from));
        assert!(window_contains(from, until, until - chrono::Duration::minutes(1)));
        assert!(!window_contains(from, until, until));
    }
}
