//! Static PIN schedule evaluation.
//!
//! Windows are day-of-week buckets (0 = Sunday) with zero-padded 24-hour
//! "HH:MM" bounds, so time comparison is plain string ordering. An
//! overnight window (start > end) wraps past midnight within the same
//! day-of-week bucket: Fri 22:00-06:00 covers Fri 22:00-24:00 and
//! Fri 00:00-06:00.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// One schedule window for a static PIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: i64,
    /// "HH:MM", inclusive.
    pub start_time: String,
    /// "HH:MM", inclusive.
    pub end_time: String,
}

/// Whether a single window covers the given local weekday and time.
pub fn window_matches(window: &DayWindow, weekday: i64, hhmm: &str) -> bool {
    if window.day_of_week != weekday {
        return false;
    }

    let start = window.start_time.as_str();
    let end = window.end_time.as_str();

    if start > end {
        // Overnight wrap within the same bucket.
        hhmm >= start || hhmm <= end
    } else {
        hhmm >= start && hhmm <= end
    }
}

/// Whether a static PIN should currently be resident on its locks.
pub fn should_be_resident(
    enabled: bool,
    always_active: bool,
    windows: &[DayWindow],
    weekday: i64,
    hhmm: &str,
) -> bool {
    if !enabled {
        return false;
    }
    if always_active {
        return true;
    }
    windows.iter().any(|w| window_matches(w, weekday, hhmm))
}

/// Local weekday (0 = Sunday) and zero-padded "HH:MM" for an instant.
pub fn day_and_time<Tz: TimeZone>(at: &DateTime<Tz>) -> (i64, String) {
    let weekday = i64::from(at.weekday().num_days_from_sunday());
    let hhmm = format!("{:02}:{:02}", at.hour(), at.minute());
    (weekday, hhmm)
}

/// Validate a zero-padded 24-hour "HH:MM" string.
pub fn is_valid_hhmm(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = |r: &[u8]| r.iter().all(|b| b.is_ascii_digit());
    if !digits(&bytes[..2]) || !digits(&bytes[3..]) {
        return false;
    }
    s[..2].parse::<u32>().map(|h| h < 24).unwrap_or(false)
        && s[3..].parse::<u32>().map(|m| m < 60).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono::TimeZone as _;

    fn window(day: i64, start: &str, end: &str) -> DayWindow {
        DayWindow {
            day_of_week: day,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn normal_window_bounds_are_inclusive() {
        let w = window(1, "09:00", "17:00");
        assert!(window_matches(&w, 1, "09:00"));
        assert!(window_matches(&w, 1, "12:30"));
        assert!(window_matches(&w, 1, "17:00"));
        assert!(!window_matches(&w, 1, "08:59"));
        assert!(!window_matches(&w, 1, "17:01"));
    }

    #[test]
    fn other_weekday_never_matches() {
        let w = window(1, "09:00", "17:00");
        assert!(!window_matches(&w, 2, "12:00"));
    }

    #[test]
    fn overnight_window_wraps_within_the_bucket() {
        // Friday (5) 22:00 -> 06:00.
        let w = window(5, "22:00", "06:00");
        assert!(window_matches(&w, 5, "23:59"));
        assert!(window_matches(&w, 5, "05:59"));
        assert!(window_matches(&w, 5, "06:00"));
        assert!(!window_matches(&w, 5, "06:01"));
        assert!(!window_matches(&w, 5, "21:59"));
        assert!(!window_matches(&w, 6, "23:30"));
    }

    #[test]
    fn always_active_overrides_windows() {
        assert!(should_be_resident(true, true, &[], 0, "00:00"));
    }

    #[test]
    fn disabled_pin_is_never_resident() {
        let w = vec![window(0, "00:00", "23:59")];
        assert!(!should_be_resident(false, true, &w, 0, "12:00"));
    }

    #[test]
    fn no_windows_and_not_always_active_means_absent() {
        assert!(!should_be_resident(true, false, &[], 3, "12:00"));
    }

    #[test]
    fn any_matching_window_is_enough() {
        let ws = vec![window(2, "08:00", "10:00"), window(2, "20:00", "22:00")];
        assert!(should_be_resident(true, false, &ws, 2, "21:00"));
        assert!(!should_be_resident(true, false, &ws, 2, "12:00"));
    }

    #[test]
    fn day_and_time_uses_sunday_zero() {
        // 2030-06-02 is a Sunday.
        let at = Utc.with_ymd_and_hms(2030, 6, 2, 7, 5, 0).unwrap();
        assert_eq!(day_and_time(&at), (0, "07:05".to_string()));
    }

    #[test]
    fn hhmm_validation() {
        assert!(is_valid_hhmm("00:00"));
        assert!(is_valid_hhmm("23:59"));
        assert!(!is_valid_hhmm("24:00"));
        assert!(!is_valid_hhmm("12:60"));
        assert!(!is_valid_hhmm("9:00"));
        assert!(!is_valid_hhmm("0900"));
        assert!(!is_valid_hhmm("12:3a"));
    }
}
