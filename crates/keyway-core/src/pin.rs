//! PIN derivation for calendar events.
//!
//! Codes are chosen by an ordered strategy chain, first success wins:
//! custom -> phone last-4 -> description hash -> date based. The final
//! strategy always succeeds, so derivation is total.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::types::CalendarEvent;

// ---------------------------------------------------------------------------
// Status and method enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a guest PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinStatus {
    Pending,
    Active,
    Expired,
    Conflict,
}

impl PinStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PinStatus::Pending => "pending",
            PinStatus::Active => "active",
            PinStatus::Expired => "expired",
            PinStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a guest PIN code was derived, in chain priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Custom,
    PhoneLast4,
    DescriptionRandom,
    DateBased,
}

impl GenerationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMethod::Custom => "custom",
            GenerationMethod::PhoneLast4 => "phone_last4",
            GenerationMethod::DescriptionRandom => "description_random",
            GenerationMethod::DateBased => "date_based",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "custom" => Some(GenerationMethod::Custom),
            "phone_last4" => Some(GenerationMethod::PhoneLast4),
            "description_random" => Some(GenerationMethod::DescriptionRandom),
            "date_based" => Some(GenerationMethod::DateBased),
            _ => None,
        }
    }
}

impl fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// A derived code together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub code: String,
    pub method: GenerationMethod,
}

static PHONE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\(last 4 digits\):\s*(\d{4})").unwrap(),
        Regex::new(r"(?i)last 4 digits:\s*(\d{4})").unwrap(),
    ]
});

/// Derives PIN codes from calendar events.
///
/// Length bounds are clamped to `4..=8` at construction so every strategy
/// yields a code the locks can store.
#[derive(Debug, Clone, Copy)]
pub struct PinGenerator {
    min_length: usize,
    max_length: usize,
}

impl PinGenerator {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        let min_length = min_length.max(4);
        let max_length = max_length.max(min_length).min(8);
        Self {
            min_length,
            max_length,
        }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Run the derivation chain for an event.
    ///
    /// An invalid custom code is skipped rather than rejected here; callers
    /// that need to surface the violation use [`PinGenerator::validate`]
    /// before handing the code over.
    pub fn derive(&self, event: &CalendarEvent, custom: Option<&str>) -> Derivation {
        if let Some(code) = custom {
            if self.is_valid(code) {
                return Derivation {
                    code: code.to_string(),
                    method: GenerationMethod::Custom,
                };
            }
        }

        if let Some(code) = extract_phone_last4(&event.description) {
            return Derivation {
                code,
                method: GenerationMethod::PhoneLast4,
            };
        }

        if !event.description.is_empty() {
            return Derivation {
                code: self.derive_from_description(&event.description, &event.uid),
                method: GenerationMethod::DescriptionRandom,
            };
        }

        Derivation {
            code: self.derive_from_dates(event),
            method: GenerationMethod::DateBased,
        }
    }

    /// Derive a fresh code using the next strategy after `current` that can
    /// produce one. Date-based is the floor: regenerating a date-based code
    /// re-runs the same strategy.
    pub fn regenerate(&self, event: &CalendarEvent, current: GenerationMethod) -> Derivation {
        if current == GenerationMethod::Custom {
            if let Some(code) = extract_phone_last4(&event.description) {
                return Derivation {
                    code,
                    method: GenerationMethod::PhoneLast4,
                };
            }
        }

        if matches!(
            current,
            GenerationMethod::Custom | GenerationMethod::PhoneLast4
        ) && !event.description.is_empty()
        {
            return Derivation {
                code: self.derive_from_description(&event.description, &event.uid),
                method: GenerationMethod::DescriptionRandom,
            };
        }

        Derivation {
            code: self.derive_from_dates(event),
            method: GenerationMethod::DateBased,
        }
    }

    /// Deterministic hash strategy: SHA-256 over `description|uid`, first
    /// four bytes big-endian, reduced modulo 10^min_length.
    fn derive_from_description(&self, description: &str, uid: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(description.as_bytes());
        hasher.update(b"|");
        hasher.update(uid.as_bytes());
        let hash = hasher.finalize();

        let num = u64::from(hash[0]) << 24
            | u64::from(hash[1]) << 16
            | u64::from(hash[2]) << 8
            | u64::from(hash[3]);

        format!("{:0width$}", num % pow10(self.min_length), width = self.min_length)
    }

    /// Date strategy: check-in day + check-out day, month-prefixed when the
    /// minimum length needs more than four digits.
    fn derive_from_dates(&self, event: &CalendarEvent) -> String {
        use chrono::Datelike;

        let in_day = event.dt_start.day();
        let out_day = event.dt_end.day();

        let mut code = if self.min_length > 4 {
            format!("{:02}{:02}{:02}", event.dt_start.month(), in_day, out_day)
        } else {
            format!("{in_day:02}{out_day:02}")
        };

        while code.len() < self.min_length {
            code.insert(0, '0');
        }
        code.truncate(self.max_length);
        code
    }

    fn is_valid(&self, code: &str) -> bool {
        code.len() >= self.min_length
            && code.len() <= self.max_length
            && code.bytes().all(|b| b.is_ascii_digit())
    }

    /// Validate a caller-supplied code against the configured bounds.
    pub fn validate(&self, code: &str) -> Result<(), CoreError> {
        if code.len() < self.min_length {
            return Err(CoreError::Validation(format!(
                "PIN must be at least {} digits",
                self.min_length
            )));
        }
        if code.len() > self.max_length {
            return Err(CoreError::Validation(format!(
                "PIN must be at most {} digits",
                self.max_length
            )));
        }
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::Validation(
                "PIN must contain only digits".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pull the last four phone digits out of an event description, matching
/// the booking-platform phrasing "(Last 4 Digits): XXXX" in either form.
pub fn extract_phone_last4(description: &str) -> Option<String> {
    for pattern in PHONE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(description) {
            return Some(caps[1].to_string());
        }
    }
    None
}

pub(crate) fn pow10(n: usize) -> u64 {
    10u64.pow(n as u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(description: &str) -> CalendarEvent {
        CalendarEvent {
            uid: "evt-1@example.com".to_string(),
            summary: "Reserved".to_string(),
            description: description.to_string(),
            location: None,
            dt_start: Utc.with_ymd_and_hms(2030, 1, 15, 0, 0, 0).unwrap(),
            dt_end: Utc.with_ymd_and_hms(2030, 1, 18, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn custom_code_wins_when_valid() {
        let g = PinGenerator::new(4, 8);
        let d = g.derive(&event("some text"), Some("2468"));
        assert_eq!(d.code, "2468");
        assert_eq!(d.method, GenerationMethod::Custom);
    }

    #[test]
    fn invalid_custom_code_falls_through() {
        let g = PinGenerator::new(4, 8);
        let d = g.derive(&event(""), Some("12ab"));
        assert_eq!(d.method, GenerationMethod::DateBased);
    }

    #[test]
    fn phone_last4_extracted_from_description() {
        let g = PinGenerator::new(4, 8);
        let d = g.derive(&event("(Last 4 Digits): 0421"), None);
        assert_eq!(d.code, "0421");
        assert_eq!(d.method, GenerationMethod::PhoneLast4);
    }

    #[test]
    fn phone_extraction_is_case_insensitive() {
        assert_eq!(
            extract_phone_last4("last 4 digits: 9876"),
            Some("9876".to_string())
        );
        assert_eq!(
            extract_phone_last4("(LAST 4 DIGITS): 1111"),
            Some("1111".to_string())
        );
        assert_eq!(extract_phone_last4("call me maybe"), None);
    }

    #[test]
    fn description_hash_is_deterministic() {
        let g = PinGenerator::new(4, 8);
        let a = g.derive(&event("Guest: Pat Jones"), None);
        let b = g.derive(&event("Guest: Pat Jones"), None);
        assert_eq!(a.method, GenerationMethod::DescriptionRandom);
        assert_eq!(a.code, b.code);
        assert_eq!(a.code.len(), 4);
        assert!(a.code.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn description_edit_changes_the_code() {
        let g = PinGenerator::new(4, 8);
        let a = g.derive(&event("Guest: Pat Jones"), None);
        let b = g.derive(&event("Guest: Sam Jones"), None);
        assert_ne!(a.code, b.code);
    }

    #[test]
    fn date_based_uses_day_numbers() {
        let g = PinGenerator::new(4, 8);
        let d = g.derive(&event(""), None);
        assert_eq!(d.code, "1518");
        assert_eq!(d.method, GenerationMethod::DateBased);
    }

    #[test]
    fn date_based_prepends_month_above_four_digits() {
        let g = PinGenerator::new(6, 8);
        let d = g.derive(&event(""), None);
        assert_eq!(d.code, "011518");
    }

    #[test]
    fn generator_clamps_length_bounds() {
        let g = PinGenerator::new(2, 12);
        assert_eq!(g.min_length(), 4);
        assert_eq!(g.max_length(), 8);

        let g = PinGenerator::new(6, 4);
        assert_eq!(g.min_length(), 6);
        assert_eq!(g.max_length(), 6);
    }

    #[test]
    fn validate_rejects_bad_codes() {
        let g = PinGenerator::new(4, 8);
        assert!(g.validate("123").is_err());
        assert!(g.validate("123456789").is_err());
        assert!(g.validate("12a4").is_err());
        assert!(g.validate("0000").is_ok());
    }

    #[test]
    fn regenerate_walks_the_chain() {
        let g = PinGenerator::new(4, 8);

        let ev = event("(Last 4 Digits): 0421");
        let d = g.regenerate(&ev, GenerationMethod::Custom);
        assert_eq!(d.method, GenerationMethod::PhoneLast4);

        let d = g.regenerate(&ev, GenerationMethod::PhoneLast4);
        assert_eq!(d.method, GenerationMethod::DescriptionRandom);

        let d = g.regenerate(&ev, GenerationMethod::DescriptionRandom);
        assert_eq!(d.method, GenerationMethod::DateBased);

        let d = g.regenerate(&ev, GenerationMethod::DateBased);
        assert_eq!(d.method, GenerationMethod::DateBased);
    }

    #[test]
    fn regenerate_skips_strategies_with_no_input() {
        let g = PinGenerator::new(4, 8);
        let d = g.regenerate(&event(""), GenerationMethod::Custom);
        assert_eq!(d.method, GenerationMethod::DateBased);
    }
}
