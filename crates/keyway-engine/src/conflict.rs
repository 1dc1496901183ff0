//! Conflict reporting and alternative-code search over the store.

use keyway_core::conflict::{alternative_candidates, overlap_window, DEFAULT_ALTERNATIVE_ATTEMPTS};
use keyway_core::types::{DbId, Timestamp};
use keyway_db::repositories::GuestPinRepo;
use keyway_db::{DbPool, StoreError};
use serde::Serialize;

/// A detected conflict with another guest PIN. Carries identifiers and the
/// shared window, never the code itself.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub conflicting_pin_id: DbId,
    pub event_summary: Option<String>,
    pub overlap_start: Timestamp,
    pub overlap_end: Timestamp,
}

/// All PINs conflicting with the given code over the given window.
pub async fn check_conflicts(
    pool: &DbPool,
    pin_code: &str,
    valid_from: Timestamp,
    valid_until: Timestamp,
    exclude_id: &str,
) -> Result<Vec<ConflictReport>, StoreError> {
    let conflicting =
        GuestPinRepo::find_conflicts(pool, pin_code, valid_from, valid_until, exclude_id).await?;

    Ok(conflicting
        .into_iter()
        .map(|pin| {
            let (overlap_start, overlap_end) =
                overlap_window(valid_from, valid_until, pin.valid_from, pin.valid_until);
            ConflictReport {
                conflicting_pin_id: pin.id,
                event_summary: pin.event_summary,
                overlap_start,
                overlap_end,
            }
        })
        .collect())
}

/// Search for a conflict-free code by incrementing the original, keeping
/// its length. Returns `None` when every candidate within the attempt
/// budget conflicts.
pub async fn find_alternative(
    pool: &DbPool,
    original: &str,
    valid_from: Timestamp,
    valid_until: Timestamp,
) -> Result<Option<String>, StoreError> {
    for candidate in alternative_candidates(original, DEFAULT_ALTERNATIVE_ATTEMPTS) {
        let conflicts =
            GuestPinRepo::find_conflicts(pool, &candidate, valid_from, valid_until, "").await?;
        if conflicts.is_empty() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
