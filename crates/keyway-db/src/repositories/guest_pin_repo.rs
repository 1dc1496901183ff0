//! Repository for the `guest_pins` and `guest_pin_locks` tables.

use chrono::Utc;
use keyway_core::slots;
use keyway_core::types::Timestamp;
use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::models::guest_pin::{
    GuestPin, GuestPinLock, NewGuestPin, PendingGuestSync,
};
use crate::models::sync_status;
use crate::new_id;

/// Column list for `guest_pins` queries.
const PIN_COLUMNS: &str = "id, calendar_id, event_uid, event_summary, pin_code, \
     generation_method, custom_pin, valid_from, valid_until, status, \
     regeneration_eligible, created_at, updated_at";

/// Column list for `guest_pin_locks` queries.
const ASSIGNMENT_COLUMNS: &str =
    "guest_pin_id, lock_id, slot_number, sync_status, last_synced_at, error_message";

/// Outcome of a per-lock slot allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// A slot was allocated and the assignment is pending sync.
    Assigned(i64),
    /// No slot was available; a failed assignment row records why.
    Failed(String),
}

/// Provides read/write operations for guest PINs and their assignments.
pub struct GuestPinRepo;

impl GuestPinRepo {
    pub async fn create(pool: &SqlitePool, draft: &NewGuestPin) -> StoreResult<GuestPin> {
        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO guest_pins \
                (id, calendar_id, event_uid, event_summary, pin_code, generation_method, \
                 custom_pin, valid_from, valid_until, status, regeneration_eligible, \
                 created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&draft.calendar_id)
        .bind(&draft.event_uid)
        .bind(&draft.event_summary)
        .bind(&draft.pin_code)
        .bind(&draft.generation_method)
        .bind(&draft.custom_pin)
        .bind(draft.valid_from)
        .bind(draft.valid_until)
        .bind(&draft.status)
        .bind(draft.regeneration_eligible)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, &id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "GuestPin",
                id,
            })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> StoreResult<Option<GuestPin>> {
        let query = format!("SELECT {PIN_COLUMNS} FROM guest_pins WHERE id = ?");
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// Look up the PIN derived from a specific calendar event.
    pub async fn find_by_event(
        pool: &SqlitePool,
        calendar_id: &str,
        event_uid: &str,
    ) -> StoreResult<Option<GuestPin>> {
        let query =
            format!("SELECT {PIN_COLUMNS} FROM guest_pins WHERE calendar_id = ? AND event_uid = ?");
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(calendar_id)
            .bind(event_uid)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn list(pool: &SqlitePool) -> StoreResult<Vec<GuestPin>> {
        let query = format!("SELECT {PIN_COLUMNS} FROM guest_pins ORDER BY valid_from DESC");
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .fetch_all(pool)
            .await?)
    }

    pub async fn list_by_calendar(
        pool: &SqlitePool,
        calendar_id: &str,
    ) -> StoreResult<Vec<GuestPin>> {
        let query = format!(
            "SELECT {PIN_COLUMNS} FROM guest_pins WHERE calendar_id = ? ORDER BY valid_from DESC"
        );
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(calendar_id)
            .fetch_all(pool)
            .await?)
    }

    pub async fn list_by_status(pool: &SqlitePool, status: &str) -> StoreResult<Vec<GuestPin>> {
        let query = format!(
            "SELECT {PIN_COLUMNS} FROM guest_pins WHERE status = ? ORDER BY valid_from DESC"
        );
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(status)
            .fetch_all(pool)
            .await?)
    }

    /// Pending PINs whose window has opened: status scheduler input.
    pub async fn list_pending_activation(
        pool: &SqlitePool,
        now: Timestamp,
    ) -> StoreResult<Vec<GuestPin>> {
        let query = format!(
            "SELECT {PIN_COLUMNS} FROM guest_pins \
             WHERE status = 'pending' AND valid_from <= ? ORDER BY valid_from"
        );
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(now)
            .fetch_all(pool)
            .await?)
    }

    /// Active PINs whose window has closed: status scheduler input.
    pub async fn list_active_expired(
        pool: &SqlitePool,
        now: Timestamp,
    ) -> StoreResult<Vec<GuestPin>> {
        let query = format!(
            "SELECT {PIN_COLUMNS} FROM guest_pins \
             WHERE status = 'active' AND valid_until <= ? ORDER BY valid_until"
        );
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(now)
            .fetch_all(pool)
            .await?)
    }

    /// Non-expired, non-conflict PINs with the same code and an overlapping
    /// validity window. Range overlap is evaluated on timestamps.
    pub async fn find_conflicts(
        pool: &SqlitePool,
        pin_code: &str,
        valid_from: Timestamp,
        valid_until: Timestamp,
        exclude_id: &str,
    ) -> StoreResult<Vec<GuestPin>> {
        let query = format!(
            "SELECT {PIN_COLUMNS} FROM guest_pins \
             WHERE pin_code = ? \
               AND id != ? \
               AND valid_from < ? \
               AND valid_until > ? \
               AND status NOT IN ('expired', 'conflict')"
        );
        Ok(sqlx::query_as::<_, GuestPin>(&query)
            .bind(pin_code)
            .bind(exclude_id)
            .bind(valid_until)
            .bind(valid_from)
            .fetch_all(pool)
            .await?)
    }

    /// Update the validity window (and possibly the code) after the source
    /// event's dates changed.
    pub async fn update_window(
        pool: &SqlitePool,
        id: &str,
        valid_from: Timestamp,
        valid_until: Timestamp,
        event_summary: Option<&str>,
        pin_code: &str,
        generation_method: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE guest_pins SET \
                valid_from = ?, valid_until = ?, event_summary = ?, \
                pin_code = ?, generation_method = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(valid_from)
        .bind(valid_until)
        .bind(event_summary)
        .bind(pin_code)
        .bind(generation_method)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "GuestPin",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the code (custom override or regeneration).
    pub async fn update_code(
        pool: &SqlitePool,
        id: &str,
        pin_code: &str,
        generation_method: &str,
        custom_pin: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE guest_pins SET \
                pin_code = ?, generation_method = ?, custom_pin = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(pin_code)
        .bind(generation_method)
        .bind(custom_pin)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "GuestPin",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn update_status(pool: &SqlitePool, id: &str, status: &str) -> StoreResult<()> {
        sqlx::query("UPDATE guest_pins SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM guest_pins WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "GuestPin",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lock assignments
    // -----------------------------------------------------------------------

    /// Allocate a slot on `lock_id` for a guest PIN.
    ///
    /// Runs in one transaction: re-reads current occupancy, applies the
    /// lowest-free-slot policy under the guest-slot budget, and either
    /// upserts a pending assignment or records a failed one so the outcome
    /// is visible without producing a lock write.
    pub async fn assign_to_lock(
        pool: &SqlitePool,
        guest_pin_id: &str,
        lock_id: &str,
    ) -> StoreResult<AssignOutcome> {
        let mut tx = pool.begin().await?;

        let lock_row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT total_slots, guest_slots FROM managed_locks WHERE id = ?",
        )
        .bind(lock_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((total_slots, guest_slots)) = lock_row else {
            return Err(StoreError::NotFound {
                entity: "ManagedLock",
                id: lock_id.to_string(),
            });
        };

        let occupied: Vec<i64> = sqlx::query_scalar(
            "SELECT gpl.slot_number \
             FROM guest_pin_locks gpl \
             JOIN guest_pins gp ON gp.id = gpl.guest_pin_id \
             WHERE gpl.lock_id = ? \
               AND gpl.guest_pin_id != ? \
               AND gpl.slot_number >= 1 \
               AND gp.status NOT IN ('expired', 'conflict') \
             UNION \
             SELECT slot_number FROM static_pin_locks WHERE lock_id = ?",
        )
        .bind(lock_id)
        .bind(guest_pin_id)
        .bind(lock_id)
        .fetch_all(&mut *tx)
        .await?;

        let guest_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) \
             FROM guest_pin_locks gpl \
             JOIN guest_pins gp ON gp.id = gpl.guest_pin_id \
             WHERE gpl.lock_id = ? \
               AND gpl.guest_pin_id != ? \
               AND gpl.slot_number >= 1 \
               AND gp.status NOT IN ('expired', 'conflict')",
        )
        .bind(lock_id)
        .bind(guest_pin_id)
        .fetch_one(&mut *tx)
        .await?;

        let outcome = if guest_count >= guest_slots {
            AssignOutcome::Failed(format!(
                "guest slot budget exhausted ({guest_count}/{guest_slots} in use)"
            ))
        } else {
            match slots::lowest_free_slot(&occupied, total_slots) {
                Some(slot) => AssignOutcome::Assigned(slot),
                None => AssignOutcome::Failed(format!(
                    "no free slot among {total_slots} total slots"
                )),
            }
        };

        match &outcome {
            AssignOutcome::Assigned(slot) => {
                sqlx::query(
                    "INSERT INTO guest_pin_locks \
                        (guest_pin_id, lock_id, slot_number, sync_status) \
                     VALUES (?, ?, ?, 'pending') \
                     ON CONFLICT (guest_pin_id, lock_id) DO UPDATE SET \
                        slot_number = excluded.slot_number, \
                        sync_status = 'pending', \
                        error_message = NULL",
                )
                .bind(guest_pin_id)
                .bind(lock_id)
                .bind(slot)
                .execute(&mut *tx)
                .await?;
            }
            AssignOutcome::Failed(reason) => {
                sqlx::query(
                    "INSERT INTO guest_pin_locks \
                        (guest_pin_id, lock_id, slot_number, sync_status, error_message) \
                     VALUES (?, ?, 0, 'failed', ?) \
                     ON CONFLICT (guest_pin_id, lock_id) DO UPDATE SET \
                        slot_number = 0, \
                        sync_status = 'failed', \
                        error_message = excluded.error_message",
                )
                .bind(guest_pin_id)
                .bind(lock_id)
                .bind(reason)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// All assignments for one guest PIN.
    pub async fn assignments(pool: &SqlitePool, guest_pin_id: &str) -> StoreResult<Vec<GuestPinLock>> {
        let query =
            format!("SELECT {ASSIGNMENT_COLUMNS} FROM guest_pin_locks WHERE guest_pin_id = ?");
        Ok(sqlx::query_as::<_, GuestPinLock>(&query)
            .bind(guest_pin_id)
            .fetch_all(pool)
            .await?)
    }

    /// Record a writer outcome for one (pin, lock) assignment.
    pub async fn update_assignment_sync(
        pool: &SqlitePool,
        guest_pin_id: &str,
        lock_id: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let synced_at: Option<Timestamp> =
            matches!(status, sync_status::SYNCED | sync_status::REMOVED).then(Utc::now);
        sqlx::query(
            "UPDATE guest_pin_locks SET \
                sync_status = ?, last_synced_at = COALESCE(?, last_synced_at), \
                error_message = ? \
             WHERE guest_pin_id = ? AND lock_id = ?",
        )
        .bind(status)
        .bind(synced_at)
        .bind(error_message)
        .bind(guest_pin_id)
        .bind(lock_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark every allocated assignment of a PIN pending again, so the drain
    /// sweep re-emits intents after a status transition.
    pub async fn mark_assignments_pending(
        pool: &SqlitePool,
        guest_pin_id: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE guest_pin_locks SET sync_status = 'pending' \
             WHERE guest_pin_id = ? AND slot_number >= 1",
        )
        .bind(guest_pin_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Pending assignments joined with their parent PINs: drain-sweep input.
    pub async fn list_pending_sync(pool: &SqlitePool) -> StoreResult<Vec<PendingGuestSync>> {
        Ok(sqlx::query_as::<_, PendingGuestSync>(
            "SELECT gpl.guest_pin_id, gpl.lock_id, gpl.slot_number, gp.pin_code, gp.status \
             FROM guest_pin_locks gpl \
             JOIN guest_pins gp ON gp.id = gpl.guest_pin_id \
             WHERE gpl.sync_status = 'pending' AND gpl.slot_number >= 1",
        )
        .fetch_all(pool)
        .await?)
    }
}
