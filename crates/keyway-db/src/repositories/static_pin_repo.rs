//! Repository for the `static_pins`, `static_pin_schedules` and
//! `static_pin_locks` tables.

use chrono::Utc;
use keyway_core::types::Timestamp;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::models::static_pin::{
    CreateStaticPin, PendingStaticSync, StaticPin, StaticPinDetail, StaticPinLock,
    StaticPinSchedule, StaticPinWithSchedules, UpdateStaticPin,
};
use crate::models::sync_status;
use crate::new_id;

/// Column list for `static_pins` queries.
const PIN_COLUMNS: &str =
    "id, name, pin_code, enabled, always_active, slot_number, created_at, updated_at";

/// Column list for `static_pin_schedules` queries.
const SCHEDULE_COLUMNS: &str = "id, static_pin_id, day_of_week, start_time, end_time";

/// Column list for `static_pin_locks` queries.
const ASSIGNMENT_COLUMNS: &str =
    "static_pin_id, lock_id, slot_number, sync_status, last_synced_at";

/// Provides read/write operations for static PINs.
pub struct StaticPinRepo;

impl StaticPinRepo {
    /// Insert a static PIN with its schedules and lock assignments in one
    /// transaction. Requested slots are validated against current occupancy.
    pub async fn create(pool: &SqlitePool, input: &CreateStaticPin) -> StoreResult<StaticPin> {
        let id = new_id();
        let now = Utc::now();

        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO static_pins \
                (id, name, pin_code, enabled, always_active, slot_number, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.pin_code)
        .bind(input.enabled)
        .bind(input.always_active)
        .bind(input.slot_number)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for schedule in &input.schedules {
            insert_schedule(&mut tx, &id, schedule).await?;
        }

        for lock_id in &input.lock_ids {
            insert_assignment(&mut tx, &id, lock_id, input.slot_number).await?;
        }

        tx.commit().await?;

        Self::find_by_id(pool, &id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "StaticPin",
                id,
            })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> StoreResult<Option<StaticPin>> {
        let query = format!("SELECT {PIN_COLUMNS} FROM static_pins WHERE id = ?");
        Ok(sqlx::query_as::<_, StaticPin>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// One static PIN with schedules and assignments, as the API serves it.
    pub async fn find_detail(pool: &SqlitePool, id: &str) -> StoreResult<Option<StaticPinDetail>> {
        let Some(pin) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let schedules = Self::schedules(pool, id).await?;
        let locks = Self::assignments(pool, id).await?;
        Ok(Some(StaticPinDetail {
            pin,
            schedules,
            locks,
        }))
    }

    pub async fn list(pool: &SqlitePool) -> StoreResult<Vec<StaticPin>> {
        let query = format!("SELECT {PIN_COLUMNS} FROM static_pins ORDER BY name");
        Ok(sqlx::query_as::<_, StaticPin>(&query)
            .fetch_all(pool)
            .await?)
    }

    pub async fn list_detail(pool: &SqlitePool) -> StoreResult<Vec<StaticPinDetail>> {
        let pins = Self::list(pool).await?;
        let mut out = Vec::with_capacity(pins.len());
        for pin in pins {
            let schedules = Self::schedules(pool, &pin.id).await?;
            let locks = Self::assignments(pool, &pin.id).await?;
            out.push(StaticPinDetail {
                pin,
                schedules,
                locks,
            });
        }
        Ok(out)
    }

    /// Enabled PINs with their schedule windows: evaluator input.
    pub async fn list_enabled_with_schedules(
        pool: &SqlitePool,
    ) -> StoreResult<Vec<StaticPinWithSchedules>> {
        let query = format!("SELECT {PIN_COLUMNS} FROM static_pins WHERE enabled = 1 ORDER BY name");
        let pins = sqlx::query_as::<_, StaticPin>(&query)
            .fetch_all(pool)
            .await?;

        let mut out = Vec::with_capacity(pins.len());
        for pin in pins {
            let schedules = Self::schedules(pool, &pin.id).await?;
            out.push(StaticPinWithSchedules { pin, schedules });
        }
        Ok(out)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        patch: &UpdateStaticPin,
    ) -> StoreResult<StaticPin> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "StaticPin",
                id: id.to_string(),
            })?;

        sqlx::query(
            "UPDATE static_pins SET \
                name = ?, pin_code = ?, enabled = ?, always_active = ?, \
                slot_number = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(patch.name.as_ref().unwrap_or(&existing.name))
        .bind(patch.pin_code.as_ref().unwrap_or(&existing.pin_code))
        .bind(patch.enabled.unwrap_or(existing.enabled))
        .bind(patch.always_active.unwrap_or(existing.always_active))
        .bind(patch.slot_number.unwrap_or(existing.slot_number))
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "StaticPin",
                id: id.to_string(),
            })
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM static_pins WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "StaticPin",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    pub async fn schedules(
        pool: &SqlitePool,
        static_pin_id: &str,
    ) -> StoreResult<Vec<StaticPinSchedule>> {
        let query = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM static_pin_schedules \
             WHERE static_pin_id = ? ORDER BY day_of_week, start_time"
        );
        Ok(sqlx::query_as::<_, StaticPinSchedule>(&query)
            .bind(static_pin_id)
            .fetch_all(pool)
            .await?)
    }

    /// Replace all schedule windows for a PIN in one transaction.
    pub async fn set_schedules(
        pool: &SqlitePool,
        static_pin_id: &str,
        schedules: &[StaticPinSchedule],
    ) -> StoreResult<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM static_pin_schedules WHERE static_pin_id = ?")
            .bind(static_pin_id)
            .execute(&mut *tx)
            .await?;

        for schedule in schedules {
            insert_schedule(&mut tx, static_pin_id, schedule).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lock assignments
    // -----------------------------------------------------------------------

    pub async fn assignments(
        pool: &SqlitePool,
        static_pin_id: &str,
    ) -> StoreResult<Vec<StaticPinLock>> {
        let query =
            format!("SELECT {ASSIGNMENT_COLUMNS} FROM static_pin_locks WHERE static_pin_id = ?");
        Ok(sqlx::query_as::<_, StaticPinLock>(&query)
            .bind(static_pin_id)
            .fetch_all(pool)
            .await?)
    }

    /// Replace the lock assignments for a PIN in one transaction, using the
    /// PIN's persisted desired slot on every lock.
    pub async fn set_lock_ids(
        pool: &SqlitePool,
        static_pin_id: &str,
        lock_ids: &[String],
    ) -> StoreResult<()> {
        let pin = Self::find_by_id(pool, static_pin_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "StaticPin",
                id: static_pin_id.to_string(),
            })?;

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM static_pin_locks WHERE static_pin_id = ?")
            .bind(static_pin_id)
            .execute(&mut *tx)
            .await?;

        for lock_id in lock_ids {
            insert_assignment(&mut tx, static_pin_id, lock_id, pin.slot_number).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Record a writer outcome for one (pin, lock) assignment.
    pub async fn update_assignment_sync(
        pool: &SqlitePool,
        static_pin_id: &str,
        lock_id: &str,
        status: &str,
    ) -> StoreResult<()> {
        let synced_at: Option<Timestamp> = (status == sync_status::SYNCED).then(Utc::now);
        sqlx::query(
            "UPDATE static_pin_locks SET \
                sync_status = ?, last_synced_at = COALESCE(?, last_synced_at) \
             WHERE static_pin_id = ? AND lock_id = ?",
        )
        .bind(status)
        .bind(synced_at)
        .bind(static_pin_id)
        .bind(lock_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark every assignment of a PIN pending again.
    pub async fn mark_assignments_pending(
        pool: &SqlitePool,
        static_pin_id: &str,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE static_pin_locks SET sync_status = 'pending' WHERE static_pin_id = ?")
            .bind(static_pin_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Pending assignments joined with their parent PINs: drain-sweep input.
    pub async fn list_pending_sync(pool: &SqlitePool) -> StoreResult<Vec<PendingStaticSync>> {
        Ok(sqlx::query_as::<_, PendingStaticSync>(
            "SELECT spl.static_pin_id, spl.lock_id, spl.slot_number, sp.pin_code, sp.enabled \
             FROM static_pin_locks spl \
             JOIN static_pins sp ON sp.id = spl.static_pin_id \
             WHERE spl.sync_status = 'pending'",
        )
        .fetch_all(pool)
        .await?)
    }
}

async fn insert_schedule(
    tx: &mut Transaction<'_, Sqlite>,
    static_pin_id: &str,
    schedule: &StaticPinSchedule,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO static_pin_schedules \
            (id, static_pin_id, day_of_week, start_time, end_time) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(static_pin_id)
    .bind(schedule.day_of_week)
    .bind(&schedule.start_time)
    .bind(&schedule.end_time)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Insert an assignment after checking the requested slot against current
/// occupancy (non-expired guest assignments plus other static assignments).
async fn insert_assignment(
    tx: &mut Transaction<'_, Sqlite>,
    static_pin_id: &str,
    lock_id: &str,
    slot_number: i64,
) -> StoreResult<()> {
    let lock_row: Option<(i64, i64)> =
        sqlx::query_as("SELECT total_slots, static_slots FROM managed_locks WHERE id = ?")
            .bind(lock_id)
            .fetch_optional(&mut **tx)
            .await?;

    let Some((total_slots, static_slots)) = lock_row else {
        return Err(StoreError::NotFound {
            entity: "ManagedLock",
            id: lock_id.to_string(),
        });
    };

    if slot_number < 1 || slot_number > total_slots {
        return Err(StoreError::Conflict(format!(
            "slot {slot_number} is outside 1..={total_slots} on lock {lock_id}"
        )));
    }

    let occupied: Vec<i64> = sqlx::query_scalar(
        "SELECT gpl.slot_number \
         FROM guest_pin_locks gpl \
         JOIN guest_pins gp ON gp.id = gpl.guest_pin_id \
         WHERE gpl.lock_id = ? \
           AND gpl.slot_number >= 1 \
           AND gp.status NOT IN ('expired', 'conflict') \
         UNION \
         SELECT slot_number FROM static_pin_locks \
         WHERE lock_id = ? AND static_pin_id != ?",
    )
    .bind(lock_id)
    .bind(lock_id)
    .bind(static_pin_id)
    .fetch_all(&mut **tx)
    .await?;

    if occupied.contains(&slot_number) {
        return Err(StoreError::Conflict(format!(
            "slot {slot_number} on lock {lock_id} is already occupied"
        )));
    }

    let static_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM static_pin_locks WHERE lock_id = ? AND static_pin_id != ?",
    )
    .bind(lock_id)
    .bind(static_pin_id)
    .fetch_one(&mut **tx)
    .await?;

    if static_count >= static_slots {
        return Err(StoreError::Conflict(format!(
            "static slot budget exhausted on lock {lock_id} ({static_count}/{static_slots} in use)"
        )));
    }

    sqlx::query(
        "INSERT INTO static_pin_locks (static_pin_id, lock_id, slot_number, sync_status) \
         VALUES (?, ?, ?, 'pending')",
    )
    .bind(static_pin_id)
    .bind(lock_id)
    .bind(slot_number)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
