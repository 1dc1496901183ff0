//! Repository for the `calendar_subscriptions` and `calendar_locks` tables.

use chrono::Utc;
use keyway_core::types::DbId;
use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::models::calendar::{CalendarSubscription, CreateCalendar, UpdateCalendar};
use crate::models::calendar_sync_status;
use crate::new_id;

/// Column list for `calendar_subscriptions` queries.
const CALENDAR_COLUMNS: &str = "id, name, url, sync_interval_min, last_sync_at, sync_status, \
     sync_error, enabled, created_at, updated_at";

/// Provides read/write operations for calendar subscriptions.
pub struct CalendarRepo;

impl CalendarRepo {
    /// Insert a subscription and its lock mappings in one transaction.
    pub async fn create(
        pool: &SqlitePool,
        input: &CreateCalendar,
    ) -> StoreResult<CalendarSubscription> {
        let id = new_id();
        let now = Utc::now();

        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO calendar_subscriptions \
                (id, name, url, sync_interval_min, sync_status, enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.url)
        .bind(input.sync_interval_min)
        .bind(input.enabled)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for lock_id in &input.lock_ids {
            sqlx::query("INSERT INTO calendar_locks (calendar_id, lock_id) VALUES (?, ?)")
                .bind(&id)
                .bind(lock_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Self::find_by_id(pool, &id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "CalendarSubscription",
                id,
            })
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        id: &str,
    ) -> StoreResult<Option<CalendarSubscription>> {
        let query = format!("SELECT {CALENDAR_COLUMNS} FROM calendar_subscriptions WHERE id = ?");
        Ok(sqlx::query_as::<_, CalendarSubscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn list(pool: &SqlitePool) -> StoreResult<Vec<CalendarSubscription>> {
        let query = format!("SELECT {CALENDAR_COLUMNS} FROM calendar_subscriptions ORDER BY name");
        Ok(sqlx::query_as::<_, CalendarSubscription>(&query)
            .fetch_all(pool)
            .await?)
    }

    /// Enabled subscriptions, least-recently-synced first so restarts
    /// spread the load (SQLite sorts NULL `last_sync_at` first).
    pub async fn list_enabled(pool: &SqlitePool) -> StoreResult<Vec<CalendarSubscription>> {
        let query = format!(
            "SELECT {CALENDAR_COLUMNS} FROM calendar_subscriptions \
             WHERE enabled = 1 ORDER BY last_sync_at ASC"
        );
        Ok(sqlx::query_as::<_, CalendarSubscription>(&query)
            .fetch_all(pool)
            .await?)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        patch: &UpdateCalendar,
    ) -> StoreResult<CalendarSubscription> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "CalendarSubscription",
                id: id.to_string(),
            })?;

        sqlx::query(
            "UPDATE calendar_subscriptions SET \
                name = ?, url = ?, sync_interval_min = ?, enabled = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(patch.name.as_ref().unwrap_or(&existing.name))
        .bind(patch.url.as_ref().unwrap_or(&existing.url))
        .bind(patch.sync_interval_min.unwrap_or(existing.sync_interval_min))
        .bind(patch.enabled.unwrap_or(existing.enabled))
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "CalendarSubscription",
                id: id.to_string(),
            })
    }

    /// Delete a subscription; guest PINs and their assignment rows cascade.
    pub async fn delete(pool: &SqlitePool, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM calendar_subscriptions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "CalendarSubscription",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the lock mappings for a calendar in one transaction.
    pub async fn set_lock_ids(
        pool: &SqlitePool,
        calendar_id: &str,
        lock_ids: &[DbId],
    ) -> StoreResult<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM calendar_locks WHERE calendar_id = ?")
            .bind(calendar_id)
            .execute(&mut *tx)
            .await?;

        for lock_id in lock_ids {
            sqlx::query("INSERT INTO calendar_locks (calendar_id, lock_id) VALUES (?, ?)")
                .bind(calendar_id)
                .bind(lock_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Locks assigned to a calendar.
    pub async fn lock_ids(pool: &SqlitePool, calendar_id: &str) -> StoreResult<Vec<DbId>> {
        Ok(
            sqlx::query_scalar("SELECT lock_id FROM calendar_locks WHERE calendar_id = ?")
                .bind(calendar_id)
                .fetch_all(pool)
                .await?,
        )
    }

    /// Record the outcome of a sync run. `last_sync_at` is touched on
    /// success only, so failed feeds stay at the front of the restart order.
    pub async fn update_sync_status(
        pool: &SqlitePool,
        id: &str,
        status: &str,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let last_sync = (status == calendar_sync_status::SUCCESS).then(Utc::now);
        sqlx::query(
            "UPDATE calendar_subscriptions SET \
                sync_status = ?, sync_error = ?, \
                last_sync_at = COALESCE(?, last_sync_at), updated_at = ? \
             WHERE id = ?",
        )
        .bind(status)
        .bind(error)
        .bind(last_sync)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
