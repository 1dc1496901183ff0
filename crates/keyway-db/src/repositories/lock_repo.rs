//! Repository for the `managed_locks` table.

use chrono::Utc;
use keyway_core::types::Timestamp;
use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::models::lock::{CreateLock, LockStatusUpdate, ManagedLock, UpdateLock};
use crate::new_id;

/// Column list for `managed_locks` queries.
const LOCK_COLUMNS: &str = "id, entity_id, name, protocol, total_slots, guest_slots, \
     static_slots, online, lock_state, battery_level, last_seen_at, \
     direct_integration, created_at, updated_at";

/// Provides read/write operations for managed locks.
pub struct LockRepo;

impl LockRepo {
    pub async fn create(pool: &SqlitePool, input: &CreateLock) -> StoreResult<ManagedLock> {
        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO managed_locks \
                (id, entity_id, name, protocol, total_slots, guest_slots, static_slots, \
                 online, lock_state, direct_integration, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 'unknown', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.entity_id)
        .bind(&input.name)
        .bind(&input.protocol)
        .bind(input.total_slots)
        .bind(input.guest_slots)
        .bind(input.static_slots)
        .bind(&input.direct_integration)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, &id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "ManagedLock",
                id,
            })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> StoreResult<Option<ManagedLock>> {
        let query = format!("SELECT {LOCK_COLUMNS} FROM managed_locks WHERE id = ?");
        Ok(sqlx::query_as::<_, ManagedLock>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn find_by_entity_id(
        pool: &SqlitePool,
        entity_id: &str,
    ) -> StoreResult<Option<ManagedLock>> {
        let query = format!("SELECT {LOCK_COLUMNS} FROM managed_locks WHERE entity_id = ?");
        Ok(sqlx::query_as::<_, ManagedLock>(&query)
            .bind(entity_id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn list(pool: &SqlitePool) -> StoreResult<Vec<ManagedLock>> {
        let query = format!("SELECT {LOCK_COLUMNS} FROM managed_locks ORDER BY name");
        Ok(sqlx::query_as::<_, ManagedLock>(&query)
            .fetch_all(pool)
            .await?)
    }

    /// Apply a patch. The slot-budget CHECK constraint rejects updates that
    /// would over-commit the lock.
    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        patch: &UpdateLock,
    ) -> StoreResult<ManagedLock> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "ManagedLock",
                id: id.to_string(),
            })?;

        let direct_integration = match &patch.direct_integration {
            Some(value) => value.clone(),
            None => existing.direct_integration.clone(),
        };

        sqlx::query(
            "UPDATE managed_locks SET \
                name = ?, total_slots = ?, guest_slots = ?, static_slots = ?, \
                direct_integration = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(patch.name.as_ref().unwrap_or(&existing.name))
        .bind(patch.total_slots.unwrap_or(existing.total_slots))
        .bind(patch.guest_slots.unwrap_or(existing.guest_slots))
        .bind(patch.static_slots.unwrap_or(existing.static_slots))
        .bind(direct_integration)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "ManagedLock",
                id: id.to_string(),
            })
    }

    /// Record observed state from a status refresh, touching `last_seen_at`
    /// only when the lock is reachable.
    pub async fn update_status(
        pool: &SqlitePool,
        id: &str,
        status: &LockStatusUpdate,
    ) -> StoreResult<()> {
        let last_seen: Option<Timestamp> = status.online.then(Utc::now);
        sqlx::query(
            "UPDATE managed_locks SET \
                online = ?, lock_state = ?, battery_level = ?, \
                last_seen_at = COALESCE(?, last_seen_at), updated_at = ? \
             WHERE id = ?",
        )
        .bind(status.online)
        .bind(&status.lock_state)
        .bind(status.battery_level)
        .bind(last_seen)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a lock; assignments cascade.
    pub async fn delete(pool: &SqlitePool, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM managed_locks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "ManagedLock",
                id: id.to_string(),
            });
        }
        Ok(())
    }

}
