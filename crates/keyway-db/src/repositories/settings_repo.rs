//! Repository for the `settings` table.

use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::error::StoreResult;
use crate::models::setting::Setting;

/// Provides read/write operations for operating parameters.
pub struct SettingsRepo;

impl SettingsRepo {
    pub async fn get(pool: &SqlitePool, key: &str) -> StoreResult<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(pool)
                .await?,
        )
    }

    /// Fetch a setting, falling back to `default` when absent.
    pub async fn get_or(pool: &SqlitePool, key: &str, default: &str) -> StoreResult<String> {
        Ok(Self::get(pool, key).await?.unwrap_or_else(|| default.to_string()))
    }

    pub async fn all(pool: &SqlitePool) -> StoreResult<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, Setting>("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(|s| (s.key, s.value)).collect())
    }

    pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Apply several updates in one transaction.
    pub async fn set_many(pool: &SqlitePool, entries: &HashMap<String, String>) -> StoreResult<()> {
        let mut tx = pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?, ?) \
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
