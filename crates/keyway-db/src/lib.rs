//! SQLite persistence layer.
//!
//! The store is the only persistent shared state in the engine: a single
//! [`sqlx::SqlitePool`] handle is passed by reference to every component.
//! WAL mode gives one writer and concurrent readers; a mutation that
//! returns success is visible to every subsequent read.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod error;
pub mod models;
pub mod repositories;

pub use error::StoreError;

pub type DbPool = sqlx::SqlitePool;

/// Embedded migrations, applied in filename order, each in its own
/// transaction and recorded in the ledger table on commit.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open (creating if missing) the database at `path` and return a pool.
///
/// Foreign keys are enforced so entity deletion cascades to assignments.
pub async fn create_pool(path: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
}

/// Apply all pending migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Cheap connectivity probe used by the health endpoint.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
}

/// Generate a fresh opaque entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
