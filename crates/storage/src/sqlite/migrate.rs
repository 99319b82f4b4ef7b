use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Progress snapshot + per-exercise counters. The newest version here must
/// equal `STORE_VERSION`.
const V1_PROGRESS_TABLES: i64 = 1;

/// Bring the store up to `STORE_VERSION`.
///
/// Each version's tables and indexes are created once, inside one
/// transaction, and recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, V1_PROGRESS_TABLES).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress (
                    id TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS problem_progress (
                    id TEXT PRIMARY KEY,
                    category TEXT NOT NULL,
                    asked_count INTEGER NOT NULL DEFAULT 0 CHECK (asked_count >= 0),
                    correct_count INTEGER NOT NULL DEFAULT 0 CHECK (correct_count >= 0),
                    incorrect_count INTEGER NOT NULL DEFAULT 0 CHECK (incorrect_count >= 0),
                    last_asked_at TEXT,
                    last_answered_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_problem_progress_category
                    ON problem_progress (category);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(V1_PROGRESS_TABLES)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}

/// Highest version recorded in `schema_migrations`, 0 for a fresh store.
pub async fn applied_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}
