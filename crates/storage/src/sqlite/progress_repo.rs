use async_trait::async_trait;
use quest_core::model::ProgressRecord;

use super::mapping::{conn, ser};
use super::{PROGRESS_SINGLETON, SqliteRepository};
use crate::repository::{ProgressSnapshotRepository, StorageError};

#[async_trait]
impl ProgressSnapshotRepository for SqliteRepository {
    async fn load_snapshot(&self) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM progress WHERE id = ?1")
            .bind(PROGRESS_SINGLETON)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)
    }

    async fn save_snapshot(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let value = serde_json::to_string(record).map_err(ser)?;
        sqlx::query(
            r"
            INSERT INTO progress (id, value)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET value = excluded.value
            ",
        )
        .bind(PROGRESS_SINGLETON)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
