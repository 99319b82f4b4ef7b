use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_core::model::{Category, ExerciseId, ExerciseRef};

use super::SqliteRepository;
use super::mapping::{conn, map_exercise_row};
use crate::repository::{ExerciseProgress, ExerciseProgressRepository, StorageError};

#[async_trait]
impl ExerciseProgressRepository for SqliteRepository {
    async fn mark_asked(
        &self,
        exercises: &[ExerciseRef],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if exercises.is_empty() {
            return Ok(());
        }

        // Dropping `tx` on an early return rolls the whole batch back.
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for exercise in exercises {
            sqlx::query(
                r"
                INSERT INTO problem_progress (
                    id, category, asked_count, correct_count, incorrect_count, last_asked_at
                )
                VALUES (?1, ?2, 1, 0, 0, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    asked_count = asked_count + 1,
                    last_asked_at = excluded.last_asked_at
                ",
            )
            .bind(exercise.id.as_str())
            .bind(exercise.category.key())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }
        tx.commit().await.map_err(conn)?;

        Ok(())
    }

    async fn mark_answered(
        &self,
        exercise: &ExerciseRef,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let (correct, incorrect) = if is_correct { (1_i64, 0_i64) } else { (0, 1) };
        sqlx::query(
            r"
            INSERT INTO problem_progress (
                id, category, asked_count, correct_count, incorrect_count, last_answered_at
            )
            VALUES (?1, ?2, 0, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                correct_count = correct_count + excluded.correct_count,
                incorrect_count = incorrect_count + excluded.incorrect_count,
                last_answered_at = excluded.last_answered_at
            ",
        )
        .bind(exercise.id.as_str())
        .bind(exercise.category.key())
        .bind(correct)
        .bind(incorrect)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_exercise_progress(
        &self,
        id: &ExerciseId,
    ) -> Result<Option<ExerciseProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, category, asked_count, correct_count, incorrect_count,
                last_asked_at, last_answered_at
            FROM problem_progress
            WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_exercise_row).transpose()
    }

    async fn list_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ExerciseProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, category, asked_count, correct_count, incorrect_count,
                last_asked_at, last_answered_at
            FROM problem_progress
            WHERE category = ?1
            ORDER BY id ASC
            ",
        )
        .bind(category.key())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_exercise_row).collect()
    }
}
