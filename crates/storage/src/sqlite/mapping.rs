use quest_core::model::{Category, ExerciseId};
use sqlx::Row;

use crate::repository::{ExerciseProgress, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn parse_category(s: &str) -> Result<Category, StorageError> {
    s.parse::<Category>().map_err(ser)
}

pub(crate) fn map_exercise_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ExerciseProgress, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let category: String = row.try_get("category").map_err(ser)?;

    Ok(ExerciseProgress {
        id: ExerciseId::new(id),
        category: parse_category(&category)?,
        asked_count: u32_from_i64("asked_count", row.try_get("asked_count").map_err(ser)?)?,
        correct_count: u32_from_i64("correct_count", row.try_get("correct_count").map_err(ser)?)?,
        incorrect_count: u32_from_i64(
            "incorrect_count",
            row.try_get("incorrect_count").map_err(ser)?,
        )?,
        last_asked_at: row.try_get("last_asked_at").map_err(ser)?,
        last_answered_at: row.try_get("last_answered_at").map_err(ser)?,
    })
}
