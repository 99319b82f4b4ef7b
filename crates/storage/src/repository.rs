use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_core::model::{Category, ExerciseId, ExerciseRef, ProgressRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Asked/answered counters for one exercise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseProgress {
    pub id: ExerciseId,
    pub category: Category,
    pub asked_count: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub last_asked_at: Option<DateTime<Utc>>,
    pub last_answered_at: Option<DateTime<Utc>>,
}

impl ExerciseProgress {
    /// Zeroed counters for an exercise seen for the first time.
    #[must_use]
    pub fn empty(exercise: &ExerciseRef) -> Self {
        Self {
            id: exercise.id.clone(),
            category: exercise.category,
            asked_count: 0,
            correct_count: 0,
            incorrect_count: 0,
            last_asked_at: None,
            last_answered_at: None,
        }
    }

    pub fn mark_asked(&mut self, at: DateTime<Utc>) {
        self.asked_count = self.asked_count.saturating_add(1);
        self.last_asked_at = Some(at);
    }

    pub fn mark_answered(&mut self, is_correct: bool, at: DateTime<Utc>) {
        if is_correct {
            self.correct_count = self.correct_count.saturating_add(1);
        } else {
            self.incorrect_count = self.incorrect_count.saturating_add(1);
        }
        self.last_answered_at = Some(at);
    }
}

/// Singleton snapshot of the whole progress record.
#[async_trait]
pub trait ProgressSnapshotRepository: Send + Sync {
    /// Raw JSON of the stored snapshot, if any.
    ///
    /// Returned unparsed so the caller can run it through the schema repair pass.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be read.
    async fn load_snapshot(&self) -> Result<Option<String>, StorageError>;

    /// Overwrite the snapshot. Last write wins.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be serialized or stored.
    async fn save_snapshot(&self, record: &ProgressRecord) -> Result<(), StorageError>;
}

/// Per-exercise asked/answered history.
#[async_trait]
pub trait ExerciseProgressRepository: Send + Sync {
    /// Count one ask for every exercise in the batch, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the batch cannot be applied; nothing is written then.
    async fn mark_asked(
        &self,
        exercises: &[ExerciseRef],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Count one correct or incorrect answer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update fails.
    async fn mark_answered(
        &self,
        exercise: &ExerciseRef,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn get_exercise_progress(
        &self,
        id: &ExerciseId,
    ) -> Result<Option<ExerciseProgress>, StorageError>;

    /// All tracked exercises of a category, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ExerciseProgress>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshot: Arc<Mutex<Option<String>>>,
    exercises: Arc<Mutex<HashMap<ExerciseId, ExerciseProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot with arbitrary text, e.g. a legacy blob.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw_snapshot(&self, raw: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(raw.into());
        Ok(())
    }
}

#[async_trait]
impl ProgressSnapshotRepository for InMemoryRepository {
    async fn load_snapshot(&self) -> Result<Option<String>, StorageError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save_snapshot(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let raw = serde_json::to_string(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put_raw_snapshot(raw)
    }
}

#[async_trait]
impl ExerciseProgressRepository for InMemoryRepository {
    async fn mark_asked(
        &self,
        exercises: &[ExerciseRef],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        for exercise in exercises {
            guard
                .entry(exercise.id.clone())
                .or_insert_with(|| ExerciseProgress::empty(exercise))
                .mark_asked(at);
        }
        Ok(())
    }

    async fn mark_answered(
        &self,
        exercise: &ExerciseRef,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .entry(exercise.id.clone())
            .or_insert_with(|| ExerciseProgress::empty(exercise))
            .mark_answered(is_correct, at);
        Ok(())
    }

    async fn get_exercise_progress(
        &self,
        id: &ExerciseId,
    ) -> Result<Option<ExerciseProgress>, StorageError> {
        let guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ExerciseProgress>, StorageError> {
        let guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<_> = guard
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

/// Aggregates the durable repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressSnapshotRepository>,
    pub exercises: Arc<dyn ExerciseProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_repository(repo: InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressSnapshotRepository> = Arc::new(repo.clone());
        let exercises: Arc<dyn ExerciseProgressRepository> = Arc::new(repo);
        Self {
            progress,
            exercises,
        }
    }
}
