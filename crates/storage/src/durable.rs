//! Advisory durable store.
//!
//! Wraps the durable repositories so that callers never see their errors:
//! every failure is logged and turned into "nothing happened". The backend is
//! opened on first use; if it cannot be opened the store stays a no-op for
//! the rest of the process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quest_core::model::{BadgeCatalog, Category, ExerciseId, ExerciseRef, ProgressRecord};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::repository::{ExerciseProgress, Storage};
use crate::schema;

enum Opener {
    Sqlite(String),
    Ready(Storage),
    Disabled,
}

struct Inner {
    opener: Opener,
    backend: OnceCell<Option<Storage>>,
}

/// Cheap to clone; clones share the same lazily opened backend.
#[derive(Clone)]
pub struct DurableStore {
    inner: Arc<Inner>,
}

impl DurableStore {
    fn with_opener(opener: Opener) -> Self {
        Self {
            inner: Arc::new(Inner {
                opener,
                backend: OnceCell::new(),
            }),
        }
    }

    /// Open (and migrate) the `SQLite` database at `url` on first use.
    #[must_use]
    pub fn sqlite(url: impl Into<String>) -> Self {
        Self::with_opener(Opener::Sqlite(url.into()))
    }

    /// Use an already constructed backend.
    #[must_use]
    pub fn from_storage(storage: Storage) -> Self {
        Self::with_opener(Opener::Ready(storage))
    }

    /// A store where every operation is a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_opener(Opener::Disabled)
    }

    async fn backend(&self) -> Option<&Storage> {
        self.inner
            .backend
            .get_or_init(|| async {
                match &self.inner.opener {
                    Opener::Sqlite(url) => match Storage::sqlite(url).await {
                        Ok(storage) => {
                            debug!(url = %url, "durable store opened");
                            Some(storage)
                        }
                        Err(err) => {
                            warn!(url = %url, error = %err, "durable store unavailable, continuing without it");
                            None
                        }
                    },
                    Opener::Ready(storage) => Some(storage.clone()),
                    Opener::Disabled => None,
                }
            })
            .await
            .as_ref()
    }

    /// Whether a backend is open. Opens it if this is the first use.
    pub async fn is_available(&self) -> bool {
        self.backend().await.is_some()
    }

    /// Stored progress snapshot, repaired like a cache blob.
    pub async fn get_progress(&self, catalog: &BadgeCatalog) -> Option<ProgressRecord> {
        let backend = self.backend().await?;
        let raw = match backend.progress.load_snapshot().await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "durable get_progress failed");
                return None;
            }
        };
        match schema::decode_blob(&raw, catalog) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "durable progress snapshot rejected");
                None
            }
        }
    }

    pub async fn put_progress(&self, record: &ProgressRecord) {
        let Some(backend) = self.backend().await else {
            return;
        };
        if let Err(err) = backend.progress.save_snapshot(record).await {
            warn!(error = %err, "durable put_progress failed");
        }
    }

    pub async fn mark_asked(&self, exercises: &[ExerciseRef], at: DateTime<Utc>) {
        if exercises.is_empty() {
            return;
        }
        let Some(backend) = self.backend().await else {
            return;
        };
        if let Err(err) = backend.exercises.mark_asked(exercises, at).await {
            warn!(error = %err, count = exercises.len(), "durable mark_asked failed, batch dropped");
        }
    }

    pub async fn mark_answered(&self, exercise: &ExerciseRef, is_correct: bool, at: DateTime<Utc>) {
        let Some(backend) = self.backend().await else {
            return;
        };
        if let Err(err) = backend
            .exercises
            .mark_answered(exercise, is_correct, at)
            .await
        {
            warn!(error = %err, exercise = %exercise.id, "durable mark_answered failed");
        }
    }

    pub async fn exercise_progress(&self, id: &ExerciseId) -> Option<ExerciseProgress> {
        let backend = self.backend().await?;
        match backend.exercises.get_exercise_progress(id).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, exercise = %id, "durable exercise_progress failed");
                None
            }
        }
    }

    pub async fn exercise_progress_in(&self, category: Category) -> Vec<ExerciseProgress> {
        let Some(backend) = self.backend().await else {
            return Vec::new();
        };
        match backend.exercises.list_by_category(category).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, category = %category, "durable exercise_progress_in failed");
                Vec::new()
            }
        }
    }
}
