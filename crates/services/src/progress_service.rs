use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use quest_core::evaluator::BadgeEvaluator;
use quest_core::model::{
    BadgeCatalog, BadgeId, Category, ExerciseId, ExerciseRef, ProgressRecord, SessionStats,
    StuffyBadge, level_after,
};
use quest_core::random::{RandomSource, ThreadRandom};
use storage::schema::{self, LoadOutcome};
use storage::{DurableStore, ExerciseProgress, FileCache, ProgressCache};

use crate::config::ProgressConfig;
use crate::error::ProgressServiceError;

//
// ─── SESSION OUTCOME ───────────────────────────────────────────────────────────
//

/// What a finished round changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Badges unlocked by this round, in unlock order.
    pub new_badges: Vec<&'static StuffyBadge>,
    /// True when the only new badge came from the reward-always fallback.
    pub guaranteed: bool,
    pub progress: ProgressRecord,
    pub leveled_up: bool,
    /// Every catalog badge is now owned.
    pub collection_complete: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Owns the learner's current progress and is the only place it changes.
///
/// Every mutation goes through [`ProgressService::update_progress`]: the next
/// record is computed from the current one, normalised, written to the cache
/// before the call returns, and then handed to the durable store in the
/// background.
pub struct ProgressService {
    config: ProgressConfig,
    evaluator: BadgeEvaluator,
    cache: Arc<dyn ProgressCache>,
    durable: DurableStore,
    current: Arc<Mutex<ProgressRecord>>,
    // Held for a whole update so writers never interleave; `current` is only
    // locked briefly so reads stay available while an updater runs.
    update_gate: Mutex<()>,
    random: Mutex<Box<dyn RandomSource + Send>>,
    // Serialises background snapshot writes so the last one always carries
    // the newest record.
    snapshot_gate: Arc<tokio::sync::Mutex<()>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProgressService {
    /// Load progress from `cache`, falling back to the durable snapshot when
    /// the cache has never been written.
    pub async fn open(
        config: ProgressConfig,
        cache: Arc<dyn ProgressCache>,
        durable: DurableStore,
    ) -> Self {
        let initial = match schema::load_from_cache(cache.as_ref(), &config.catalog) {
            LoadOutcome::Loaded(record) => record,
            LoadOutcome::Reset(_) => ProgressRecord::default(),
            LoadOutcome::Missing => restore_from_durable(cache.as_ref(), &durable, &config).await,
        };
        let evaluator = BadgeEvaluator::new(
            config.catalog,
            config.thresholds.clone(),
            config.utc_offset,
        );

        Self {
            config,
            evaluator,
            cache,
            durable,
            current: Arc::new(Mutex::new(initial)),
            update_gate: Mutex::new(()),
            random: Mutex::new(Box::new(ThreadRandom)),
            snapshot_gate: Arc::new(tokio::sync::Mutex::new(())),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Open with a file cache in `data_dir` and a `SQLite` durable store at
    /// `db_url`. The database is only opened on first use.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Cache` if the cache directory cannot be
    /// created.
    pub async fn open_dir(
        config: ProgressConfig,
        data_dir: &Path,
        db_url: &str,
    ) -> Result<Self, ProgressServiceError> {
        let cache: Arc<dyn ProgressCache> = Arc::new(FileCache::open(data_dir)?);
        Ok(Self::open(config, cache, DurableStore::sqlite(db_url)).await)
    }

    /// Replace the random source used by the reward-always fallback.
    #[must_use]
    pub fn with_random(self, random: impl RandomSource + Send + 'static) -> Self {
        *lock(&self.random) = Box::new(random);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &BadgeCatalog {
        &self.config.catalog
    }

    /// Snapshot of the current in-memory record.
    #[must_use]
    pub fn progress(&self) -> ProgressRecord {
        lock(&self.current).clone()
    }

    /// The single mutation entry point.
    ///
    /// `updater` computes the next record from the current one. Afterwards:
    /// - `level` is set from the badge-count rule (any level the updater
    ///   chose is replaced), so it rises by at most one per call;
    /// - unknown badge ids are dropped and `seenProblemIds` is capped;
    /// - worn badges that are not owned are taken off;
    /// - the cache is written (failures are logged, not returned);
    /// - a durable snapshot write is dispatched without waiting for it.
    ///
    /// Updates are serialised. The updater may read [`ProgressService::progress`],
    /// but it must not call another mutating method (`update_progress`,
    /// `equip`, `record_answer`, ...) on the same service: that call waits
    /// for the one in progress and never returns.
    pub fn update_progress<F>(&self, updater: F) -> ProgressRecord
    where
        F: FnOnce(&ProgressRecord) -> ProgressRecord,
    {
        let next = {
            let _turn = lock(&self.update_gate);
            let prev = self.progress();
            let mut next = updater(&prev);
            self.normalise(&prev, &mut next);
            if let Err(error) = schema::save_progress(self.cache.as_ref(), &next) {
                warn!(%error, "progress cache write failed; keeping in-memory record");
            }
            *lock(&self.current) = next.clone();
            next
        };
        self.persist_snapshot();
        next
    }

    fn normalise(&self, prev: &ProgressRecord, next: &mut ProgressRecord) {
        let catalog = &self.config.catalog;
        let before = next.badges.len();
        next.badges.retain(|id| catalog.contains(id.as_str()));
        if next.badges.len() < before {
            warn!(dropped = before - next.badges.len(), "ignored badge ids missing from the catalog");
        }

        next.level = level_after(prev.level, prev.badge_count(), next.badge_count());
        if next.level > prev.level {
            info!(level = next.level, badges = next.badge_count(), "level up");
        }

        let evicted = next.enforce_seen_cap();
        if evicted > 0 {
            debug!(evicted, "oldest seen exercises evicted");
        }
        next.drop_unowned_equipped();
    }

    /// Evaluate a finished round and apply its result.
    pub fn record_session(&self, session: &SessionStats) -> SessionOutcome {
        let mut award = None;
        let mut previous_level = 0;
        let progress = self.update_progress(|prev| {
            previous_level = prev.level;
            let mut random = lock(&self.random);
            let result = self.evaluator.evaluate(prev, session, random.as_mut());
            let next = result.next.clone();
            award = Some(result);
            next
        });

        let (new_badges, guaranteed) = award
            .map(|award| (award.new_badges, award.guaranteed))
            .unwrap_or_default();
        let collection_complete = self.config.catalog.unowned(&progress.badges).is_empty();
        debug!(
            category = %session.category(),
            unlocked = new_badges.len(),
            streak = progress.streak_days,
            "session recorded"
        );

        SessionOutcome {
            new_badges,
            guaranteed,
            leveled_up: progress.level > previous_level,
            collection_complete,
            progress,
        }
    }

    /// Track one answer. A correct answer also marks the exercise as seen and
    /// counts towards its category.
    pub fn record_answer(&self, exercise: &ExerciseRef, is_correct: bool) -> ProgressRecord {
        let durable = self.durable.clone();
        let owned = exercise.clone();
        let at = self.config.clock.now();
        self.dispatch("mark_answered", async move {
            durable.mark_answered(&owned, is_correct, at).await;
        });

        if is_correct {
            self.update_progress(|prev| prev.clone().with_solved(&exercise.id, exercise.category))
        } else {
            self.progress()
        }
    }

    /// Track that a batch of exercises is about to be shown.
    pub fn mark_asked(&self, exercises: &[ExerciseRef]) {
        if exercises.is_empty() {
            return;
        }
        let durable = self.durable.clone();
        let batch = exercises.to_vec();
        let at = self.config.clock.now();
        self.dispatch("mark_asked", async move {
            durable.mark_asked(&batch, at).await;
        });
    }

    /// Toggle a badge in its slot. Unowned or unknown badges change nothing.
    pub fn equip(&self, id: &BadgeId) -> ProgressRecord {
        let catalog = self.config.catalog;
        self.update_progress(|prev| prev.equip(id, &catalog))
    }

    /// Take a badge off wherever it is worn.
    pub fn unequip(&self, id: &BadgeId) -> ProgressRecord {
        self.update_progress(|prev| prev.unequip(id))
    }

    /// Durable per-exercise counters, `None` if never tracked or unavailable.
    pub async fn problem_progress(&self, id: &ExerciseId) -> Option<ExerciseProgress> {
        self.durable.exercise_progress(id).await
    }

    /// Durable counters for every tracked exercise of `category`.
    pub async fn problem_progress_in(&self, category: Category) -> Vec<ExerciseProgress> {
        self.durable.exercise_progress_in(category).await
    }

    /// Wait for background durable writes dispatched so far.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *lock(&self.pending));
        for handle in handles {
            if let Err(error) = handle.await {
                warn!(%error, "durable write task failed");
            }
        }
    }

    fn persist_snapshot(&self) {
        let durable = self.durable.clone();
        let current = Arc::clone(&self.current);
        let gate = Arc::clone(&self.snapshot_gate);
        self.dispatch("put_progress", async move {
            let _turn = gate.lock().await;
            let snapshot = lock(&current).clone();
            durable.put_progress(&snapshot).await;
        });
    }

    fn dispatch<F>(&self, write: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                let spawned = handle.spawn(task);
                let mut pending = lock(&self.pending);
                pending.retain(|h| !h.is_finished());
                pending.push(spawned);
            }
            Err(_) => debug!(write, "no async runtime; durable write skipped"),
        }
    }
}

async fn restore_from_durable(
    cache: &dyn ProgressCache,
    durable: &DurableStore,
    config: &ProgressConfig,
) -> ProgressRecord {
    let Some(record) = durable.get_progress(&config.catalog).await else {
        return ProgressRecord::default();
    };
    info!(badges = record.badge_count(), "restored progress from durable store");
    if let Err(error) = schema::save_progress(cache, &record) {
        warn!(%error, "could not write restored progress back to the cache");
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quest_core::Clock;
    use quest_core::model::{MAX_SEEN, Slot};
    use quest_core::random::FixedPick;
    use quest_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, Storage};
    use storage::{CacheError, MemoryCache, PROGRESS_CACHE_KEY};

    struct BrokenCache;

    impl ProgressCache for BrokenCache {
        fn read(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("quota exceeded".into()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("quota exceeded".into()))
        }
    }

    fn config() -> ProgressConfig {
        ProgressConfig::default()
            .with_clock(Clock::fixed(fixed_now()))
            .with_utc_offset(chrono::FixedOffset::east_opt(0).unwrap())
    }

    async fn service_with(cache: Arc<dyn ProgressCache>, repo: &InMemoryRepository) -> ProgressService {
        let durable = DurableStore::from_storage(Storage::from_repository(repo.clone()));
        ProgressService::open(config(), cache, durable)
            .await
            .with_random(FixedPick(0))
    }

    fn owned(ids: &[&str]) -> ProgressRecord {
        let mut record = ProgressRecord::default();
        for id in ids {
            record.badges.insert(BadgeId::new(*id));
        }
        record
    }

    #[tokio::test]
    async fn open_prefers_cache_blob() {
        let blob = serde_json_blob(&owned(&["chaos_eyes"]));
        let cache = Arc::new(MemoryCache::new().with_entry(PROGRESS_CACHE_KEY, blob));
        let repo = InMemoryRepository::new();
        repo.put_raw_snapshot(serde_json_blob(&owned(&["gravity_boots"])))
            .unwrap();

        let service = service_with(cache, &repo).await;

        assert!(service.progress().owns(&BadgeId::new("chaos_eyes")));
        assert!(!service.progress().owns(&BadgeId::new("gravity_boots")));
    }

    #[tokio::test]
    async fn open_restores_durable_snapshot_into_empty_cache() {
        let cache = Arc::new(MemoryCache::new());
        let repo = InMemoryRepository::new();
        repo.put_raw_snapshot(serde_json_blob(&owned(&["gravity_boots"])))
            .unwrap();

        let service = service_with(cache.clone(), &repo).await;

        assert!(service.progress().owns(&BadgeId::new("gravity_boots")));
        assert!(cache.read(PROGRESS_CACHE_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_cache_resets_without_consulting_durable() {
        let cache = Arc::new(MemoryCache::new().with_entry(PROGRESS_CACHE_KEY, "{oops"));
        let repo = InMemoryRepository::new();
        repo.put_raw_snapshot(serde_json_blob(&owned(&["gravity_boots"])))
            .unwrap();

        let service = service_with(cache, &repo).await;

        assert_eq!(service.progress(), ProgressRecord::default());
    }

    #[tokio::test]
    async fn update_writes_cache_then_durable() {
        let cache = Arc::new(MemoryCache::new());
        let repo = InMemoryRepository::new();
        let service = service_with(cache.clone(), &repo).await;

        let next = service.update_progress(|prev| ProgressRecord {
            streak_days: 3,
            ..prev.clone()
        });
        assert!(cache.read(PROGRESS_CACHE_KEY).unwrap().unwrap().contains("\"streakDays\":3"));

        service.flush().await;
        let durable = DurableStore::from_storage(Storage::from_repository(repo));
        assert_eq!(durable.get_progress(&BadgeCatalog::standard()).await, Some(next));
    }

    #[tokio::test]
    async fn level_rises_once_even_for_many_badges() {
        let service = service_with(Arc::new(MemoryCache::new()), &InMemoryRepository::new()).await;
        let all: Vec<&str> = BadgeCatalog::standard().iter().map(|b| b.id).collect();

        let next = service.update_progress(|prev| {
            let mut next = prev.clone();
            next.badges = owned(&all).badges;
            next.level = 40;
            next
        });

        assert_eq!(next.badge_count(), 15);
        assert_eq!(next.level, 2);
    }

    #[tokio::test]
    async fn update_drops_unknown_badges_and_caps_seen() {
        let service = service_with(Arc::new(MemoryCache::new()), &InMemoryRepository::new()).await;

        let next = service.update_progress(|prev| {
            let mut next = prev.clone();
            next.badges.insert(BadgeId::new("not_a_badge"));
            next.seen_problem_ids = (0..MAX_SEEN + 7)
                .map(|i| ExerciseId::new(format!("ex-{i}")))
                .collect();
            next
        });

        assert!(next.badges.is_empty());
        assert_eq!(next.seen_problem_ids.len(), MAX_SEEN);
        assert_eq!(next.seen_problem_ids[0], ExerciseId::new("ex-7"));
    }

    #[tokio::test]
    async fn cache_failure_keeps_in_memory_record() {
        let service = service_with(Arc::new(BrokenCache), &InMemoryRepository::new()).await;

        let next = service.update_progress(|prev| ProgressRecord {
            total_sessions: 9,
            ..prev.clone()
        });

        assert_eq!(next.total_sessions, 9);
        assert_eq!(service.progress().total_sessions, 9);
    }

    #[tokio::test]
    async fn equip_toggles_and_rejects_unowned() {
        let blob = serde_json_blob(&owned(&["night_owl_crown"]));
        let cache = Arc::new(MemoryCache::new().with_entry(PROGRESS_CACHE_KEY, blob));
        let service = service_with(cache, &InMemoryRepository::new()).await;
        let crown = BadgeId::new("night_owl_crown");

        let worn = service.equip(&crown);
        assert_eq!(worn.equipped_badges.head(), Some(&crown));

        let bare = service.equip(&crown);
        assert!(bare.equipped_badges.is_empty());

        let untouched = service.equip(&BadgeId::new("alien_theorem_hat"));
        assert!(untouched.equipped_badges.is_empty());
    }

    #[tokio::test]
    async fn unequip_clears_body_slot() {
        let blob = serde_json_blob(&owned(&["gravity_boots", "nebula_coat"]));
        let cache = Arc::new(MemoryCache::new().with_entry(PROGRESS_CACHE_KEY, blob));
        let service = service_with(cache, &InMemoryRepository::new()).await;
        let boots = BadgeId::new("gravity_boots");
        let coat = BadgeId::new("nebula_coat");

        service.equip(&boots);
        service.equip(&coat);
        let next = service.unequip(&boots);

        assert!(!next.equipped_badges.is_worn(&boots));
        assert!(next.equipped_badges.is_worn(&coat));
        assert!(next.equipped_badges.worn().all(|(slot, _)| slot == Slot::Body));
    }

    #[tokio::test]
    async fn record_answer_tracks_solved_and_durable_counters() {
        let repo = InMemoryRepository::new();
        let service = service_with(Arc::new(MemoryCache::new()), &repo).await;
        let exercise = ExerciseRef::new("frac-3", Category::Fractions);

        service.mark_asked(std::slice::from_ref(&exercise));
        service.flush().await;
        let wrong = service.record_answer(&exercise, false);
        assert_eq!(wrong.solved_in(Category::Fractions), 0);
        let right = service.record_answer(&exercise, true);
        service.flush().await;

        assert_eq!(right.solved_in(Category::Fractions), 1);
        assert_eq!(right.seen_problem_ids, vec![exercise.id.clone()]);

        let stats = service.problem_progress(&exercise.id).await.unwrap();
        assert_eq!(stats.asked_count, 1);
        assert_eq!(stats.correct_count, 1);
        assert_eq!(stats.incorrect_count, 1);
        assert_eq!(service.problem_progress_in(Category::Fractions).await.len(), 1);
    }

    #[tokio::test]
    async fn record_session_reports_outcome() {
        let service = service_with(Arc::new(MemoryCache::new()), &InMemoryRepository::new()).await;
        let ended = fixed_now();
        let session = SessionStats::new(
            Category::Addition,
            ended - Duration::minutes(2),
            ended,
            5,
            5,
            0,
        )
        .with_avg_answer_time(3.0);

        let outcome = service.record_session(&session);

        assert!(!outcome.new_badges.is_empty());
        assert!(!outcome.guaranteed);
        assert_eq!(outcome.progress.total_sessions, 1);
        assert_eq!(outcome.progress.streak_days, 1);
        assert!(!outcome.collection_complete);
        assert_eq!(service.progress(), outcome.progress);
    }

    #[tokio::test]
    async fn updater_can_read_current_progress() {
        let service = service_with(Arc::new(MemoryCache::new()), &InMemoryRepository::new()).await;
        service.update_progress(|prev| ProgressRecord {
            total_sessions: 2,
            ..prev.clone()
        });

        let next = service.update_progress(|prev| {
            let seen = service.progress();
            assert_eq!(&seen, prev);
            ProgressRecord {
                total_sessions: seen.total_sessions + 1,
                ..prev.clone()
            }
        });

        assert_eq!(next.total_sessions, 3);
        assert_eq!(service.progress().total_sessions, 3);
    }

    #[test]
    fn updates_work_without_a_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let service = runtime.block_on(ProgressService::open(
            config(),
            Arc::new(MemoryCache::new()),
            DurableStore::disabled(),
        ));

        let next = service.update_progress(|prev| ProgressRecord {
            streak_days: 2,
            ..prev.clone()
        });
        service.mark_asked(&[ExerciseRef::new("add-1", Category::Addition)]);

        assert_eq!(next.streak_days, 2);
    }

    fn serde_json_blob(record: &ProgressRecord) -> String {
        serde_json::to_string(record).unwrap()
    }
}
