use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{BadgeCatalog, BadgeId, Category, ExerciseId, Loadout};

/// Most recent exercise ids remembered to avoid repeats.
pub const MAX_SEEN: usize = 200;

/// Owned-badge count that makes one level.
pub const BADGES_PER_LEVEL: usize = 5;

/// Everything the engine knows about one learner.
///
/// Mutated only through `ProgressService::update_progress`, which pairs the
/// read of the current record with the write of the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub badges: BTreeSet<BadgeId>,
    pub level: u32,
    /// Solved counts keyed by `Category::key()`. Legacy keys are kept as-is.
    pub completed_categories: BTreeMap<String, u32>,
    /// Oldest first.
    pub seen_problem_ids: Vec<ExerciseId>,
    #[serde(default)]
    pub equipped_badges: Loadout,

    // Session meta, written only by the evaluator.
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_session_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session_accuracy: Option<f64>,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session_date: Option<NaiveDate>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        let mut record = Self {
            badges: BTreeSet::new(),
            level: 1,
            completed_categories: BTreeMap::new(),
            seen_problem_ids: Vec::new(),
            equipped_badges: Loadout::default(),
            total_sessions: 0,
            last_session_at: None,
            last_session_accuracy: None,
            streak_days: 0,
            last_session_date: None,
        };
        record.fill_missing_categories();
        record
    }
}

impl ProgressRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owns(&self, id: &BadgeId) -> bool {
        self.badges.contains(id)
    }

    #[must_use]
    pub fn badge_count(&self) -> usize {
        self.badges.len()
    }

    #[must_use]
    pub fn solved_in(&self, category: Category) -> u32 {
        self.completed_categories
            .get(category.key())
            .copied()
            .unwrap_or(0)
    }

    /// Inserts a zero count for every known category that has none.
    /// Returns the number of keys added.
    pub fn fill_missing_categories(&mut self) -> usize {
        let mut added = 0;
        for category in Category::ALL {
            self.completed_categories
                .entry(category.key().to_owned())
                .or_insert_with(|| {
                    added += 1;
                    0
                });
        }
        added
    }

    /// Drops the oldest seen ids until at most `MAX_SEEN` remain.
    /// Returns how many were evicted.
    pub fn enforce_seen_cap(&mut self) -> usize {
        let excess = self.seen_problem_ids.len().saturating_sub(MAX_SEEN);
        if excess > 0 {
            self.seen_problem_ids.drain(..excess);
        }
        excess
    }

    /// Record a correctly solved exercise: remember it as seen (once) and
    /// bump the category's solved count.
    #[must_use]
    pub fn with_solved(mut self, exercise: &ExerciseId, category: Category) -> Self {
        if !self.seen_problem_ids.contains(exercise) {
            self.seen_problem_ids.push(exercise.clone());
        }
        let count = self
            .completed_categories
            .entry(category.key().to_owned())
            .or_insert(0);
        *count = count.saturating_add(1);
        self
    }

    /// Toggle `id` in its catalog slot.
    ///
    /// Unowned or unknown badges leave the record unchanged.
    #[must_use]
    pub fn equip(&self, id: &BadgeId, catalog: &BadgeCatalog) -> Self {
        let mut next = self.clone();
        let Some(badge) = catalog.get(id.as_str()) else {
            return next;
        };
        if !self.owns(id) {
            return next;
        }
        next.equipped_badges.toggle(badge.slot, id.clone());
        next
    }

    #[must_use]
    pub fn unequip(&self, id: &BadgeId) -> Self {
        let mut next = self.clone();
        next.equipped_badges.remove(id);
        next
    }

    /// Clears worn ids that are not owned.
    pub fn drop_unowned_equipped(&mut self) {
        let owned = &self.badges;
        self.equipped_badges.retain(|_, id| owned.contains(id));
    }
}

/// Level after a badge-count change: one step up when the count enters a
/// new multiple of `BADGES_PER_LEVEL`, never more than one per update.
#[must_use]
pub fn level_after(level: u32, before_count: usize, after_count: usize) -> u32 {
    if after_count / BADGES_PER_LEVEL > before_count / BADGES_PER_LEVEL {
        level.saturating_add(1)
    } else {
        level
    }
}
