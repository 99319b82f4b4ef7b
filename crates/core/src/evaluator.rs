//! Badge unlock rules applied when a practice round ends.
//!
//! Evaluation is pure apart from the injected `RandomSource` used by the
//! guarantee path. "Today" and the hour of day are derived from the round's
//! end time in the evaluator's UTC offset, so a pinned offset plus fixed
//! timestamps make every rule deterministic.

use chrono::{FixedOffset, NaiveDate, Timelike};
use std::collections::BTreeSet;
use tracing::debug;

use crate::model::{BadgeCatalog, BadgeId, Category, ProgressRecord, SessionStats, StuffyBadge};
use crate::random::RandomSource;
use crate::time::{day_key, days_between};

//
// ─── THRESHOLDS ────────────────────────────────────────────────────────────────
//

/// Numeric knobs of the unlock rules. `Default` matches the standard catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockThresholds {
    /// Rounds 1..=N count as "first few".
    pub first_sessions_max: u32,
    pub long_session_minutes: f64,
    pub focused_session_minutes: f64,
    /// Night window start hour (inclusive), local time.
    pub night_start_hour: u32,
    /// Night window end hour (exclusive), local time.
    pub night_end_hour: u32,
    pub chaos_min_mistakes: u32,
    pub chaos_min_accuracy: f64,
    pub recovery_max_previous: f64,
    pub recovery_min_gain: f64,
    pub high_accuracy: f64,
    pub high_accuracy_min_questions: u32,
    pub streak_short_days: u32,
    pub streak_long_days: u32,
    pub notebook_sessions: u32,
    pub speed_max_seconds: f64,
    pub category_volume: u32,
    pub improvement_max_previous: f64,
    pub improvement_min_current: f64,
    pub improvement_min_sessions: u32,
    pub mastery_accuracy: f64,
    pub mastery_min_questions: u32,
    /// Grant a random unowned badge when no rule fired.
    pub guarantee_reward: bool,
}

impl Default for UnlockThresholds {
    fn default() -> Self {
        Self {
            first_sessions_max: 5,
            long_session_minutes: 5.0,
            focused_session_minutes: 10.0,
            night_start_hour: 21,
            night_end_hour: 5,
            chaos_min_mistakes: 2,
            chaos_min_accuracy: 0.6,
            recovery_max_previous: 0.4,
            recovery_min_gain: 0.2,
            high_accuracy: 0.9,
            high_accuracy_min_questions: 5,
            streak_short_days: 7,
            streak_long_days: 14,
            notebook_sessions: 10,
            speed_max_seconds: 4.0,
            category_volume: 50,
            improvement_max_previous: 0.6,
            improvement_min_current: 0.9,
            improvement_min_sessions: 8,
            mastery_accuracy: 0.95,
            mastery_min_questions: 8,
            guarantee_reward: true,
        }
    }
}

impl UnlockThresholds {
    fn is_night(&self, hour: u32) -> bool {
        if self.night_start_hour <= self.night_end_hour {
            (self.night_start_hour..self.night_end_hour).contains(&hour)
        } else {
            hour >= self.night_start_hour || hour < self.night_end_hour
        }
    }
}

//
// ─── RULES ─────────────────────────────────────────────────────────────────────
//

/// Quantities every rule may look at, computed once per evaluation.
struct RuleInput<'a> {
    session: &'a SessionStats,
    prev: &'a ProgressRecord,
    limits: &'a UnlockThresholds,
    total_questions: u32,
    accuracy: f64,
    duration_minutes: f64,
    hour: u32,
    streak_days: u32,
    total_sessions: u32,
}

impl RuleInput<'_> {
    fn high_accuracy_round(&self) -> bool {
        self.accuracy >= self.limits.high_accuracy
            && self.total_questions >= self.limits.high_accuracy_min_questions
    }
}

struct UnlockRule {
    badge: &'static str,
    fires: fn(&RuleInput<'_>) -> bool,
}

const RULES: &[UnlockRule] = &[
    UnlockRule {
        badge: "milk_teeth_medal",
        fires: |r| (1..=r.limits.first_sessions_max).contains(&r.total_sessions),
    },
    UnlockRule {
        badge: "brain_melt_marshmallow_lv1",
        fires: |r| r.duration_minutes >= r.limits.long_session_minutes,
    },
    UnlockRule {
        badge: "night_owl_crown",
        fires: |r| r.limits.is_night(r.hour),
    },
    UnlockRule {
        badge: "chaos_eyes",
        fires: |r| {
            r.session.incorrect() >= r.limits.chaos_min_mistakes
                && r.accuracy >= r.limits.chaos_min_accuracy
        },
    },
    UnlockRule {
        badge: "oopsie_bandage",
        fires: |r| {
            r.prev.last_session_accuracy.is_some_and(|last| {
                last <= r.limits.recovery_max_previous
                    && r.accuracy >= last + r.limits.recovery_min_gain
            })
        },
    },
    UnlockRule {
        badge: "slice_and_dice_halo",
        fires: |r| {
            r.session.category() == Category::Fractions && r.high_accuracy_round()
        },
    },
    UnlockRule {
        badge: "shadow_study_buddy",
        fires: |r| r.streak_days >= r.limits.streak_short_days,
    },
    UnlockRule {
        badge: "starlight_goggles",
        fires: |r| r.high_accuracy_round(),
    },
    UnlockRule {
        badge: "orbiting_notebook",
        fires: |r| r.total_sessions >= r.limits.notebook_sessions,
    },
    UnlockRule {
        badge: "gravity_boots",
        fires: |r| r.duration_minutes >= r.limits.focused_session_minutes,
    },
    UnlockRule {
        badge: "quantum_pocket_watch",
        fires: |r| {
            r.session
                .avg_answer_time_seconds()
                .is_some_and(|secs| secs <= r.limits.speed_max_seconds)
                && r.high_accuracy_round()
        },
    },
    UnlockRule {
        badge: "nebula_coat",
        fires: |r| r.prev.solved_in(r.session.category()) >= r.limits.category_volume,
    },
    UnlockRule {
        badge: "black_hole_backpack",
        fires: |r| {
            // A previous score of exactly zero does not count as a starting point.
            r.prev
                .last_session_accuracy
                .is_some_and(|last| last > 0.0 && last <= r.limits.improvement_max_previous)
                && r.accuracy >= r.limits.improvement_min_current
                && r.total_sessions >= r.limits.improvement_min_sessions
        },
    },
    UnlockRule {
        badge: "comet_tail_aura",
        fires: |r| r.streak_days >= r.limits.streak_long_days,
    },
    UnlockRule {
        badge: "alien_theorem_hat",
        fires: |r| {
            r.accuracy >= r.limits.mastery_accuracy
                && r.total_questions >= r.limits.mastery_min_questions
        },
    },
];

//
// ─── EVALUATION ────────────────────────────────────────────────────────────────
//

/// Result of evaluating one round.
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeAward {
    /// Newly unlocked badges in unlock order.
    pub new_badges: Vec<&'static StuffyBadge>,
    /// `prev` with badges and session meta updated. `level` is untouched.
    pub next: ProgressRecord,
    /// True when the only new badge came from the guarantee path.
    pub guaranteed: bool,
}

/// Applies the unlock rules of a catalog.
#[derive(Debug, Clone)]
pub struct BadgeEvaluator {
    catalog: BadgeCatalog,
    thresholds: UnlockThresholds,
    offset: FixedOffset,
}

impl BadgeEvaluator {
    #[must_use]
    pub fn new(catalog: BadgeCatalog, thresholds: UnlockThresholds, offset: FixedOffset) -> Self {
        Self {
            catalog,
            thresholds,
            offset,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &BadgeCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn thresholds(&self) -> &UnlockThresholds {
        &self.thresholds
    }

    /// Compute the badges a finished round unlocks and the record after it.
    pub fn evaluate(
        &self,
        prev: &ProgressRecord,
        session: &SessionStats,
        random: &mut dyn RandomSource,
    ) -> BadgeAward {
        let local_end = session.ended_at().with_timezone(&self.offset);
        let today = local_end.date_naive();
        let streak_days = next_streak(prev.last_session_date, prev.streak_days, today);
        let total_sessions = prev.total_sessions.saturating_add(1);

        let input = RuleInput {
            session,
            prev,
            limits: &self.thresholds,
            total_questions: session.total_questions(),
            accuracy: session.accuracy(),
            duration_minutes: session.duration_minutes(),
            hour: local_end.hour(),
            streak_days,
            total_sessions,
        };

        let mut owned = prev.badges.clone();
        let mut new_badges = Vec::new();
        for rule in RULES {
            if (rule.fires)(&input) {
                self.unlock(rule.badge, &mut owned, &mut new_badges);
            }
        }

        let mut guaranteed = false;
        if new_badges.is_empty() && self.thresholds.guarantee_reward {
            if let Some(bonus) = self.pick_unowned(&owned, random) {
                debug!(badge = bonus.id, "guarantee path granted badge");
                owned.insert(bonus.badge_id());
                new_badges.push(bonus);
                guaranteed = true;
            }
        }

        let next = ProgressRecord {
            badges: owned,
            total_sessions,
            last_session_at: Some(session.ended_at()),
            last_session_accuracy: Some(input.accuracy),
            streak_days,
            last_session_date: Some(day_key(session.ended_at(), self.offset)),
            ..prev.clone()
        };

        BadgeAward {
            new_badges,
            next,
            guaranteed,
        }
    }

    /// Adds `id` to `owned` and `new_badges` unless already owned or unknown.
    fn unlock(
        &self,
        id: &str,
        owned: &mut BTreeSet<BadgeId>,
        new_badges: &mut Vec<&'static StuffyBadge>,
    ) {
        let Some(badge) = self.catalog.get(id) else {
            return;
        };
        if owned.insert(badge.badge_id()) {
            debug!(badge = badge.id, "rule unlocked badge");
            new_badges.push(badge);
        }
    }

    fn pick_unowned(
        &self,
        owned: &BTreeSet<BadgeId>,
        random: &mut dyn RandomSource,
    ) -> Option<&'static StuffyBadge> {
        let available = self.catalog.unowned(owned);
        if available.is_empty() {
            return None;
        }
        let index = random.pick_index(available.len()).min(available.len() - 1);
        Some(available[index])
    }
}

/// Streak after a round ending on `today`.
///
/// Same day keeps the streak, the next day extends it, anything else
/// (gaps or a clock that went backwards) starts over at one.
#[must_use]
pub fn next_streak(last_date: Option<NaiveDate>, streak: u32, today: NaiveDate) -> u32 {
    match last_date {
        None => 1,
        Some(last) if last == today => streak,
        Some(last) if days_between(last, today) == 1 => streak.saturating_add(1),
        Some(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::FixedPick;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn evaluator() -> BadgeEvaluator {
        BadgeEvaluator::new(
            BadgeCatalog::standard(),
            UnlockThresholds::default(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    fn round(category: Category, questions: u32, correct: u32, incorrect: u32) -> SessionStats {
        SessionStats::new(
            category,
            noon() - Duration::minutes(2),
            noon(),
            questions,
            correct,
            incorrect,
        )
    }

    fn ids(award: &BadgeAward) -> Vec<&'static str> {
        award.new_badges.iter().map(|b| b.id).collect()
    }

    #[test]
    fn first_perfect_fast_round_unlocks_several() {
        let prev = ProgressRecord::default();
        let session = round(Category::Addition, 5, 5, 0).with_avg_answer_time(3.0);

        let award = evaluator().evaluate(&prev, &session, &mut FixedPick(0));

        assert_eq!(
            ids(&award),
            vec!["milk_teeth_medal", "starlight_goggles", "quantum_pocket_watch"]
        );
        assert!(!award.guaranteed);
        assert_eq!(award.next.total_sessions, 1);
        assert_eq!(award.next.streak_days, 1);
        assert_eq!(award.next.level, prev.level);
        assert_eq!(award.next.badges.len(), 3);
    }

    #[test]
    fn streak_extends_from_yesterday_and_unlocks_week_badge() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 20;
        prev.streak_days = 6;
        prev.last_session_date = Some(noon().date_naive() - Duration::days(1));

        let award = evaluator().evaluate(&prev, &round(Category::Addition, 5, 3, 2), &mut FixedPick(0));

        assert_eq!(award.next.streak_days, 7);
        assert!(ids(&award).contains(&"shadow_study_buddy"));
    }

    #[test]
    fn mistakes_with_passing_accuracy_unlock_chaos_eyes() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 20;

        let at_boundary = evaluator().evaluate(&prev, &round(Category::Addition, 5, 3, 2), &mut FixedPick(0));
        assert!(ids(&at_boundary).contains(&"chaos_eyes"));

        let below = evaluator().evaluate(&prev, &round(Category::Addition, 5, 2, 3), &mut FixedPick(0));
        assert!(!ids(&below).contains(&"chaos_eyes"));

        let one_mistake = evaluator().evaluate(&prev, &round(Category::Addition, 5, 4, 1), &mut FixedPick(0));
        assert!(!ids(&one_mistake).contains(&"chaos_eyes"));
    }

    #[test]
    fn fortnight_streak_unlocks_comet_tail() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 20;
        prev.last_session_date = Some(noon().date_naive() - Duration::days(1));

        prev.streak_days = 12;
        let short = evaluator().evaluate(&prev, &round(Category::Addition, 5, 3, 2), &mut FixedPick(0));
        assert_eq!(short.next.streak_days, 13);
        assert!(!ids(&short).contains(&"comet_tail_aura"));

        prev.streak_days = 13;
        let long = evaluator().evaluate(&prev, &round(Category::Addition, 5, 3, 2), &mut FixedPick(0));
        assert_eq!(long.next.streak_days, 14);
        assert!(ids(&long).contains(&"comet_tail_aura"));
        assert!(ids(&long).contains(&"shadow_study_buddy"));
    }

    #[test]
    fn improvement_needs_a_nonzero_previous_score() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 7;
        prev.last_session_accuracy = Some(0.0);
        let session = round(Category::Subtraction, 10, 10, 0);

        let from_zero = evaluator().evaluate(&prev, &session, &mut FixedPick(0));
        assert!(ids(&from_zero).contains(&"oopsie_bandage"));
        assert!(!ids(&from_zero).contains(&"black_hole_backpack"));

        prev.last_session_accuracy = Some(0.5);
        let from_half = evaluator().evaluate(&prev, &session, &mut FixedPick(0));
        assert!(ids(&from_half).contains(&"black_hole_backpack"));

        prev.last_session_accuracy = None;
        let first = evaluator().evaluate(&prev, &session, &mut FixedPick(0));
        assert!(!ids(&first).contains(&"black_hole_backpack"));
    }

    #[test]
    fn second_round_same_day_keeps_streak() {
        let mut prev = ProgressRecord::default();
        prev.streak_days = 4;
        prev.last_session_date = Some(noon().date_naive());

        let award = evaluator().evaluate(&prev, &round(Category::Addition, 5, 5, 0), &mut FixedPick(0));
        assert_eq!(award.next.streak_days, 4);
    }

    #[test]
    fn gap_or_skew_resets_streak() {
        let today = noon().date_naive();
        assert_eq!(next_streak(Some(today - Duration::days(3)), 9, today), 1);
        assert_eq!(next_streak(Some(today + Duration::days(1)), 9, today), 1);
        assert_eq!(next_streak(None, 9, today), 1);
    }

    #[test]
    fn zero_accuracy_round_gets_exactly_one_guaranteed_badge() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 5;

        let award = evaluator().evaluate(&prev, &round(Category::Division, 3, 0, 3), &mut FixedPick(2));

        assert_eq!(award.new_badges.len(), 1);
        assert!(award.guaranteed);
        assert_eq!(award.new_badges[0].id, "night_owl_crown");
        assert!(award.next.owns(&BadgeId::new("night_owl_crown")));
    }

    #[test]
    fn guarantee_can_be_disabled() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 5;
        let thresholds = UnlockThresholds {
            guarantee_reward: false,
            ..UnlockThresholds::default()
        };
        let evaluator = BadgeEvaluator::new(
            BadgeCatalog::standard(),
            thresholds,
            FixedOffset::east_opt(0).unwrap(),
        );

        let award = evaluator.evaluate(&prev, &round(Category::Division, 3, 0, 3), &mut FixedPick(0));
        assert!(award.new_badges.is_empty());
    }

    #[test]
    fn full_collection_gets_nothing_more() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 5;
        prev.badges = BadgeCatalog::standard().iter().map(StuffyBadge::badge_id).collect();

        let award = evaluator().evaluate(&prev, &round(Category::Division, 3, 0, 3), &mut FixedPick(0));
        assert!(award.new_badges.is_empty());
        assert_eq!(award.next.badges, prev.badges);
    }

    #[test]
    fn night_window_uses_local_offset() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 5;
        // 12:00 UTC is 22:00 at +10:00.
        let evaluator = BadgeEvaluator::new(
            BadgeCatalog::standard(),
            UnlockThresholds::default(),
            FixedOffset::east_opt(10 * 3600).unwrap(),
        );

        let award = evaluator.evaluate(&prev, &round(Category::Addition, 5, 3, 0), &mut FixedPick(0));
        assert_eq!(ids(&award), vec!["night_owl_crown"]);
    }

    #[test]
    fn recovery_and_category_rules() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 30;
        prev.last_session_accuracy = Some(0.3);
        prev.completed_categories
            .insert(Category::Fractions.key().to_owned(), 50);

        let award = evaluator().evaluate(&prev, &round(Category::Fractions, 10, 10, 0), &mut FixedPick(0));
        let unlocked = ids(&award);

        for expected in [
            "oopsie_bandage",
            "slice_and_dice_halo",
            "starlight_goggles",
            "nebula_coat",
            "orbiting_notebook",
            "black_hole_backpack",
            "alien_theorem_hat",
        ] {
            assert!(unlocked.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn owned_badges_are_not_reawarded() {
        let mut prev = ProgressRecord::default();
        prev.badges.insert(BadgeId::new("milk_teeth_medal"));
        let session = round(Category::Addition, 5, 5, 0);

        let award = evaluator().evaluate(&prev, &session, &mut FixedPick(0));
        assert!(!ids(&award).contains(&"milk_teeth_medal"));
        assert!(ids(&award).contains(&"starlight_goggles"));
    }

    #[test]
    fn rule_unlocks_are_repeatable() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 2;
        let session = round(Category::Subtraction, 8, 8, 0);

        let first = evaluator().evaluate(&prev, &session, &mut FixedPick(0));
        let second = evaluator().evaluate(&prev, &session, &mut FixedPick(7));
        assert_eq!(first, second);
    }

    #[test]
    fn long_round_counts_duration_tiers() {
        let mut prev = ProgressRecord::default();
        prev.total_sessions = 5;
        let session = SessionStats::new(
            Category::Estimation,
            noon() - Duration::minutes(12),
            noon(),
            5,
            2,
            3,
        );

        let award = evaluator().evaluate(&prev, &session, &mut FixedPick(0));
        assert_eq!(ids(&award), vec!["brain_melt_marshmallow_lv1", "gravity_boots"]);
    }
}
