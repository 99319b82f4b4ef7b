use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Category;

/// Immutable summary of one completed practice round.
///
/// `correct + incorrect` may be below `questions` when a round ends early,
/// and `questions` may be zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    category: Category,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    ended_at: DateTime<Utc>,
    questions: u32,
    correct: u32,
    incorrect: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avg_answer_time_seconds: Option<f64>,
}

impl SessionStats {
    #[must_use]
    pub fn new(
        category: Category,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        questions: u32,
        correct: u32,
        incorrect: u32,
    ) -> Self {
        Self {
            category,
            started_at,
            ended_at,
            questions,
            correct,
            incorrect,
            avg_answer_time_seconds: None,
        }
    }

    #[must_use]
    pub fn with_avg_answer_time(mut self, seconds: f64) -> Self {
        self.avg_answer_time_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    #[must_use]
    pub fn questions(&self) -> u32 {
        self.questions
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn incorrect(&self) -> u32 {
        self.incorrect
    }

    #[must_use]
    pub fn avg_answer_time_seconds(&self) -> Option<f64> {
        self.avg_answer_time_seconds
    }

    /// Larger of the planned question count and the answers actually given.
    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.questions
            .max(self.correct.saturating_add(self.incorrect))
    }

    /// Share of `total_questions` answered correctly; 0 for an empty round.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        match self.total_questions() {
            0 => 0.0,
            total => f64::from(self.correct) / f64::from(total),
        }
    }

    /// Wall time of the round. Negative if the clock went backwards.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_minutes(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 60_000.0
    }
}

/// Running counts for a round in progress.
#[derive(Debug, Clone)]
pub struct SessionTally {
    category: Category,
    started_at: DateTime<Utc>,
    planned_questions: u32,
    correct: u32,
    incorrect: u32,
    timed_correct: u32,
    correct_latency: Duration,
}

impl SessionTally {
    #[must_use]
    pub fn start(category: Category, started_at: DateTime<Utc>, planned_questions: u32) -> Self {
        Self {
            category,
            started_at,
            planned_questions,
            correct: 0,
            incorrect: 0,
            timed_correct: 0,
            correct_latency: Duration::zero(),
        }
    }

    /// Count one answer. Only correct answers contribute to the latency mean.
    pub fn record_answer(&mut self, is_correct: bool, latency: Option<Duration>) {
        if !is_correct {
            self.incorrect = self.incorrect.saturating_add(1);
            return;
        }
        self.correct = self.correct.saturating_add(1);
        if let Some(latency) = latency {
            self.correct_latency += latency;
            self.timed_correct = self.timed_correct.saturating_add(1);
        }
    }

    #[must_use]
    pub fn answered(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(&self, ended_at: DateTime<Utc>) -> SessionStats {
        let stats = SessionStats::new(
            self.category,
            self.started_at,
            ended_at,
            self.planned_questions,
            self.correct,
            self.incorrect,
        );
        if self.timed_correct == 0 {
            return stats;
        }
        let mean_ms = self.correct_latency.num_milliseconds() as f64 / f64::from(self.timed_correct);
        stats.with_avg_answer_time(mean_ms / 1000.0)
    }
}
