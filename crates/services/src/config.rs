use chrono::FixedOffset;

use quest_core::evaluator::UnlockThresholds;
use quest_core::model::BadgeCatalog;
use quest_core::time::{Clock, local_offset};

/// Everything the progress service needs besides its stores.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub catalog: BadgeCatalog,
    pub thresholds: UnlockThresholds,
    /// Offset used to decide "today" and the hour of day for a round.
    pub utc_offset: FixedOffset,
    pub clock: Clock,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            catalog: BadgeCatalog::standard(),
            thresholds: UnlockThresholds::default(),
            utc_offset: local_offset(),
            clock: Clock::default(),
        }
    }
}

impl ProgressConfig {
    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: UnlockThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}
