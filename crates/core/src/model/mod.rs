mod badge;
mod category;
mod ids;
mod loadout;
mod progress;
mod session;

pub use badge::{BadgeCatalog, BadgeSet, Rarity, STANDARD_BADGES, Slot, StuffyBadge};
pub use category::{Category, ParseCategoryError};
pub use ids::{BadgeId, ExerciseId, ParseIdError};
pub use loadout::Loadout;
pub use progress::{BADGES_PER_LEVEL, MAX_SEEN, ProgressRecord, level_after};
pub use session::{SessionStats, SessionTally};

/// Reference to an exercise from the problem pool, as far as tracking needs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExerciseRef {
    pub id: ExerciseId,
    pub category: Category,
}

impl ExerciseRef {
    #[must_use]
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: ExerciseId::new(id),
            category,
        }
    }
}
