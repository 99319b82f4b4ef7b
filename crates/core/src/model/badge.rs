use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::BadgeId;
use crate::error::Error;

/// Equip position a badge is worn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Head,
    Face,
    Aura,
    /// Two independent sub-slots, see `Loadout`.
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Themed collection a badge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeSet {
    SpookyStudy,
    GalaxyLab,
}

impl BadgeSet {
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            BadgeSet::SpookyStudy => "Spooky Study",
            BadgeSet::GalaxyLab => "Galaxy Lab",
        }
    }
}

/// A collectible stuffy badge definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StuffyBadge {
    pub id: &'static str,
    pub set: BadgeSet,
    pub name: &'static str,
    pub slot: Slot,
    pub rarity: Rarity,
    /// How the badge is earned, shown to the learner.
    pub unlock: &'static str,
}

impl StuffyBadge {
    #[must_use]
    pub const fn new(
        id: &'static str,
        set: BadgeSet,
        name: &'static str,
        slot: Slot,
        rarity: Rarity,
        unlock: &'static str,
    ) -> Self {
        Self {
            id,
            set,
            name,
            slot,
            rarity,
            unlock,
        }
    }

    #[must_use]
    pub fn badge_id(&self) -> BadgeId {
        BadgeId::new(self.id)
    }
}

/// All badges in the standard catalog.
pub const STANDARD_BADGES: &[StuffyBadge] = &[
    // Spooky Study
    StuffyBadge::new(
        "milk_teeth_medal",
        BadgeSet::SpookyStudy,
        "Milk Teeth Medal",
        Slot::Body,
        Rarity::Common,
        "Finish one of your first few rounds",
    ),
    StuffyBadge::new(
        "brain_melt_marshmallow_lv1",
        BadgeSet::SpookyStudy,
        "Brain Melt Marshmallow",
        Slot::Head,
        Rarity::Common,
        "Keep a round going for five minutes",
    ),
    StuffyBadge::new(
        "night_owl_crown",
        BadgeSet::SpookyStudy,
        "Night Owl Crown",
        Slot::Head,
        Rarity::Rare,
        "Finish a round late at night",
    ),
    StuffyBadge::new(
        "chaos_eyes",
        BadgeSet::SpookyStudy,
        "Chaos Eyes",
        Slot::Face,
        Rarity::Rare,
        "Make a few mistakes and still score well",
    ),
    StuffyBadge::new(
        "oopsie_bandage",
        BadgeSet::SpookyStudy,
        "Oopsie Bandage",
        Slot::Face,
        Rarity::Common,
        "Bounce back after a rough round",
    ),
    StuffyBadge::new(
        "slice_and_dice_halo",
        BadgeSet::SpookyStudy,
        "Slice & Dice Halo",
        Slot::Aura,
        Rarity::Epic,
        "Ace a fractions round",
    ),
    StuffyBadge::new(
        "shadow_study_buddy",
        BadgeSet::SpookyStudy,
        "Shadow Study Buddy",
        Slot::Body,
        Rarity::Epic,
        "Practice seven days in a row",
    ),
    // Galaxy Lab
    StuffyBadge::new(
        "starlight_goggles",
        BadgeSet::GalaxyLab,
        "Starlight Goggles",
        Slot::Face,
        Rarity::Rare,
        "Score 90% or better on a full round",
    ),
    StuffyBadge::new(
        "orbiting_notebook",
        BadgeSet::GalaxyLab,
        "Orbiting Notebook",
        Slot::Body,
        Rarity::Rare,
        "Complete ten rounds",
    ),
    StuffyBadge::new(
        "gravity_boots",
        BadgeSet::GalaxyLab,
        "Gravity Boots",
        Slot::Body,
        Rarity::Common,
        "Stay focused for ten minutes",
    ),
    StuffyBadge::new(
        "quantum_pocket_watch",
        BadgeSet::GalaxyLab,
        "Quantum Pocket Watch",
        Slot::Body,
        Rarity::Epic,
        "Answer fast and accurately",
    ),
    StuffyBadge::new(
        "nebula_coat",
        BadgeSet::GalaxyLab,
        "Nebula Coat",
        Slot::Body,
        Rarity::Rare,
        "Solve fifty problems in one category",
    ),
    StuffyBadge::new(
        "black_hole_backpack",
        BadgeSet::GalaxyLab,
        "Black Hole Backpack",
        Slot::Body,
        Rarity::Legendary,
        "Turn a shaky round into a great one later on",
    ),
    StuffyBadge::new(
        "comet_tail_aura",
        BadgeSet::GalaxyLab,
        "Comet Tail Aura",
        Slot::Aura,
        Rarity::Legendary,
        "Practice fourteen days in a row",
    ),
    StuffyBadge::new(
        "alien_theorem_hat",
        BadgeSet::GalaxyLab,
        "Alien Theorem Hat",
        Slot::Head,
        Rarity::Epic,
        "Score 95% or better on a long round",
    ),
];

/// Read-only view over a fixed list of badges.
///
/// The engine never adds or removes entries; it only tracks ownership by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeCatalog {
    badges: &'static [StuffyBadge],
}

impl Default for BadgeCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl BadgeCatalog {
    #[must_use]
    pub const fn new(badges: &'static [StuffyBadge]) -> Self {
        Self { badges }
    }

    #[must_use]
    pub const fn standard() -> Self {
        Self::new(STANDARD_BADGES)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&'static StuffyBadge> {
        self.badges.iter().find(|b| b.id == id)
    }

    /// Like [`BadgeCatalog::get`] but reports unknown ids as an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownBadge` if `id` is not in the catalog.
    pub fn require(&self, id: &str) -> Result<&'static StuffyBadge, Error> {
        self.get(id).ok_or_else(|| Error::UnknownBadge(id.to_owned()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'static, StuffyBadge> {
        self.badges.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.badges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }

    #[must_use]
    pub fn by_set(&self, set: BadgeSet) -> Vec<&'static StuffyBadge> {
        self.badges.iter().filter(|b| b.set == set).collect()
    }

    /// Badges not present in `owned`, in catalog order.
    #[must_use]
    pub fn unowned(&self, owned: &BTreeSet<BadgeId>) -> Vec<&'static StuffyBadge> {
        self.badges
            .iter()
            .filter(|b| !owned.contains(&b.badge_id()))
            .collect()
    }
}
