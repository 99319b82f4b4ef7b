use serde::{Deserialize, Serialize};

use super::{BadgeId, Slot};

/// Badges currently worn, one per slot except the two body sub-slots.
///
/// Persisted as a map keyed by position name (`head`, `face`, `aura`,
/// `body1`, `body2`); empty positions are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    head: Option<BadgeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    face: Option<BadgeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aura: Option<BadgeId>,
    #[serde(default, rename = "body1", skip_serializing_if = "Option::is_none")]
    body_1: Option<BadgeId>,
    #[serde(default, rename = "body2", skip_serializing_if = "Option::is_none")]
    body_2: Option<BadgeId>,
}

impl Loadout {
    #[must_use]
    pub fn head(&self) -> Option<&BadgeId> {
        self.head.as_ref()
    }

    #[must_use]
    pub fn face(&self) -> Option<&BadgeId> {
        self.face.as_ref()
    }

    #[must_use]
    pub fn aura(&self) -> Option<&BadgeId> {
        self.aura.as_ref()
    }

    #[must_use]
    pub fn body(&self) -> [Option<&BadgeId>; 2] {
        [self.body_1.as_ref(), self.body_2.as_ref()]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.worn().next().is_none()
    }

    /// Every worn id with the slot it occupies.
    pub fn worn(&self) -> impl Iterator<Item = (Slot, &BadgeId)> {
        [
            (Slot::Head, &self.head),
            (Slot::Face, &self.face),
            (Slot::Aura, &self.aura),
            (Slot::Body, &self.body_1),
            (Slot::Body, &self.body_2),
        ]
        .into_iter()
        .filter_map(|(slot, id)| id.as_ref().map(|id| (slot, id)))
    }

    #[must_use]
    pub fn is_worn(&self, id: &BadgeId) -> bool {
        self.worn().any(|(_, worn)| worn == id)
    }

    /// Puts `id` on in `slot`, or takes it off if it is already there.
    ///
    /// Single slots replace their occupant. The body fills the first free
    /// sub-slot and, when both are taken, replaces the second one.
    pub fn toggle(&mut self, slot: Slot, id: BadgeId) {
        let single = match slot {
            Slot::Head => &mut self.head,
            Slot::Face => &mut self.face,
            Slot::Aura => &mut self.aura,
            Slot::Body => {
                self.toggle_body(id);
                return;
            }
        };
        if single.as_ref() == Some(&id) {
            *single = None;
        } else {
            *single = Some(id);
        }
    }

    fn toggle_body(&mut self, id: BadgeId) {
        if self.body_1.as_ref() == Some(&id) {
            self.body_1 = None;
        } else if self.body_2.as_ref() == Some(&id) {
            self.body_2 = None;
        } else if self.body_1.is_none() {
            self.body_1 = Some(id);
        } else {
            self.body_2 = Some(id);
        }
    }

    /// Takes `id` off wherever it is worn. Returns whether anything changed.
    pub fn remove(&mut self, id: &BadgeId) -> bool {
        let before = self.clone();
        self.retain(|_, worn| worn != id);
        *self != before
    }

    /// Clears every position whose occupant fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(Slot, &BadgeId) -> bool) {
        for (slot, position) in [
            (Slot::Head, &mut self.head),
            (Slot::Face, &mut self.face),
            (Slot::Aura, &mut self.aura),
            (Slot::Body, &mut self.body_1),
            (Slot::Body, &mut self.body_2),
        ] {
            if position.as_ref().is_some_and(|id| !keep(slot, id)) {
                *position = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> BadgeId {
        BadgeId::new(s)
    }

    #[test]
    fn single_slot_toggles_and_replaces() {
        let mut loadout = Loadout::default();
        loadout.toggle(Slot::Head, id("night_owl_crown"));
        assert_eq!(loadout.head(), Some(&id("night_owl_crown")));

        loadout.toggle(Slot::Head, id("alien_theorem_hat"));
        assert_eq!(loadout.head(), Some(&id("alien_theorem_hat")));

        loadout.toggle(Slot::Head, id("alien_theorem_hat"));
        assert!(loadout.is_empty());
    }

    #[test]
    fn body_fills_then_overflows_into_second() {
        let mut loadout = Loadout::default();
        loadout.toggle(Slot::Body, id("nebula_coat"));
        loadout.toggle(Slot::Body, id("gravity_boots"));
        loadout.toggle(Slot::Body, id("orbiting_notebook"));
        assert_eq!(
            loadout.body(),
            [Some(&id("nebula_coat")), Some(&id("orbiting_notebook"))]
        );
    }

    #[test]
    fn body_toggle_off_frees_that_sub_slot_only() {
        let mut loadout = Loadout::default();
        loadout.toggle(Slot::Body, id("nebula_coat"));
        loadout.toggle(Slot::Body, id("gravity_boots"));
        loadout.toggle(Slot::Body, id("nebula_coat"));
        assert_eq!(loadout.body(), [None, Some(&id("gravity_boots"))]);

        loadout.toggle(Slot::Body, id("black_hole_backpack"));
        assert_eq!(
            loadout.body(),
            [Some(&id("black_hole_backpack")), Some(&id("gravity_boots"))]
        );
    }

    #[test]
    fn remove_clears_any_position() {
        let mut loadout = Loadout::default();
        loadout.toggle(Slot::Face, id("chaos_eyes"));
        loadout.toggle(Slot::Body, id("nebula_coat"));
        assert!(loadout.remove(&id("nebula_coat")));
        assert!(!loadout.remove(&id("nebula_coat")));
        assert!(loadout.is_worn(&id("chaos_eyes")));
    }

    #[test]
    fn persists_as_position_map() {
        let mut loadout = Loadout::default();
        loadout.toggle(Slot::Body, id("nebula_coat"));
        let json = serde_json::to_value(&loadout).unwrap();
        assert_eq!(json, serde_json::json!({ "body1": "nebula_coat" }));
    }
}
