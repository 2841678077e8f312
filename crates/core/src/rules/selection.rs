//! Transient material-picker state.

use crate::models::{ItemCode, PlayerState};

use super::{Action, Rejection, Validator, Verdict};

/// One inventory item offered by the material picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Item code.
    pub code: ItemCode,
    /// Owned quantity.
    pub owned: u32,
    /// Whether the item is part of the pending payment.
    pub selected: bool,
    /// Result of validating the item against the pending action.
    pub verdict: Verdict,
}

/// Materials chosen for an action that has not been submitted yet.
///
/// Validity is never cached: every query re-runs the validator, so
/// retargeting the selection reclassifies all items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelection {
    action: Action,
    selected: Vec<ItemCode>,
}

impl PendingSelection {
    /// Start an empty selection for `action`.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            selected: Vec::new(),
        }
    }

    /// Action the materials will pay for.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Facility targeted by the action, if any.
    pub fn target_facility_id(&self) -> Option<&str> {
        self.action.target_facility_id()
    }

    /// Selected item codes in the order they were picked.
    pub fn selected(&self) -> &[ItemCode] {
        &self.selected
    }

    /// Whether `code` is selected.
    pub fn is_selected(&self, code: &str) -> bool {
        self.selected.iter().any(|selected| selected == code)
    }

    /// Switch the action or target. Picked items are kept and reclassified
    /// on the next query; items that no longer qualify are dropped.
    pub fn retarget(&mut self, action: Action, validator: &Validator<'_>, player: &PlayerState) {
        self.action = action;
        let action = &self.action;
        self.selected
            .retain(|code| validator.validate(code, player.owned(code), action).is_ok());
    }

    /// Toggle `code`. Deselecting always succeeds; selecting requires the item
    /// to pass validation. Returns whether the item is selected afterwards.
    pub fn toggle(
        &mut self,
        code: &str,
        validator: &Validator<'_>,
        player: &PlayerState,
    ) -> Result<bool, Rejection> {
        if let Some(index) = self.selected.iter().position(|selected| selected == code) {
            self.selected.remove(index);
            return Ok(false);
        }
        validator.validate(code, player.owned(code), &self.action)?;
        self.selected.push(code.to_string());
        Ok(true)
    }

    /// Drop every selected item.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Classify every owned item against the pending action.
    pub fn candidates(&self, validator: &Validator<'_>, player: &PlayerState) -> Vec<Candidate> {
        player
            .inventory
            .iter()
            .filter(|(_, owned)| **owned > 0)
            .map(|(code, owned)| Candidate {
                code: code.clone(),
                owned: *owned,
                selected: self.is_selected(code),
                verdict: validator.validate(code, *owned, &self.action),
            })
            .collect()
    }

    /// Validate the complete payment and return it in submission order.
    pub fn payment(
        &self,
        validator: &Validator<'_>,
        player: &PlayerState,
    ) -> Result<Vec<ItemCode>, Rejection> {
        validator.check_payment(&self.action, &self.selected, player)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::{Facility, ItemMeta};

    fn catalog() -> BTreeMap<ItemCode, ItemMeta> {
        let mut items = BTreeMap::new();
        for (code, tier) in [("A", 1), ("B", 1), ("R", 0), ("S", 0)] {
            items.insert(
                code.to_string(),
                ItemMeta {
                    label: code.to_string(),
                    tier,
                    series: None,
                    base_price: 10,
                    recipe: None,
                },
            );
        }
        items
    }

    fn player() -> PlayerState {
        PlayerState {
            name: "Acme".to_string(),
            money: 100,
            inventory: [("A", 5), ("B", 1), ("R", 3), ("S", 0)]
                .into_iter()
                .map(|(code, qty)| (code.to_string(), qty))
                .collect(),
            factories: vec![Facility {
                id: "f1".to_string(),
                name: "Processor".to_string(),
                tier: 1,
                has_produced: false,
            }],
            land_limit: 3,
        }
    }

    #[test]
    fn upgrade_then_build_processor_flow() {
        let items = catalog();
        let player = player();
        let validator = Validator::new(&items, &player.factories);

        let mut selection = PendingSelection::new(Action::Upgrade {
            facility_id: "f1".to_string(),
        });
        assert_eq!(selection.target_facility_id(), Some("f1"));
        assert_eq!(selection.toggle("A", &validator, &player), Ok(true));
        assert!(selection.toggle("B", &validator, &player).is_err());

        selection.retarget(Action::BuildProcessor, &validator, &player);
        assert!(selection.selected().is_empty());
        assert_eq!(selection.toggle("R", &validator, &player), Ok(true));
        assert_eq!(
            selection.payment(&validator, &player),
            Err(Rejection::TooFewDistinct {
                required: 2,
                selected: 1
            })
        );
    }

    #[test]
    fn candidates_skip_empty_slots_and_reflect_selection() {
        let items = catalog();
        let player = player();
        let validator = Validator::new(&items, &player.factories);
        let mut selection = PendingSelection::new(Action::BuildProcessor);
        selection
            .toggle("R", &validator, &player)
            .expect("raw material qualifies");

        let candidates = selection.candidates(&validator, &player);
        let codes: Vec<_> = candidates.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "R"]);
        let raw = candidates.iter().find(|c| c.code == "R").expect("R offered");
        assert!(raw.selected);
        assert!(raw.verdict.is_ok());
        assert!(candidates.iter().find(|c| c.code == "A").expect("A").verdict.is_err());

        assert_eq!(selection.toggle("R", &validator, &player), Ok(false));
        selection.clear();
        assert!(selection.selected().is_empty());
    }
}
