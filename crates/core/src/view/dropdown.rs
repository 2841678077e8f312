use crate::models::{ItemMeta, PlayerState, Snapshot};

/// Price ratio for market orders.
pub const TRADE_PRICE_RATIO: f64 = 1.0;
/// Price ratio the bank pays for raw materials.
pub const BANK_PRICE_RATIO: f64 = 0.85;

/// One selectable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropdownOption {
    /// Value submitted when chosen; empty for a "none" entry.
    pub value: String,
    /// Text shown to the player.
    pub label: String,
}

impl DropdownOption {
    /// Build an option.
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// What a refresh did to a dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropdownRefresh {
    /// The control has focus; nothing was touched.
    SkippedFocused,
    /// The option list was identical.
    Unchanged,
    /// The option list was replaced.
    Replaced {
        /// Whether the previous selection survived.
        restored: bool,
    },
}

/// A select control whose options are recomputed from every snapshot.
///
/// The default selection is the first option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dropdown {
    options: Vec<DropdownOption>,
    selected: Option<String>,
    focused: bool,
}

impl Dropdown {
    /// Build a dropdown selecting its first option.
    pub fn new(options: Vec<DropdownOption>) -> Self {
        let selected = options.first().map(|option| option.value.clone());
        Self {
            options,
            selected,
            focused: false,
        }
    }

    /// Current options.
    pub fn options(&self) -> &[DropdownOption] {
        &self.options
    }

    /// Whether there is nothing to choose from.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Selected value.
    pub fn selected_value(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Selected option.
    pub fn selected_option(&self) -> Option<&DropdownOption> {
        let value = self.selected.as_deref()?;
        self.options.iter().find(|option| option.value == value)
    }

    /// Index of the selected option.
    pub fn selected_index(&self) -> Option<usize> {
        let value = self.selected.as_deref()?;
        self.options.iter().position(|option| option.value == value)
    }

    /// Select `value` if it is one of the options.
    pub fn select(&mut self, value: &str) -> bool {
        if self.contains(value) {
            self.selected = Some(value.to_string());
            true
        } else {
            false
        }
    }

    /// Move the selection by `step`, wrapping around.
    pub fn cycle(&mut self, step: isize) {
        if self.options.is_empty() {
            return;
        }
        let len = self.options.len() as isize;
        let current = self.selected_index().map_or(0, |index| index as isize);
        let next = (current + step).rem_euclid(len) as usize;
        self.selected = Some(self.options[next].value.clone());
    }

    /// Whether the control currently has input focus.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Give or take input focus.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// Replace the options unless focused or identical, keeping the
    /// selection when the new list still offers it.
    pub fn refresh(&mut self, options: Vec<DropdownOption>) -> DropdownRefresh {
        if self.focused {
            return DropdownRefresh::SkippedFocused;
        }
        if self.options == options {
            return DropdownRefresh::Unchanged;
        }

        let previous = self.selected.take();
        self.options = options;
        let restored = previous.is_some_and(|value| self.select(&value));
        if !restored {
            self.selected = self.options.first().map(|option| option.value.clone());
        }
        DropdownRefresh::Replaced { restored }
    }

    fn contains(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }
}

fn priced_options<'a>(
    snapshot: &'a Snapshot,
    ratio: f64,
    include: impl Fn(&ItemMeta) -> bool + 'a,
) -> impl Iterator<Item = DropdownOption> + 'a {
    snapshot
        .items_meta
        .iter()
        .filter(move |(_, meta)| include(*meta))
        .map(move |(code, meta)| {
            let price = snapshot.price_of(code).unwrap_or(meta.base_price);
            let shown = (price as f64 * ratio).floor() as i64;
            DropdownOption::new(code.clone(), format!("{} (${shown})", meta.label))
        })
}

/// Every catalog item, priced at the market.
pub fn trade_item_options(snapshot: &Snapshot) -> Vec<DropdownOption> {
    priced_options(snapshot, TRADE_PRICE_RATIO, |_| true).collect()
}

/// Raw materials at the bank's buying price.
pub fn bank_item_options(snapshot: &Snapshot) -> Vec<DropdownOption> {
    priced_options(snapshot, BANK_PRICE_RATIO, |meta| meta.is_raw()).collect()
}

/// A leading "None" entry followed by every owned item.
pub fn payment_material_options(
    snapshot: &Snapshot,
    player: Option<&PlayerState>,
) -> Vec<DropdownOption> {
    let mut options = vec![DropdownOption::new("", "None")];
    if let Some(player) = player {
        options.extend(
            player
                .inventory
                .iter()
                .filter(|(_, qty)| **qty > 0)
                .map(|(code, qty)| {
                    let label = format!("{} (x{qty})", snapshot.label_of(code));
                    DropdownOption::new(code.clone(), label)
                }),
        );
    }
    options
}
