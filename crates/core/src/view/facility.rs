use tracing::debug;

use super::dropdown::{Dropdown, DropdownOption};
use crate::{
    models::{
        Facility, FacilityId, FacilityKind, ItemCatalog, ItemCode, Phase, Snapshot, DIAMOND_ITEM,
    },
    rules::Validator,
};

/// Quantity shown in a fresh production input.
pub const DEFAULT_QUANTITY: &str = "1";

/// Facility attributes that decide whether the action area must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTag {
    /// Facility tier.
    pub tier: u8,
    /// Whether the facility acted this turn.
    pub has_produced: bool,
    /// Game phase.
    pub phase: Phase,
}

impl RenderTag {
    /// Tag for `facility` during `phase`.
    pub fn of(facility: &Facility, phase: Phase) -> Self {
        Self {
            tier: facility.tier,
            has_produced: facility.has_produced,
            phase,
        }
    }
}

/// What a production run makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionKind {
    /// Collect a raw material.
    Mine,
    /// Manufacture from a recipe.
    Manufacture,
    /// Diamond Mine output.
    Diamond,
}

/// Product picker plus quantity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionInput {
    /// Product choices.
    pub product: Dropdown,
    quantity: Option<String>,
}

impl ProductionInput {
    fn new(options: Vec<DropdownOption>, with_quantity: bool) -> Self {
        Self {
            product: Dropdown::new(options),
            quantity: with_quantity.then(|| DEFAULT_QUANTITY.to_string()),
        }
    }

    /// Selected product.
    pub fn selected_item(&self) -> Option<&str> {
        self.product.selected_value()
    }

    /// Raw quantity text; `None` when the facility has no quantity field.
    pub fn quantity_text(&self) -> Option<&str> {
        self.quantity.as_deref()
    }

    /// Mutable quantity text for editing.
    pub fn quantity_text_mut(&mut self) -> Option<&mut String> {
        self.quantity.as_mut()
    }

    /// Quantity to submit. Unparsable or zero input falls back to 1.
    pub fn quantity(&self) -> u32 {
        self.quantity
            .as_deref()
            .and_then(|text| text.trim().parse::<u32>().ok())
            .filter(|qty| *qty > 0)
            .unwrap_or(1)
    }

    fn capture(&self) -> CapturedInput {
        CapturedInput {
            selected: self.product.selected_value().map(str::to_string),
            quantity: self.quantity.clone(),
        }
    }

    fn restore(&mut self, captured: CapturedInput) {
        if let Some(selected) = captured.selected {
            self.product.select(&selected);
        }
        if let (Some(slot), Some(text)) = (self.quantity.as_mut(), captured.quantity) {
            *slot = text;
        }
    }
}

#[derive(Debug, Default)]
struct CapturedInput {
    selected: Option<String>,
    quantity: Option<String>,
}

/// Interactive part of a facility node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionArea {
    /// Outside the action phase.
    WaitingForActionPhase,
    /// Special building with a passive effect.
    Passive,
    /// Miner that already collected this turn.
    MinedThisTurn,
    /// A product can be chosen and produced.
    Production {
        /// Which production endpoint semantics apply.
        kind: ProductionKind,
        /// Current input.
        input: ProductionInput,
    },
    /// Processor with nothing it can make.
    NoRecipes,
}

impl ActionArea {
    fn build(facility: &Facility, phase: Phase, items: &ItemCatalog) -> Self {
        if phase != Phase::Action {
            return Self::WaitingForActionPhase;
        }
        match facility.kind() {
            FacilityKind::Special {
                diamond_mine: false,
            } => Self::Passive,
            FacilityKind::Special { diamond_mine: true } => {
                let label = items
                    .get(DIAMOND_ITEM)
                    .map_or(DIAMOND_ITEM, |meta| meta.label.as_str());
                Self::production(
                    ProductionKind::Diamond,
                    vec![DropdownOption::new(DIAMOND_ITEM, label)],
                )
            }
            FacilityKind::Miner if facility.has_produced => Self::MinedThisTurn,
            FacilityKind::Miner => {
                Self::production(ProductionKind::Mine, product_options(items, |tier| tier == 0))
            }
            FacilityKind::Processor => Self::production(
                ProductionKind::Manufacture,
                product_options(items, |tier| tier > 0 && tier <= facility.tier),
            ),
        }
    }

    fn production(kind: ProductionKind, options: Vec<DropdownOption>) -> Self {
        if options.is_empty() {
            return Self::NoRecipes;
        }
        Self::Production {
            kind,
            input: ProductionInput::new(options, kind != ProductionKind::Mine),
        }
    }

    /// Production input, if the area has one.
    pub fn input(&self) -> Option<&ProductionInput> {
        match self {
            Self::Production { input, .. } => Some(input),
            _ => None,
        }
    }

    /// Mutable production input, if the area has one.
    pub fn input_mut(&mut self) -> Option<&mut ProductionInput> {
        match self {
            Self::Production { input, .. } => Some(input),
            _ => None,
        }
    }

    fn capture(&self) -> CapturedInput {
        self.input().map(ProductionInput::capture).unwrap_or_default()
    }

    fn restore(&mut self, captured: CapturedInput) {
        if let Some(input) = self.input_mut() {
            input.restore(captured);
        }
    }
}

fn product_options(items: &ItemCatalog, accept: impl Fn(u8) -> bool) -> Vec<DropdownOption> {
    items
        .iter()
        .filter(|(_, meta)| accept(meta.tier))
        .map(|(code, meta)| DropdownOption::new(code.clone(), meta.label.clone()))
        .collect()
}

/// One ingredient line of a recipe readout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeLine {
    /// Ingredient code.
    pub code: ItemCode,
    /// Ingredient label.
    pub label: String,
    /// Units needed for the requested quantity.
    pub required: u64,
    /// Units owned.
    pub owned: u32,
}

impl RecipeLine {
    /// Whether enough is owned.
    pub fn is_met(&self) -> bool {
        u64::from(self.owned) >= self.required
    }
}

/// Required versus owned ingredients for the selected product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeReadout {
    /// Quantity the readout was computed for.
    pub quantity: u32,
    /// Ingredient lines in catalog order.
    pub lines: Vec<RecipeLine>,
}

impl RecipeReadout {
    /// Whether every ingredient is available.
    pub fn is_satisfied(&self) -> bool {
        self.lines.iter().all(RecipeLine::is_met)
    }
}

/// Headless view of one facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityNode {
    /// Facility id.
    pub id: FacilityId,
    /// Display name.
    pub title: String,
    /// Tier badge value.
    pub tier: u8,
    /// Behavioral class.
    pub kind: FacilityKind,
    /// Tag the action area was built for.
    pub tag: RenderTag,
    /// Interactive controls.
    pub action: ActionArea,
    /// Upgrade requirement, for upgradable facilities.
    pub upgrade_hint: Option<&'static str>,
    /// Demolition fee.
    pub demolish_cost: i64,
    /// Recipe readout, recomputed every tick.
    pub readout: Option<RecipeReadout>,
}

impl FacilityNode {
    fn build(facility: &Facility, snapshot: &Snapshot) -> Self {
        let mut node = Self {
            id: facility.id.clone(),
            title: facility.display_name(),
            tier: facility.tier,
            kind: facility.kind(),
            tag: RenderTag::of(facility, snapshot.phase),
            action: ActionArea::build(facility, snapshot.phase, &snapshot.items_meta),
            upgrade_hint: Validator::upgrade_hint(facility),
            demolish_cost: facility.demolish_cost(),
            readout: None,
        };
        node.refresh_readout(snapshot);
        node
    }

    /// Whether production, upgrade and demolition are available.
    pub fn actions_enabled(&self) -> bool {
        self.tag.phase == Phase::Action
    }

    fn refresh_title(&mut self, facility: &Facility) {
        self.title = facility.display_name();
        self.tier = facility.tier;
        self.kind = facility.kind();
    }

    /// Recompute the recipe readout from the current input and inventory.
    pub fn refresh_readout(&mut self, snapshot: &Snapshot) {
        self.readout = self
            .action
            .input()
            .filter(|input| input.quantity_text().is_some())
            .and_then(|input| recipe_readout(input, snapshot));
    }
}

fn recipe_readout(input: &ProductionInput, snapshot: &Snapshot) -> Option<RecipeReadout> {
    let code = input.selected_item()?;
    let recipe = snapshot.items_meta.get(code)?.recipe.as_ref()?;
    let quantity = input.quantity();
    let owned = |code: &str| snapshot.player.as_ref().map_or(0, |player| player.owned(code));
    let lines = recipe
        .iter()
        .map(|(ingredient, per_unit)| RecipeLine {
            code: ingredient.clone(),
            label: snapshot.label_of(ingredient).to_string(),
            required: u64::from(*per_unit) * u64::from(quantity),
            owned: owned(ingredient),
        })
        .collect();
    Some(RecipeReadout { quantity, lines })
}

/// What a reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The list was discarded and rebuilt.
    pub rebuilt: bool,
    /// Facilities whose action area was replaced in place.
    pub patched: Vec<FacilityId>,
}

impl ReconcileReport {
    /// Whether nothing structural changed.
    pub fn is_quiet(&self) -> bool {
        !self.rebuilt && self.patched.is_empty()
    }
}

/// The rendered facility list, kept in step with each snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacilityList {
    nodes: Vec<FacilityNode>,
}

impl FacilityList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes in display order.
    pub fn nodes(&self) -> &[FacilityNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by facility id.
    pub fn node(&self, id: &str) -> Option<&FacilityNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Mutable node by facility id.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut FacilityNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Merge `snapshot` into the list.
    ///
    /// A different facility count, or an id the list does not know, rebuilds
    /// every node. Otherwise only nodes whose [`RenderTag`] changed get a new
    /// action area, with the product choice and quantity text carried over.
    /// Titles and recipe readouts are refreshed for every node.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> ReconcileReport {
        let facilities = snapshot.facilities();
        let known = facilities.len() == self.nodes.len()
            && facilities
                .iter()
                .all(|facility| self.nodes.iter().any(|node| node.id == facility.id));

        if !known {
            self.nodes = facilities
                .iter()
                .map(|facility| FacilityNode::build(facility, snapshot))
                .collect();
            debug!(count = self.nodes.len(), "rebuilt facility list");
            return ReconcileReport {
                rebuilt: true,
                patched: Vec::new(),
            };
        }

        let mut report = ReconcileReport::default();
        for facility in facilities {
            let Some(node) = self.node_mut(&facility.id) else {
                continue;
            };
            node.refresh_title(facility);

            let tag = RenderTag::of(facility, snapshot.phase);
            if tag != node.tag {
                let captured = node.action.capture();
                node.action = ActionArea::build(facility, snapshot.phase, &snapshot.items_meta);
                node.action.restore(captured);
                node.tag = tag;
                node.upgrade_hint = Validator::upgrade_hint(facility);
                node.demolish_cost = facility.demolish_cost();
                report.patched.push(facility.id.clone());
            }
            node.refresh_readout(snapshot);
        }
        report
    }
}
