//! Headless view model reconciled against every snapshot.

/// Select controls shared across polls.
pub mod dropdown;
/// Facility list diffing.
pub mod facility;
/// Admin market table with price trends.
pub mod market;

pub use dropdown::{
    bank_item_options, payment_material_options, trade_item_options, Dropdown, DropdownOption,
    DropdownRefresh,
};
pub use facility::{
    ActionArea, FacilityList, FacilityNode, ProductionInput, ProductionKind, RecipeLine,
    RecipeReadout, ReconcileReport, RenderTag,
};
pub use market::{PriceBoard, PriceRow, Trend};
