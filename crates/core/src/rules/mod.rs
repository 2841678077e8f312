//! Payment rules for building, upgrading and special construction.
//!
//! Every mutating action that consumes inventory is checked locally before
//! it reaches the server. [`Validator::validate`] classifies a single
//! candidate item against an [`Action`]; [`Validator::check_payment`] adds
//! the selection-level composition rules and produces the ordered payment
//! list the server expects.

pub mod selection;

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::models::{
    Facility, FacilityId, FacilityKind, ItemCatalog, ItemCode, PlayerState, Snapshot,
};

pub use selection::{Candidate, PendingSelection};

/// Special buildings that can be bought with materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    /// Adds one unit of land.
    Land,
    /// Diamond Mine.
    Diamond,
    /// Prophet; construction is disabled.
    Prophet,
    /// Disaster defense center.
    Defense,
    /// Omni Factory.
    Omni,
    /// Production accelerator.
    Accelerator,
}

impl SpecialKind {
    /// All kinds in menu order.
    pub const ALL: [SpecialKind; 6] = [
        SpecialKind::Land,
        SpecialKind::Diamond,
        SpecialKind::Prophet,
        SpecialKind::Defense,
        SpecialKind::Omni,
        SpecialKind::Accelerator,
    ];

    /// Short code used in action strings (`specialBuild:<code>`).
    pub fn code(self) -> &'static str {
        match self {
            Self::Land => "land",
            Self::Diamond => "diamond",
            Self::Prophet => "prophet",
            Self::Defense => "defense",
            Self::Omni => "omni",
            Self::Accelerator => "accelerator",
        }
    }

    /// Parse a short code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// `building_type` value for `POST /api/build_special`.
    pub fn building_type(self) -> String {
        format!("special_{}", self.code())
    }

    /// Menu label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Land => "Expand Land",
            Self::Diamond => "Diamond Mine",
            Self::Prophet => "Prophet",
            Self::Defense => "Defense Center",
            Self::Omni => "Omni Factory",
            Self::Accelerator => "Accelerator",
        }
    }
}

/// A material-consuming action the player can take.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Build a raw-material collector; costs money only.
    BuildMiner,
    /// Build the first-tier processor.
    BuildProcessor,
    /// Upgrade an existing facility by one tier.
    Upgrade {
        /// Target facility.
        facility_id: FacilityId,
    },
    /// Construct a special building.
    SpecialBuild(SpecialKind),
    /// An action code without known material rules.
    Other(String),
}

impl Action {
    /// Target facility, for actions that have one.
    pub fn target_facility_id(&self) -> Option<&str> {
        match self {
            Self::Upgrade { facility_id } => Some(facility_id),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildMiner => f.write_str("buildMiner"),
            Self::BuildProcessor => f.write_str("buildProcessor"),
            Self::Upgrade { facility_id } => write!(f, "upgrade:{facility_id}"),
            Self::SpecialBuild(kind) => write!(f, "specialBuild:{}", kind.code()),
            Self::Other(code) => f.write_str(code),
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let action = match code.split_once(':') {
            None if code == "buildMiner" => Self::BuildMiner,
            None if code == "buildProcessor" => Self::BuildProcessor,
            Some(("upgrade", id)) if !id.is_empty() => Self::Upgrade {
                facility_id: id.to_string(),
            },
            Some(("specialBuild", kind)) => match SpecialKind::from_code(kind) {
                Some(kind) => Self::SpecialBuild(kind),
                None => Self::Other(code.to_string()),
            },
            _ => Self::Other(code.to_string()),
        };
        Ok(action)
    }
}

/// Accepted item tier and the quantity that must be owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRequirement {
    /// Item tier.
    pub tier: u8,
    /// Minimum owned quantity for an item of this tier.
    pub min_quantity: u32,
}

/// Material-family restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRule {
    /// Any series, or none.
    Any,
    /// Items of this series are refused. Items without a series pass.
    Exclude(&'static str),
    /// Only items of this series are accepted. Items without a series fail.
    Require(&'static str),
}

/// Exact number of distinct items of one tier a payment must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCount {
    /// Item tier.
    pub tier: u8,
    /// Distinct items required.
    pub count: usize,
}

/// Shape of the full payment, checked after every item passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composition {
    /// Minimum number of distinct items.
    pub min_distinct: usize,
    /// Exact per-tier counts; empty when only the distinct minimum applies.
    pub per_tier: &'static [TierCount],
}

/// Declarative rule for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// Accepted tiers with their quantity minimums.
    pub tiers: &'static [TierRequirement],
    /// Series restriction.
    pub series: SeriesRule,
    /// Selection-level requirement.
    pub composition: Composition,
}

const fn special(tiers: &'static [TierRequirement], series: SeriesRule) -> Constraint {
    Constraint {
        tiers,
        series,
        composition: Composition {
            min_distinct: 1,
            per_tier: &[],
        },
    }
}

const BUILD_PROCESSOR: Constraint = Constraint {
    tiers: &[TierRequirement { tier: 0, min_quantity: 3 }],
    series: SeriesRule::Any,
    composition: Composition {
        min_distinct: 2,
        per_tier: &[],
    },
};

/// Indexed by the miner's current tier.
const MINER_UPGRADES: [Constraint; 3] = [
    Constraint {
        tiers: &[TierRequirement { tier: 1, min_quantity: 3 }],
        series: SeriesRule::Any,
        composition: Composition {
            min_distinct: 1,
            per_tier: &[],
        },
    },
    Constraint {
        tiers: &[TierRequirement { tier: 2, min_quantity: 3 }],
        series: SeriesRule::Any,
        composition: Composition {
            min_distinct: 1,
            per_tier: &[],
        },
    },
    Constraint {
        tiers: &[
            TierRequirement { tier: 1, min_quantity: 3 },
            TierRequirement { tier: 2, min_quantity: 3 },
        ],
        series: SeriesRule::Any,
        composition: Composition {
            min_distinct: 2,
            per_tier: &[TierCount { tier: 2, count: 1 }, TierCount { tier: 1, count: 1 }],
        },
    },
];

const PROCESSOR_TO_T2: Constraint = Constraint {
    tiers: &[TierRequirement { tier: 1, min_quantity: 5 }],
    series: SeriesRule::Any,
    composition: Composition {
        min_distinct: 2,
        per_tier: &[TierCount { tier: 1, count: 2 }],
    },
};

const PROCESSOR_TO_T3: Constraint = Constraint {
    tiers: &[
        TierRequirement { tier: 1, min_quantity: 10 },
        TierRequirement { tier: 2, min_quantity: 3 },
    ],
    series: SeriesRule::Any,
    composition: Composition {
        min_distinct: 3,
        per_tier: &[TierCount { tier: 2, count: 2 }, TierCount { tier: 1, count: 1 }],
    },
};

const SPECIAL_LAND: Constraint = special(
    &[TierRequirement { tier: 3, min_quantity: 0 }],
    SeriesRule::Any,
);
const SPECIAL_DIAMOND: Constraint = special(
    &[TierRequirement { tier: 2, min_quantity: 0 }],
    SeriesRule::Exclude("energy"),
);
const SPECIAL_DEFENSE: Constraint = special(
    &[TierRequirement { tier: 3, min_quantity: 0 }],
    SeriesRule::Exclude("silicon"),
);
const SPECIAL_OMNI: Constraint = special(
    &[TierRequirement { tier: 3, min_quantity: 0 }],
    SeriesRule::Require("energy"),
);

/// Highest tier a facility can be upgraded to.
pub const MAX_TIER: u8 = 3;

/// Why a candidate item or payment was refused.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("unknown item: {0}")]
    UnknownItem(ItemCode),
    #[error("facility not found: {0}")]
    FacilityNotFound(FacilityId),
    #[error("{0} cannot be upgraded")]
    NotUpgradable(String),
    #[error("already at maximum tier")]
    MaxTier,
    #[error("feature disabled: {0}")]
    FeatureDisabled(&'static str),
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("requires a {} item (got T{found})", tier_list(.accepted))]
    TierMismatch { accepted: Vec<u8>, found: u8 },
    #[error("{0}-series items are not accepted")]
    SeriesExcluded(&'static str),
    #[error("requires an {0}-series item")]
    SeriesRequired(&'static str),
    #[error("need at least {required} (have {owned})")]
    QuantityShortfall { required: u32, owned: u32 },
    #[error("select at least {required} different materials (selected {selected})")]
    TooFewDistinct { required: usize, selected: usize },
    #[error("select exactly {required} different T{tier} materials (selected {selected})")]
    TierCountMismatch {
        tier: u8,
        required: usize,
        selected: usize,
    },
}

fn tier_list(tiers: &[u8]) -> String {
    tiers
        .iter()
        .map(|tier| format!("T{tier}"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Outcome of validating one candidate item.
pub type Verdict = Result<(), Rejection>;

/// Stateless rule evaluator over one snapshot's catalog and facilities.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    items: &'a ItemCatalog,
    facilities: &'a [Facility],
}

impl<'a> Validator<'a> {
    /// Build a validator from explicit parts.
    pub fn new(items: &'a ItemCatalog, facilities: &'a [Facility]) -> Self {
        Self { items, facilities }
    }

    /// Build a validator over the snapshot's catalog and the player's facilities.
    pub fn for_snapshot(snapshot: &'a Snapshot) -> Self {
        Self::new(&snapshot.items_meta, snapshot.facilities())
    }

    /// Resolve the rule for an action. `Ok(None)` means no material gating.
    pub fn constraint(&self, action: &Action) -> Result<Option<Constraint>, Rejection> {
        match action {
            Action::BuildProcessor => Ok(Some(BUILD_PROCESSOR)),
            Action::Upgrade { facility_id } => {
                let facility = self
                    .facilities
                    .iter()
                    .find(|facility| &facility.id == facility_id)
                    .ok_or_else(|| Rejection::FacilityNotFound(facility_id.clone()))?;
                upgrade_constraint(facility).map(Some)
            }
            Action::SpecialBuild(kind) => match kind {
                SpecialKind::Prophet => Err(Rejection::FeatureDisabled("prophet")),
                SpecialKind::Land => Ok(Some(SPECIAL_LAND)),
                SpecialKind::Diamond => Ok(Some(SPECIAL_DIAMOND)),
                SpecialKind::Defense | SpecialKind::Accelerator => Ok(Some(SPECIAL_DEFENSE)),
                SpecialKind::Omni => Ok(Some(SPECIAL_OMNI)),
            },
            Action::BuildMiner | Action::Other(_) => Ok(None),
        }
    }

    /// Decide whether `code`, of which `owned` units are held, may pay for `action`.
    pub fn validate(&self, code: &str, owned: u32, action: &Action) -> Verdict {
        let meta = self
            .items
            .get(code)
            .ok_or_else(|| Rejection::UnknownItem(code.to_string()))?;
        let Some(constraint) = self.constraint(action)? else {
            return Ok(());
        };

        let requirement = constraint
            .tiers
            .iter()
            .find(|requirement| requirement.tier == meta.tier)
            .ok_or_else(|| Rejection::TierMismatch {
                accepted: constraint.tiers.iter().map(|req| req.tier).collect(),
                found: meta.tier,
            })?;

        match constraint.series {
            SeriesRule::Any => {}
            SeriesRule::Exclude(series) => {
                if meta.series.as_deref() == Some(series) {
                    return Err(Rejection::SeriesExcluded(series));
                }
            }
            SeriesRule::Require(series) => {
                if meta.series.as_deref() != Some(series) {
                    return Err(Rejection::SeriesRequired(series));
                }
            }
        }

        if owned < requirement.min_quantity {
            return Err(Rejection::QuantityShortfall {
                required: requirement.min_quantity,
                owned,
            });
        }
        Ok(())
    }

    /// Check a whole selection and return the payment list in submission order.
    ///
    /// Higher tiers come first; within a tier the selection order is kept.
    /// Duplicate codes are collapsed.
    pub fn check_payment(
        &self,
        action: &Action,
        selected: &[ItemCode],
        player: &PlayerState,
    ) -> Result<Vec<ItemCode>, Rejection> {
        let mut distinct: Vec<ItemCode> = Vec::with_capacity(selected.len());
        for code in selected {
            if !distinct.contains(code) {
                distinct.push(code.clone());
            }
        }

        for code in &distinct {
            self.validate(code, player.owned(code), action)?;
        }

        let Some(constraint) = self.constraint(action)? else {
            return Ok(distinct);
        };

        let composition = constraint.composition;
        if distinct.len() < composition.min_distinct {
            return Err(Rejection::TooFewDistinct {
                required: composition.min_distinct,
                selected: distinct.len(),
            });
        }
        for requirement in composition.per_tier {
            let selected = distinct
                .iter()
                .filter(|code| self.tier_of(code) == Some(requirement.tier))
                .count();
            if selected != requirement.count {
                return Err(Rejection::TierCountMismatch {
                    tier: requirement.tier,
                    required: requirement.count,
                    selected,
                });
            }
        }

        distinct.sort_by_key(|code| std::cmp::Reverse(self.tier_of(code).unwrap_or(0)));
        Ok(distinct)
    }

    /// Short requirement hint for an upgrade, if the facility can be upgraded.
    pub fn upgrade_hint(facility: &Facility) -> Option<&'static str> {
        upgrade_constraint(facility).ok()?;
        Some(match (facility.kind(), facility.tier) {
            (FacilityKind::Miner, 0) => "3x one T1 material",
            (FacilityKind::Miner, 1) => "3x one T2 material",
            (FacilityKind::Miner, _) => "3x one T2 + 3x one T1",
            (_, 1) => "5x each of two T1 materials",
            _ => "3x each of two T2 + 10x one T1",
        })
    }

    fn tier_of(&self, code: &str) -> Option<u8> {
        self.items.get(code).map(|meta| meta.tier)
    }
}

fn upgrade_constraint(facility: &Facility) -> Result<Constraint, Rejection> {
    match facility.kind() {
        FacilityKind::Special { .. } => Err(Rejection::NotUpgradable(facility.name.clone())),
        _ if facility.tier >= MAX_TIER => Err(Rejection::MaxTier),
        FacilityKind::Miner => Ok(MINER_UPGRADES[usize::from(facility.tier)]),
        FacilityKind::Processor => match facility.tier {
            1 => Ok(PROCESSOR_TO_T2),
            2 => Ok(PROCESSOR_TO_T3),
            _ => Err(Rejection::NotUpgradable(facility.name.clone())),
        },
    }
}
