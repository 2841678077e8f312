//! Snapshot model mirrored from `GET /api/state`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Item identifier as used by the server (`iron_1`, `diamond`, ...).
pub type ItemCode = String;

/// Facility identifier assigned by the server.
pub type FacilityId = String;

/// Catalog entry describing a tradable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Human-readable name.
    pub label: String,
    /// Production tier; 0 is a raw material.
    pub tier: u8,
    /// Material family used by special-building recipes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Price used when no market price has been established.
    #[serde(default)]
    pub base_price: i64,
    /// Ingredients per produced unit; absent for raw materials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<BTreeMap<ItemCode, u32>>,
}

impl ItemMeta {
    /// Whether this item is a tier-0 raw material.
    pub fn is_raw(&self) -> bool {
        self.tier == 0
    }
}

/// Item catalog keyed by code. Ordered so option lists are stable between polls.
pub type ItemCatalog = BTreeMap<ItemCode, ItemMeta>;

/// Names of facilities with passive effects.
pub const SPECIAL_FACILITY_NAMES: [&str; 5] = [
    "Diamond Mine",
    "Prophet",
    "Defense",
    "Omni Factory",
    "Accelerator",
];

/// Output of the Diamond Mine's fixed production action.
pub const DIAMOND_ITEM: &str = "diamond";

/// Behavioral class of a facility, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityKind {
    /// Collects raw materials, once per turn.
    Miner,
    /// Produces tiered goods from recipes.
    Processor,
    /// Passive building; only the Diamond Mine has an action.
    Special {
        /// True for the Diamond Mine.
        diamond_mine: bool,
    },
}

/// A production facility owned by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    /// Stable identity across polls.
    pub id: FacilityId,
    /// Server-side name, e.g. `Miner`, `Factory T1`, `Omni Factory`.
    pub name: String,
    /// Current tier.
    pub tier: u8,
    /// Whether the facility already acted during the current turn.
    #[serde(default, rename = "has_produced", alias = "hasProducedThisTurn")]
    pub has_produced: bool,
}

impl Facility {
    /// Classify the facility by its naming convention.
    pub fn kind(&self) -> FacilityKind {
        if SPECIAL_FACILITY_NAMES.contains(&self.name.as_str()) {
            FacilityKind::Special {
                diamond_mine: self.name == "Diamond Mine",
            }
        } else if self.name.contains("Miner") {
            FacilityKind::Miner
        } else {
            FacilityKind::Processor
        }
    }

    /// Label shown in the facility list.
    pub fn display_name(&self) -> String {
        match self.kind() {
            FacilityKind::Miner => self.name.replace("Miner", "Collector"),
            FacilityKind::Processor => self.name.replace("Factory", "Processor"),
            FacilityKind::Special { .. } => self.name.clone(),
        }
    }

    /// Cleanup fee the server charges for demolishing this facility.
    pub fn demolish_cost(&self) -> i64 {
        if self.kind() == FacilityKind::Miner {
            return 250;
        }
        match self.tier {
            1 => 500,
            2 => 1000,
            3 => 4000,
            _ => 0,
        }
    }
}

/// Cached copy of the player's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Company name.
    pub name: String,
    /// Cash on hand.
    pub money: i64,
    /// Owned quantity per item.
    #[serde(default)]
    pub inventory: BTreeMap<ItemCode, u32>,
    /// Owned facilities in server order.
    #[serde(default)]
    pub factories: Vec<Facility>,
    /// Maximum number of facilities.
    #[serde(default)]
    pub land_limit: u32,
}

impl PlayerState {
    /// Owned quantity of the given item; zero when absent.
    pub fn owned(&self, code: &str) -> u32 {
        self.inventory.get(code).copied().unwrap_or(0)
    }
}

/// Game phase within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Daily news is revealed.
    News,
    /// Production, building and upgrades.
    Action,
    /// Market orders.
    Trading,
    /// Orders clear and penalties apply.
    Settlement,
    /// Final ranking.
    GameOver,
    /// A phase number this client does not know.
    Unknown(u8),
}

impl Phase {
    /// Map the wire number to a phase.
    pub fn from_number(value: u8) -> Self {
        match value {
            1 => Self::News,
            2 => Self::Action,
            3 => Self::Trading,
            4 => Self::Settlement,
            5 => Self::GameOver,
            other => Self::Unknown(other),
        }
    }

    /// Wire number of the phase.
    pub fn number(self) -> u8 {
        match self {
            Self::News => 1,
            Self::Action => 2,
            Self::Trading => 3,
            Self::Settlement => 4,
            Self::GameOver => 5,
            Self::Unknown(value) => value,
        }
    }

    /// Human-readable phase name.
    pub fn label(self) -> &'static str {
        match self {
            Self::News => "News",
            Self::Action => "Action",
            Self::Trading => "Trading",
            Self::Settlement => "Settlement",
            Self::GameOver => "Game Over",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_number)
    }
}

/// Daily news event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Event identifier; a new id reopens the news modal.
    #[serde(default)]
    pub id: Option<String>,
    /// Headline.
    #[serde(default)]
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub description: String,
    /// Summary of the mechanical effect.
    #[serde(default)]
    pub effect_text: String,
}

/// Active government acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovEvent {
    /// Acquisition identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Headline.
    #[serde(default)]
    pub title: String,
    /// Items the government is buying.
    #[serde(default)]
    pub targets: Vec<ItemCode>,
}

/// Score breakdown in the final ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Total assets.
    #[serde(default)]
    pub total_score: i64,
    /// Cash component.
    #[serde(default)]
    pub cash: Option<i64>,
    /// Inventory valued at market.
    #[serde(default)]
    pub inventory_value: Option<i64>,
    /// Facility valuation.
    #[serde(default)]
    pub factory_value: Option<i64>,
}

/// One row of the final ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Company name.
    pub name: String,
    /// Score breakdown.
    #[serde(default)]
    pub scores: Scores,
}

/// A complete poll response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current phase.
    pub phase: Phase,
    /// Current turn, starting at 1.
    #[serde(default)]
    pub turn: u32,
    /// Today's news; missing before the first event is generated.
    #[serde(default)]
    pub event: Option<GameEvent>,
    /// Government acquisition, if one is running.
    #[serde(default)]
    pub gov_event: Option<GovEvent>,
    /// Last clearing price per item.
    #[serde(default)]
    pub market_prices: HashMap<ItemCode, i64>,
    /// Item catalog.
    #[serde(default)]
    pub items_meta: ItemCatalog,
    /// The polling player, present only for a known identity.
    #[serde(default)]
    pub player: Option<PlayerState>,
    /// Populated once the game is over.
    #[serde(default)]
    pub final_ranking: Option<Vec<RankingEntry>>,
}

impl Snapshot {
    /// Market price for an item, falling back to its base price.
    pub fn price_of(&self, code: &str) -> Option<i64> {
        self.market_prices
            .get(code)
            .copied()
            .or_else(|| self.items_meta.get(code).map(|meta| meta.base_price))
    }

    /// Facilities of the polling player, empty when unregistered.
    pub fn facilities(&self) -> &[Facility] {
        self.player
            .as_ref()
            .map(|player| player.factories.as_slice())
            .unwrap_or(&[])
    }

    /// Label for an item code, falling back to the code itself.
    pub fn label_of<'a>(&'a self, code: &'a str) -> &'a str {
        self.items_meta
            .get(code)
            .map(|meta| meta.label.as_str())
            .unwrap_or(code)
    }
}

/// Leaderboard row from `GET /admin/data`, already sorted by money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminPlayerRow {
    /// Company name.
    pub name: String,
    /// Cash on hand.
    #[serde(default)]
    pub money: i64,
    /// `factories/land_limit` as rendered by the server.
    #[serde(default)]
    pub land: String,
    /// Total units held across all items.
    #[serde(default)]
    pub inventory_count: u64,
}

/// Operator view of the whole game, polled by the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Current turn.
    #[serde(default)]
    pub turn: u32,
    /// Every registered player, richest first.
    #[serde(default)]
    pub players: Vec<AdminPlayerRow>,
    /// Server broadcast log, oldest first.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Item catalog.
    #[serde(default)]
    pub items_meta: ItemCatalog,
    /// Last clearing price per item.
    #[serde(default)]
    pub market_prices: HashMap<ItemCode, i64>,
}

impl AdminSnapshot {
    /// Label for an item code, falling back to the code itself.
    pub fn label_of<'a>(&'a self, code: &'a str) -> &'a str {
        self.items_meta
            .get(code)
            .map(|meta| meta.label.as_str())
            .unwrap_or(code)
    }
}

/// Split a `[timestamp] message` log line; lines without a stamp keep it empty.
pub fn split_log_line(line: &str) -> (Option<&str>, &str) {
    line.strip_prefix('[')
        .and_then(|rest| rest.split_once("] "))
        .map(|(stamp, message)| (Some(stamp), message))
        .unwrap_or((None, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_state() {
        let raw = r#"{
            "turn": 3,
            "phase": 2,
            "event": {"id": "E-01", "title": "Calm", "description": "", "effect_text": "none"},
            "gov_event": null,
            "market_prices": {"iron_0": 120},
            "items_meta": {
                "iron_0": {"label": "Iron Ore", "tier": 0, "series": "iron", "base_price": 100},
                "iron_1": {"label": "Iron Plate", "tier": 1, "series": "iron", "base_price": 300,
                           "recipe": {"iron_0": 2}}
            },
            "all_players": [],
            "player": {
                "id": "p1", "name": "Acme", "money": 1000,
                "inventory": {"iron_0": 4},
                "locked_inventory": {}, "locked_money": 0,
                "factories": [{"id": "f1", "tier": 0, "name": "Miner", "has_produced": true,
                               "is_shutdown": false, "current_product": null}],
                "land_limit": 5
            }
        }"#;
        let snapshot: Snapshot = serde_json::from_str(raw).expect("decode");
        assert_eq!(snapshot.phase, Phase::Action);
        assert_eq!(snapshot.turn, 3);
        assert_eq!(snapshot.price_of("iron_0"), Some(120));
        assert_eq!(snapshot.price_of("iron_1"), Some(300));
        let player = snapshot.player.as_ref().expect("player");
        assert_eq!(player.owned("iron_0"), 4);
        assert_eq!(player.owned("iron_1"), 0);
        assert!(player.factories[0].has_produced);
        assert_eq!(
            snapshot.items_meta["iron_1"].recipe.as_ref().map(|r| r["iron_0"]),
            Some(2)
        );
    }

    #[test]
    fn missing_sections_default() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"phase": 1}"#).expect("decode");
        assert!(snapshot.player.is_none());
        assert!(snapshot.event.is_none());
        assert!(snapshot.facilities().is_empty());
        assert_eq!(Phase::from_number(7), Phase::Unknown(7));
    }

    #[test]
    fn classifies_facilities_by_name() {
        let facility = |name: &str, tier| Facility {
            id: "x".to_string(),
            name: name.to_string(),
            tier,
            has_produced: false,
        };
        assert_eq!(facility("Miner", 0).kind(), FacilityKind::Miner);
        assert_eq!(facility("Factory T1", 1).kind(), FacilityKind::Processor);
        assert_eq!(
            facility("Omni Factory", 3).kind(),
            FacilityKind::Special {
                diamond_mine: false
            }
        );
        assert_eq!(
            facility("Diamond Mine", 4).kind(),
            FacilityKind::Special { diamond_mine: true }
        );
        assert_eq!(facility("Miner", 2).demolish_cost(), 250);
        assert_eq!(facility("Factory T1", 3).demolish_cost(), 4000);
    }

    #[test]
    fn decodes_admin_data() {
        let raw = r#"{
            "phase": 3, "turn": 2,
            "players": [
                {"name": "Acme", "money": 9000, "land": "2/5", "inventory_count": 14},
                {"name": "Zed", "money": 100, "land": "0/3", "inventory_count": 0}
            ],
            "logs": ["[10:01:02] Market cleared", "plain line"],
            "items_meta": {"iron_0": {"label": "Iron Ore", "tier": 0, "base_price": 100}},
            "market_prices": {"iron_0": 110, "mystery": 5}
        }"#;
        let snapshot: AdminSnapshot = serde_json::from_str(raw).expect("decode");
        assert_eq!(snapshot.phase, Phase::Trading);
        assert_eq!(snapshot.players[0].land, "2/5");
        assert_eq!(snapshot.label_of("iron_0"), "Iron Ore");
        assert_eq!(snapshot.label_of("mystery"), "mystery");
        assert_eq!(
            split_log_line(&snapshot.logs[0]),
            (Some("10:01:02"), "Market cleared")
        );
        assert_eq!(split_log_line(&snapshot.logs[1]), (None, "plain line"));

        let empty: AdminSnapshot = serde_json::from_str(r#"{"phase": 1}"#).expect("decode");
        assert!(empty.players.is_empty() && empty.logs.is_empty());
    }
}
