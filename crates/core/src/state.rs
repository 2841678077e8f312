//! Application state owned by the front-end loop.
//!
//! [`ClientState`] holds the latest snapshot together with everything the
//! player is in the middle of editing. Each successful poll goes through
//! [`ClientState::apply_snapshot`]; nothing else replaces the snapshot.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    identity::IdentityStore,
    models::{
        split_log_line, AdminSnapshot, GameEvent, ItemCode, Phase, PlayerState, RankingEntry,
        Snapshot,
    },
    net::{Command, OrderType},
    rules::{Action, PendingSelection, Rejection, Validator},
    view::{
        bank_item_options, payment_material_options, trade_item_options, Dropdown, FacilityList,
        PriceBoard, ProductionInput, ReconcileReport,
    },
};

/// Number of payment-material slots on the build form.
pub const PAYMENT_SLOTS: usize = 3;

/// Shown while the server has no event for the turn.
pub const NO_EVENT_TITLE: &str = "Waiting for signal...";

const NO_EVENT_ID: &str = "none";

/// Which counterparty trade orders go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradeMode {
    /// Player market: bids and asks.
    #[default]
    Market,
    /// Government acquisition: sell only.
    Government,
}

impl TradeMode {
    /// Order types available in this mode.
    pub fn order_types(self) -> &'static [OrderType] {
        match self {
            Self::Market => &[OrderType::Bid, OrderType::Ask],
            Self::Government => &[OrderType::GovAsk],
        }
    }

    /// Tab label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Market => "Market",
            Self::Government => "Government",
        }
    }
}

/// News modal bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsState {
    last_seen_event_id: Option<String>,
    open: bool,
}

impl NewsState {
    /// Whether the modal is showing.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close the modal until the next event.
    pub fn dismiss(&mut self) {
        self.open = false;
    }

    fn observe(&mut self, phase: Phase, event_id: &str) {
        if phase != Phase::News {
            self.open = false;
            return;
        }
        if self.last_seen_event_id.as_deref() != Some(event_id) {
            self.last_seen_event_id = Some(event_id.to_string());
            self.open = true;
        }
    }
}

/// Result of applying a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The held identity was unknown to the server and has been cleared.
    pub stale_identity: bool,
    /// Facility list changes.
    pub reconcile: ReconcileReport,
}

/// The player's own standing in the final ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOverView<'a> {
    /// Full ranking, best first.
    pub ranking: &'a [RankingEntry],
    /// Zero-based position of the player, if listed.
    pub own_index: Option<usize>,
}

impl GameOverView<'_> {
    /// One-based rank of the player.
    pub fn own_rank(&self) -> Option<usize> {
        self.own_index.map(|index| index + 1)
    }
}

/// Everything the front-end renders and edits.
#[derive(Debug, Default)]
pub struct ClientState {
    snapshot: Option<Snapshot>,
    last_poll_at: Option<DateTime<Utc>>,
    /// Reconciled facility nodes.
    pub facilities: FacilityList,
    /// Trade form item picker.
    pub trade_item: Dropdown,
    /// Bank form item picker.
    pub bank_item: Dropdown,
    /// Build form payment pickers.
    pub payment_slots: [Dropdown; PAYMENT_SLOTS],
    /// News modal.
    pub news: NewsState,
    trade_mode: TradeMode,
    order_type: Option<OrderType>,
    selection: Option<PendingSelection>,
}

impl ClientState {
    /// Empty state before the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The player, when registered and known to the server.
    pub fn player(&self) -> Option<&PlayerState> {
        self.snapshot.as_ref()?.player.as_ref()
    }

    /// When the latest snapshot arrived.
    pub fn last_poll_at(&self) -> Option<DateTime<Utc>> {
        self.last_poll_at
    }

    /// Replace the snapshot and reconcile every view against it.
    ///
    /// `polled_for` is the player id the request carried. If that id is still
    /// the held identity but the server returned no player, the identity is
    /// cleared so the player registers again.
    pub fn apply_snapshot(
        &mut self,
        snapshot: Snapshot,
        polled_for: Option<&str>,
        identity: &IdentityStore,
        received_at: DateTime<Utc>,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        if let Some(polled_for) = polled_for {
            if snapshot.player.is_none() && identity.player_id().as_deref() == Some(polled_for) {
                info!(player_id = polled_for, "server no longer knows this player");
                if let Err(err) = identity.clear() {
                    warn!("failed to clear identity: {err:#}");
                }
                self.selection = None;
                outcome.stale_identity = true;
            }
        }

        let event_id = snapshot
            .event
            .as_ref()
            .and_then(|event| event.id.clone())
            .unwrap_or_else(|| NO_EVENT_ID.to_string());
        self.news.observe(snapshot.phase, &event_id);

        outcome.reconcile = self.facilities.reconcile(&snapshot);
        self.trade_item.refresh(trade_item_options(&snapshot));
        self.bank_item.refresh(bank_item_options(&snapshot));
        if let Some(player) = snapshot.player.as_ref() {
            let payment = payment_material_options(&snapshot, Some(player));
            for slot in &mut self.payment_slots {
                slot.refresh(payment.clone());
            }
        }

        self.snapshot = Some(snapshot);
        self.last_poll_at = Some(received_at);
        outcome
    }

    /// `<n>. <phase> (Turn <t>)`, or an empty string before the first poll.
    pub fn phase_header(&self) -> String {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return String::new();
        };
        let phase = snapshot.phase;
        if snapshot.turn > 0 {
            format!("{}. {} (Turn {})", phase.number(), phase.label(), snapshot.turn)
        } else {
            format!("{}. {}", phase.number(), phase.label())
        }
    }

    /// Today's event, or a placeholder when none has been published.
    pub fn event(&self) -> GameEvent {
        self.snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.event.clone())
            .unwrap_or_else(|| GameEvent {
                title: NO_EVENT_TITLE.to_string(),
                ..GameEvent::default()
            })
    }

    /// Scrolling headline shown outside the news phase.
    pub fn ticker(&self) -> Option<String> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.phase == Phase::News {
            return None;
        }
        let event = self.event();
        let mut text = format!("[{}] {}", event.title, event.effect_text);
        if let Some(gov) = snapshot.gov_event.as_ref() {
            let targets = gov
                .targets
                .iter()
                .map(|code| snapshot.label_of(code))
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!(
                "  ///  [Government: {}] buying {targets} (+50% price)",
                gov.title
            ));
        }
        Some(text)
    }

    /// `facilities/land_limit`.
    pub fn land_readout(&self) -> Option<String> {
        let player = self.player()?;
        Some(format!("{}/{}", player.factories.len(), player.land_limit))
    }

    /// Owned items with a positive quantity, labelled.
    pub fn inventory_lines(&self) -> Vec<(String, u32)> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Vec::new();
        };
        let Some(player) = snapshot.player.as_ref() else {
            return Vec::new();
        };
        player
            .inventory
            .iter()
            .filter(|(_, qty)| **qty > 0)
            .map(|(code, qty)| (snapshot.label_of(code).to_string(), *qty))
            .collect()
    }

    /// Final ranking, once the game is over and the player is known.
    pub fn game_over(&self) -> Option<GameOverView<'_>> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.phase != Phase::GameOver {
            return None;
        }
        let ranking = snapshot.final_ranking.as_deref()?;
        let player = snapshot.player.as_ref()?;
        Some(GameOverView {
            ranking,
            own_index: ranking.iter().position(|entry| entry.name == player.name),
        })
    }

    /// Current trade counterparty.
    pub fn trade_mode(&self) -> TradeMode {
        self.trade_mode
    }

    /// Switch counterparty; the order type resets to the mode's first.
    pub fn set_trade_mode(&mut self, mode: TradeMode) {
        self.trade_mode = mode;
        self.order_type = None;
    }

    /// Order type the trade form will submit.
    pub fn order_type(&self) -> OrderType {
        let allowed = self.trade_mode.order_types();
        self.order_type
            .filter(|order| allowed.contains(order))
            .unwrap_or(allowed[0])
    }

    /// Step to the next order type allowed in the current mode.
    pub fn cycle_order_type(&mut self) {
        let allowed = self.trade_mode.order_types();
        let current = self.order_type();
        let index = allowed.iter().position(|order| *order == current).unwrap_or(0);
        self.order_type = Some(allowed[(index + 1) % allowed.len()]);
    }

    /// Material picker, while one is open.
    pub fn selection(&self) -> Option<&PendingSelection> {
        self.selection.as_ref()
    }

    /// Open the material picker for `action`, keeping already picked items
    /// that still qualify.
    pub fn begin_selection(&mut self, action: Action) {
        match (self.selection.as_mut(), self.snapshot.as_ref()) {
            (Some(selection), Some(snapshot)) => match snapshot.player.as_ref() {
                Some(player) => {
                    selection.retarget(action, &Validator::for_snapshot(snapshot), player)
                }
                None => *selection = PendingSelection::new(action),
            },
            _ => self.selection = Some(PendingSelection::new(action)),
        }
    }

    /// Close the picker without submitting.
    pub fn cancel_selection(&mut self) {
        self.selection = None;
    }

    /// Toggle an item in the open picker.
    pub fn toggle_material(&mut self, code: &str) -> Result<bool, Rejection> {
        let (Some(selection), Some(snapshot)) = (self.selection.as_mut(), self.snapshot.as_ref())
        else {
            return Ok(false);
        };
        let player = snapshot
            .player
            .as_ref()
            .ok_or_else(|| Rejection::UnknownItem(code.to_string()))?;
        selection.toggle(code, &Validator::for_snapshot(snapshot), player)
    }

    /// Validate the picker and turn it into a command. The picker closes only
    /// when validation succeeds.
    pub fn confirm_selection(&mut self) -> Result<Command, Rejection> {
        let Some(selection) = self.selection.as_ref() else {
            return Err(Rejection::UnsupportedAction("no pending action".to_string()));
        };
        let command = self.payment_command(selection.action(), selection.selected())?;
        self.selection = None;
        Ok(command)
    }

    /// Build a processor from the non-empty payment slots.
    pub fn build_processor_from_slots(&self) -> Result<Command, Rejection> {
        let chosen: Vec<ItemCode> = self
            .payment_slots
            .iter()
            .filter_map(|slot| slot.selected_value())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        self.payment_command(&Action::BuildProcessor, &chosen)
    }

    fn payment_command(&self, action: &Action, selected: &[ItemCode]) -> Result<Command, Rejection> {
        let empty = PlayerState {
            name: String::new(),
            money: 0,
            inventory: Default::default(),
            factories: Vec::new(),
            land_limit: 0,
        };
        let (validator, player) = match self.snapshot.as_ref() {
            Some(snapshot) => (
                Validator::for_snapshot(snapshot),
                snapshot.player.as_ref().unwrap_or(&empty),
            ),
            None => return Err(Rejection::UnsupportedAction(action.to_string())),
        };
        let payment_materials = validator.check_payment(action, selected, player)?;

        match action {
            Action::BuildMiner => Ok(Command::Build {
                target_tier: 0,
                payment_materials: Vec::new(),
            }),
            Action::BuildProcessor => Ok(Command::Build {
                target_tier: 1,
                payment_materials,
            }),
            Action::Upgrade { facility_id } => Ok(Command::Upgrade {
                factory_id: facility_id.clone(),
                payment_materials,
            }),
            Action::SpecialBuild(kind) => Ok(Command::BuildSpecial {
                building_type: kind.building_type(),
                payment_materials,
            }),
            Action::Other(code) => Err(Rejection::UnsupportedAction(code.clone())),
        }
    }

    /// Edit a facility's production input and refresh its recipe readout.
    /// Returns false when the facility has no input.
    pub fn edit_production(
        &mut self,
        facility_id: &str,
        edit: impl FnOnce(&mut ProductionInput),
    ) -> bool {
        let Some(node) = self.facilities.node_mut(facility_id) else {
            return false;
        };
        let Some(input) = node.action.input_mut() else {
            return false;
        };
        edit(input);
        if let Some(snapshot) = self.snapshot.as_ref() {
            node.refresh_readout(snapshot);
        }
        true
    }

    /// Production request for a facility's current input.
    pub fn produce_command(&self, facility_id: &str) -> Option<Command> {
        let node = self.facilities.node(facility_id)?;
        if !node.actions_enabled() {
            return None;
        }
        let input = node.action.input()?;
        Some(Command::Produce {
            factory_id: node.id.clone(),
            target_item: input.selected_item()?.to_string(),
            quantity: input.quantity(),
        })
    }
}

/// State of the admin dashboard.
#[derive(Debug, Default)]
pub struct AdminState {
    snapshot: Option<AdminSnapshot>,
    last_poll_at: Option<DateTime<Utc>>,
    prices: PriceBoard,
}

impl AdminState {
    /// Empty dashboard before the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the operator view; returns whether the market table changed.
    pub fn apply(&mut self, snapshot: AdminSnapshot, received_at: DateTime<Utc>) -> bool {
        let changed = self.prices.refresh(&snapshot);
        self.snapshot = Some(snapshot);
        self.last_poll_at = Some(received_at);
        changed
    }

    /// Latest operator view.
    pub fn snapshot(&self) -> Option<&AdminSnapshot> {
        self.snapshot.as_ref()
    }

    /// When the latest view arrived.
    pub fn last_poll_at(&self) -> Option<DateTime<Utc>> {
        self.last_poll_at
    }

    /// Market table with trends.
    pub fn prices(&self) -> &PriceBoard {
        &self.prices
    }

    /// `Phase <n>: <name>` and `Turn <t>`, empty before the first poll.
    pub fn phase_and_turn(&self) -> Option<(String, String)> {
        let snapshot = self.snapshot.as_ref()?;
        Some((
            format!("Phase {}: {}", snapshot.phase.number(), snapshot.phase.label()),
            format!("Turn {}", snapshot.turn),
        ))
    }

    /// Log lines split into optional timestamp and message.
    pub fn log_entries(&self) -> Vec<(Option<&str>, &str)> {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.logs.iter().map(|line| split_log_line(line)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{identity::Identity, rules::SpecialKind};

    fn snapshot(raw: &str) -> Snapshot {
        serde_json::from_str(raw).expect("test snapshot decodes")
    }

    fn registered(phase: u8, event_id: &str) -> Snapshot {
        snapshot(&format!(
            r#"{{
                "phase": {phase}, "turn": 2,
                "event": {{"id": "{event_id}", "title": "Strike", "description": "",
                           "effect_text": "ore -20%"}},
                "gov_event": {{"title": "Bridge", "targets": ["A"]}},
                "items_meta": {{
                    "A": {{"label": "Alloy", "tier": 1, "base_price": 50}},
                    "R": {{"label": "Rock", "tier": 0, "base_price": 10}}
                }},
                "player": {{"name": "Acme", "money": 10,
                            "inventory": {{"A": 5, "R": 0}},
                            "factories": [{{"id": "f1", "name": "Factory T1", "tier": 1}}],
                            "land_limit": 4}},
                "final_ranking": [
                    {{"name": "Rival", "scores": {{"total_score": 900}}}},
                    {{"name": "Acme", "scores": {{"total_score": 500, "cash": 10}}}}
                ]
            }}"#
        ))
    }

    #[test]
    fn stale_identity_is_cleared() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        identity.set(Identity::new("p-old", "Acme"))?;

        let mut state = ClientState::new();
        let outcome = state.apply_snapshot(
            snapshot(r#"{"phase": 2}"#),
            Some("p-old"),
            &identity,
            Utc::now(),
        );
        assert!(outcome.stale_identity);
        assert!(!identity.is_registered());
        assert!(!dir.path().join("identity.json").exists());
        Ok(())
    }

    #[test]
    fn late_poll_for_previous_identity_is_ignored() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        identity.set(Identity::new("p-new", "Acme"))?;

        let mut state = ClientState::new();
        let outcome =
            state.apply_snapshot(snapshot(r#"{"phase": 2}"#), Some("p-old"), &identity, Utc::now());
        assert!(!outcome.stale_identity);
        assert!(identity.is_registered());
        Ok(())
    }

    #[test]
    fn news_opens_once_per_event() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        let mut state = ClientState::new();

        state.apply_snapshot(registered(1, "E1"), None, &identity, Utc::now());
        assert!(state.news.is_open());
        assert_eq!(state.ticker(), None);
        state.news.dismiss();
        state.apply_snapshot(registered(1, "E1"), None, &identity, Utc::now());
        assert!(!state.news.is_open());
        state.apply_snapshot(registered(1, "E2"), None, &identity, Utc::now());
        assert!(state.news.is_open());

        state.apply_snapshot(registered(2, "E2"), None, &identity, Utc::now());
        assert!(!state.news.is_open());
        assert_eq!(state.phase_header(), "2. Action (Turn 2)");
        assert_eq!(
            state.ticker().as_deref(),
            Some("[Strike] ore -20%  ///  [Government: Bridge] buying Alloy (+50% price)")
        );
        Ok(())
    }

    #[test]
    fn readouts_and_ranking() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        let mut state = ClientState::new();
        state.apply_snapshot(registered(5, "E9"), None, &identity, Utc::now());

        assert_eq!(state.land_readout().as_deref(), Some("1/4"));
        assert_eq!(state.inventory_lines(), vec![("Alloy".to_string(), 5)]);
        let over = state.game_over().expect("game over view");
        assert_eq!(over.own_rank(), Some(2));
        assert_eq!(over.ranking[over.own_index.unwrap_or(0)].scores.cash, Some(10));
        Ok(())
    }

    #[test]
    fn missing_event_uses_placeholder() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        let mut state = ClientState::new();
        state.apply_snapshot(snapshot(r#"{"phase": 3, "turn": 1}"#), None, &identity, Utc::now());
        assert_eq!(state.ticker().as_deref(), Some("[Waiting for signal...] "));
        Ok(())
    }

    #[test]
    fn trade_modes_limit_order_types() {
        let mut state = ClientState::new();
        assert_eq!(state.order_type(), OrderType::Bid);
        state.cycle_order_type();
        assert_eq!(state.order_type(), OrderType::Ask);
        state.set_trade_mode(TradeMode::Government);
        assert_eq!(state.order_type(), OrderType::GovAsk);
        state.cycle_order_type();
        assert_eq!(state.order_type(), OrderType::GovAsk);
    }

    #[test]
    fn picker_turns_into_commands() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        let mut state = ClientState::new();
        state.apply_snapshot(registered(2, "E1"), None, &identity, Utc::now());

        state.begin_selection(Action::Upgrade {
            facility_id: "f1".to_string(),
        });
        assert_eq!(state.toggle_material("A"), Ok(true));
        assert!(matches!(
            state.confirm_selection(),
            Err(Rejection::TooFewDistinct { .. })
        ));
        assert!(state.selection().is_some());

        state.begin_selection(Action::BuildProcessor);
        assert!(state.selection().is_some_and(|s| s.selected().is_empty()));
        assert!(state.toggle_material("A").is_err());
        assert!(state.confirm_selection().is_err());

        state.begin_selection(Action::SpecialBuild(SpecialKind::Prophet));
        assert_eq!(
            state.toggle_material("A"),
            Err(Rejection::FeatureDisabled("prophet"))
        );
        state.cancel_selection();
        assert!(state.selection().is_none());
        Ok(())
    }

    #[test]
    fn slots_and_production_commands() -> Result<()> {
        let dir = tempdir()?;
        let identity = IdentityStore::open(dir.path().join("identity.json"));
        let mut state = ClientState::new();
        state.apply_snapshot(registered(2, "E1"), None, &identity, Utc::now());

        assert_eq!(state.payment_slots[0].selected_value(), Some(""));
        assert!(state.payment_slots[0].select("A"));
        assert!(matches!(
            state.build_processor_from_slots(),
            Err(Rejection::TierMismatch { found: 1, .. })
        ));

        assert_eq!(
            state.produce_command("f1"),
            Some(Command::Produce {
                factory_id: "f1".to_string(),
                target_item: "A".to_string(),
                quantity: 1,
            })
        );
        assert_eq!(state.produce_command("missing"), None);

        assert!(state.edit_production("f1", |input| {
            if let Some(text) = input.quantity_text_mut() {
                *text = "3".to_string();
            }
        }));
        assert!(matches!(
            state.produce_command("f1"),
            Some(Command::Produce { quantity: 3, .. })
        ));
        assert!(!state.edit_production("missing", |_| {}));
        Ok(())
    }

    #[test]
    fn admin_dashboard_tracks_prices_and_logs() {
        let first: AdminSnapshot = serde_json::from_str(
            r#"{"phase": 2, "turn": 5, "market_prices": {"A": 50},
                "logs": ["[09:00:00] Turn 5 begins"]}"#,
        )
        .expect("decode");
        let second: AdminSnapshot = serde_json::from_str(
            r#"{"phase": 3, "turn": 5, "market_prices": {"A": 65}, "logs": []}"#,
        )
        .expect("decode");

        let mut admin = AdminState::new();
        assert_eq!(admin.phase_and_turn(), None);
        assert!(admin.apply(first, Utc::now()));
        assert_eq!(
            admin.phase_and_turn(),
            Some(("Phase 2: Action".to_string(), "Turn 5".to_string()))
        );
        assert_eq!(admin.log_entries(), [(Some("09:00:00"), "Turn 5 begins")]);

        assert!(admin.apply(second, Utc::now()));
        assert_eq!(admin.prices().rows()[0].trend, crate::view::Trend::Up);
        assert!(admin.log_entries().is_empty());
        assert!(admin.last_poll_at().is_some());
    }
}
