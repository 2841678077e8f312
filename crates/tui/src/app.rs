use anyhow::Result;
use chrono::Local;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use foundry_core::{
    identity::IdentityStore,
    models::Phase,
    net::{ClientEvent, Command, Dispatcher},
    rules::{Action, SpecialKind, Validator},
    state::{ClientState, TradeMode, PAYMENT_SLOTS},
    view::{ActionArea, FacilityNode, ProductionKind},
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::term::{
    self, centered, confirm_key, render_confirm, AppEvent, Confirm, ConfirmOutcome,
    StatusKind, Theme,
};

const MAX_NAME_LEN: usize = 32;
const MAX_NUMBER_LEN: usize = 9;
const MINER_PRICE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Facilities,
    Build,
    Trade,
    Bank,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Self::Facilities => Self::Build,
            Self::Build => Self::Trade,
            Self::Trade => Self::Bank,
            Self::Bank => Self::Facilities,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Facilities => "Facilities",
            Self::Build => "Build",
            Self::Trade => "Trade",
            Self::Bank => "Bank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildField {
    Slot(usize),
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TradeField {
    Item,
    Price,
    Quantity,
}

#[derive(Debug, Clone)]
struct NamePromptModal {
    input: String,
    cursor: usize,
}

impl NamePromptModal {
    fn new() -> Self {
        Self {
            input: String::new(),
            cursor: 0,
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.input.len() as isize;
        self.cursor = (self.cursor as isize + delta).clamp(0, len) as usize;
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.input.len();
    }

    fn insert(&mut self, ch: char) {
        if self.input.len() >= MAX_NAME_LEN {
            return;
        }
        if ch.is_ascii() && !ch.is_ascii_control() {
            self.input.insert(self.cursor, ch);
            self.cursor += ch.len_utf8();
        }
    }

    fn backspace(&mut self) {
        if self.cursor > 0 && self.cursor <= self.input.len() {
            self.cursor -= 1;
            self.input.remove(self.cursor);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.input.len() {
            self.input.remove(self.cursor);
        }
    }
}

/// Digits-only text field.
#[derive(Debug, Clone, Default)]
struct NumberField {
    text: String,
}

impl NumberField {
    fn with(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    fn edit(&mut self, key: &KeyEvent) -> bool {
        edit_digits(&mut self.text, key)
    }

    fn as_i64(&self) -> i64 {
        self.text.trim().parse().unwrap_or(0)
    }

    fn as_u32(&self) -> u32 {
        self.text.trim().parse().unwrap_or(0)
    }
}

fn clamp_cursor(cursor: usize, len: usize) -> usize {
    cursor.min(len.saturating_sub(1))
}

fn edit_digits(text: &mut String, key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(ch) if ch.is_ascii_digit() => {
            if text.len() < MAX_NUMBER_LEN {
                text.push(ch);
            }
            true
        }
        KeyCode::Backspace => {
            text.pop();
            true
        }
        _ => false,
    }
}

/// Terminal front-end for the Foundry client.
pub struct FoundryApp {
    state: ClientState,
    identity: IdentityStore,
    dispatcher: Dispatcher,
    client_rx: Option<mpsc::Receiver<ClientEvent>>,
    server_url: String,
    theme: Theme,
    focus: Focus,
    facility_cursor: usize,
    build_field: BuildField,
    special_cursor: usize,
    trade_field: TradeField,
    trade_price: NumberField,
    trade_quantity: NumberField,
    bank_quantity: NumberField,
    picker_cursor: usize,
    name_prompt: Option<NamePromptModal>,
    confirm: Option<Confirm<Command>>,
    connected: bool,
    status: String,
    status_kind: StatusKind,
    should_quit: bool,
}

impl FoundryApp {
    pub fn new(identity: IdentityStore, dispatcher: Dispatcher, server_url: String) -> Self {
        let name_prompt = (!identity.is_registered()).then(NamePromptModal::new);
        Self {
            state: ClientState::new(),
            identity,
            dispatcher,
            client_rx: None,
            server_url,
            theme: Theme::default(),
            focus: Focus::Facilities,
            build_field: BuildField::Slot(0),
            special_cursor: 0,
            facility_cursor: 0,
            trade_field: TradeField::Item,
            trade_price: NumberField::default(),
            trade_quantity: NumberField::with("1"),
            bank_quantity: NumberField::with("1"),
            picker_cursor: 0,
            name_prompt,
            confirm: None,
            connected: false,
            status: String::new(),
            status_kind: StatusKind::Info,
            should_quit: false,
        }
    }

    pub fn attach_client(&mut self, receiver: mpsc::Receiver<ClientEvent>) {
        self.client_rx = Some(receiver);
    }

    pub async fn run(&mut self) -> Result<()> {
        self.set_status(format!("Connecting to {}", self.server_url), StatusKind::Info);

        let mut terminal = term::enter_terminal()?;
        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        term::spawn_input_thread(event_tx);

        let mut client_rx = self.client_rx.take();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }

            if let Some(rx) = client_rx.as_mut() {
                let mut client_closed = false;
                tokio::select! {
                    maybe_event = event_rx.recv() => {
                        if !self.process_app_event(maybe_event) {
                            break;
                        }
                    }
                    maybe_client = rx.recv() => {
                        match maybe_client {
                            Some(event) => self.handle_client_event(event),
                            None => client_closed = true,
                        }
                    }
                }
                if client_closed {
                    client_rx = None;
                }
            } else {
                let maybe_event = event_rx.recv().await;
                if !self.process_app_event(maybe_event) {
                    break;
                }
            }
        }

        term::restore_terminal(&mut terminal)?;
        Ok(())
    }

    fn set_status(&mut self, message: impl Into<String>, kind: StatusKind) {
        self.status = message.into();
        self.status_kind = kind;
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) => {
                if key.kind == KeyEventKind::Press {
                    self.handle_key(key);
                    self.sync_dropdown_focus();
                }
                true
            }
            Some(AppEvent::Input(_)) | Some(AppEvent::Tick) => true,
            None => false,
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Snapshot {
                snapshot,
                player_id,
                received_at,
            } => {
                self.connected = true;
                let outcome = self.state.apply_snapshot(
                    *snapshot,
                    player_id.as_deref(),
                    &self.identity,
                    received_at,
                );
                if !outcome.reconcile.is_quiet() {
                    debug!(
                        rebuilt = outcome.reconcile.rebuilt,
                        patched = outcome.reconcile.patched.len(),
                        "facility view updated"
                    );
                }
                if outcome.stale_identity {
                    self.name_prompt = Some(NamePromptModal::new());
                    self.set_status(
                        "The game was reset. Register your company again.",
                        StatusKind::Error,
                    );
                }
                self.clamp_facility_cursor();
                self.clamp_picker_cursor();
            }
            ClientEvent::PollFailed(err) => {
                if self.connected {
                    error!("lost connection: {err}");
                }
                self.connected = false;
            }
            ClientEvent::Accepted { action, message } => {
                let message = message.unwrap_or_else(|| format!("{action} done"));
                self.set_status(message, StatusKind::Success);
            }
            ClientEvent::Failed { error, .. } => {
                self.set_status(error.user_message(), StatusKind::Error);
            }
            ClientEvent::Registered(identity) => {
                info!(player_id = %identity.player_id, "registered");
                self.name_prompt = None;
                self.set_status(
                    format!("Company {} registered", identity.name),
                    StatusKind::Success,
                );
            }
            ClientEvent::RegistrationFailed(message) => {
                self.set_status(message, StatusKind::Error);
            }
            ClientEvent::AdminSnapshot { .. } => {}
        }
    }

    fn submit(&mut self, command: Command) {
        let label = command.label();
        match self.dispatcher.submit(command) {
            Ok(_) => self.set_status(format!("Sending {label}..."), StatusKind::Info),
            Err(err) => self.set_status(err.user_message(), StatusKind::Error),
        }
    }

    fn phase(&self) -> Option<Phase> {
        self.state.snapshot().map(|snapshot| snapshot.phase)
    }

    fn selected_node(&self) -> Option<&FacilityNode> {
        self.state.facilities.nodes().get(self.facility_cursor)
    }

    fn clamp_facility_cursor(&mut self) {
        self.facility_cursor = clamp_cursor(self.facility_cursor, self.state.facilities.len());
    }

    /// A poll can empty inventory slots under the picker.
    fn clamp_picker_cursor(&mut self) {
        self.picker_cursor = clamp_cursor(self.picker_cursor, self.picker_codes().len());
    }

    /// Dropdowns the player is actively cycling must not be refreshed.
    fn sync_dropdown_focus(&mut self) {
        let trade = self.focus == Focus::Trade && self.trade_field == TradeField::Item;
        self.state.trade_item.set_focused(trade);
        self.state.bank_item.set_focused(self.focus == Focus::Bank);
        for (index, slot) in self.state.payment_slots.iter_mut().enumerate() {
            slot.set_focused(self.focus == Focus::Build && self.build_field == BuildField::Slot(index));
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.name_prompt.is_some() {
            self.handle_name_prompt_key(key);
            return;
        }
        if self.state.news.is_open() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.state.news.dismiss();
            }
            return;
        }
        if self.confirm.is_some() {
            self.handle_confirm_key(key);
            return;
        }
        if self.state.selection().is_some() {
            self.handle_picker_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.next().next().next();
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::Facilities => self.handle_facility_key(key),
            Focus::Build => self.handle_build_key(key),
            Focus::Trade => self.handle_trade_key(key),
            Focus::Bank => self.handle_bank_key(key),
        }
    }

    fn handle_name_prompt_key(&mut self, key: KeyEvent) {
        let mut submit: Option<String> = None;
        if let Some(prompt) = self.name_prompt.as_mut() {
            match key.code {
                KeyCode::Esc => self.should_quit = true,
                KeyCode::Enter => submit = Some(prompt.input.clone()),
                KeyCode::Left => prompt.move_cursor(-1),
                KeyCode::Right => prompt.move_cursor(1),
                KeyCode::Home => prompt.move_home(),
                KeyCode::End => prompt.move_end(),
                KeyCode::Backspace => prompt.backspace(),
                KeyCode::Delete => prompt.delete(),
                KeyCode::Char(ch) => {
                    if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                        prompt.insert(ch);
                    }
                }
                _ => {}
            }
        }

        if let Some(name) = submit {
            match self.dispatcher.register(&name) {
                Ok(_) => self.set_status(format!("Registering {}...", name.trim()), StatusKind::Info),
                Err(err) => self.set_status(err.user_message(), StatusKind::Error),
            }
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match confirm_key(&mut self.confirm, &key) {
            ConfirmOutcome::Confirmed(command) => self.submit(command),
            ConfirmOutcome::Cancelled => self.set_status("Demolition cancelled", StatusKind::Info),
            ConfirmOutcome::Pending => {}
        }
    }

    fn picker_codes(&self) -> Vec<String> {
        self.state
            .player()
            .map(|player| {
                player
                    .inventory
                    .iter()
                    .filter(|(_, qty)| **qty > 0)
                    .map(|(code, _)| code.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn handle_picker_key(&mut self, key: KeyEvent) {
        let codes = self.picker_codes();
        match key.code {
            KeyCode::Esc => {
                self.state.cancel_selection();
                self.set_status("Selection cancelled", StatusKind::Info);
            }
            KeyCode::Up => self.picker_cursor = self.picker_cursor.saturating_sub(1),
            KeyCode::Down => {
                if self.picker_cursor + 1 < codes.len() {
                    self.picker_cursor += 1;
                }
            }
            KeyCode::Char(' ') => {
                let Some(code) = codes.get(self.picker_cursor) else {
                    return;
                };
                if let Err(reason) = self.state.toggle_material(code) {
                    self.set_status(format!("{code}: {reason}"), StatusKind::Error);
                }
            }
            KeyCode::Enter => match self.state.confirm_selection() {
                Ok(command) => self.submit(command),
                Err(reason) => self.set_status(reason.to_string(), StatusKind::Error),
            },
            _ => {}
        }
    }

    fn open_picker(&mut self, action: Action) {
        if self.state.player().is_none() {
            self.set_status("Waiting for player data", StatusKind::Error);
            return;
        }
        self.picker_cursor = 0;
        self.set_status(format!("Select materials for {action}"), StatusKind::Info);
        self.state.begin_selection(action);
    }

    fn require_phase(&mut self, phase: Phase) -> bool {
        if self.phase() == Some(phase) {
            return true;
        }
        self.set_status(
            format!("Only available during the {} phase", phase.label()),
            StatusKind::Error,
        );
        false
    }

    fn handle_facility_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => self.facility_cursor = self.facility_cursor.saturating_sub(1),
            KeyCode::Down => {
                self.facility_cursor += 1;
                self.clamp_facility_cursor();
            }
            _ => {}
        }

        let Some(node) = self.selected_node() else {
            return;
        };
        let id = node.id.clone();
        let title = node.title.clone();
        let cost = node.demolish_cost;
        let upgradable = node.upgrade_hint.is_some();

        match key.code {
            KeyCode::Left => {
                self.state.edit_production(&id, |input| input.product.cycle(-1));
            }
            KeyCode::Right => {
                self.state.edit_production(&id, |input| input.product.cycle(1));
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                self.state.edit_production(&id, |input| {
                    if let Some(text) = input.quantity_text_mut() {
                        edit_digits(text, &key);
                    }
                });
            }
            KeyCode::Backspace => {
                self.state.edit_production(&id, |input| {
                    if let Some(text) = input.quantity_text_mut() {
                        text.pop();
                    }
                });
            }
            KeyCode::Enter | KeyCode::Char('p') => match self.state.produce_command(&id) {
                Some(command) => self.submit(command),
                None => self.set_status("Nothing to produce here", StatusKind::Error),
            },
            KeyCode::Char('u') if self.require_phase(Phase::Action) => {
                if upgradable {
                    self.open_picker(Action::Upgrade { facility_id: id });
                } else {
                    self.set_status(format!("{title} cannot be upgraded"), StatusKind::Error);
                }
            }
            KeyCode::Char('x') if self.require_phase(Phase::Action) => {
                self.confirm = Some(Confirm::new(
                    "Demolish",
                    format!("Demolish {title} for ${cost}?"),
                    Command::Demolish { factory_id: id },
                ));
            }
            _ => {}
        }
    }

    fn handle_build_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => {
                self.build_field = match self.build_field {
                    BuildField::Slot(0) => BuildField::Special,
                    BuildField::Slot(index) => BuildField::Slot(index - 1),
                    BuildField::Special => BuildField::Slot(PAYMENT_SLOTS - 1),
                };
            }
            KeyCode::Down => {
                self.build_field = match self.build_field {
                    BuildField::Slot(index) if index + 1 < PAYMENT_SLOTS => BuildField::Slot(index + 1),
                    BuildField::Slot(_) => BuildField::Special,
                    BuildField::Special => BuildField::Slot(0),
                };
            }
            KeyCode::Left | KeyCode::Right => {
                let step = if key.code == KeyCode::Left { -1 } else { 1 };
                match self.build_field {
                    BuildField::Slot(index) => self.state.payment_slots[index].cycle(step),
                    BuildField::Special => {
                        let len = SpecialKind::ALL.len() as isize;
                        self.special_cursor =
                            (self.special_cursor as isize + step).rem_euclid(len) as usize;
                    }
                }
            }
            KeyCode::Char('m') if self.require_phase(Phase::Action) => {
                self.state.begin_selection(Action::BuildMiner);
                match self.state.confirm_selection() {
                    Ok(command) => self.submit(command),
                    Err(reason) => self.set_status(reason.to_string(), StatusKind::Error),
                }
            }
            KeyCode::Char('b') if self.require_phase(Phase::Action) => {
                match self.state.build_processor_from_slots() {
                    Ok(command) => self.submit(command),
                    Err(reason) => self.set_status(reason.to_string(), StatusKind::Error),
                }
            }
            KeyCode::Char('s') | KeyCode::Enter
                if self.build_field == BuildField::Special && self.require_phase(Phase::Action) =>
            {
                let kind = SpecialKind::ALL[self.special_cursor];
                self.open_picker(Action::SpecialBuild(kind));
            }
            _ => {}
        }
    }

    fn handle_trade_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => {
                self.trade_field = match self.trade_field {
                    TradeField::Item => TradeField::Quantity,
                    TradeField::Price => TradeField::Item,
                    TradeField::Quantity => TradeField::Price,
                };
            }
            KeyCode::Down => {
                self.trade_field = match self.trade_field {
                    TradeField::Item => TradeField::Price,
                    TradeField::Price => TradeField::Quantity,
                    TradeField::Quantity => TradeField::Item,
                };
            }
            KeyCode::Char('g') => {
                let next = match self.state.trade_mode() {
                    TradeMode::Market => TradeMode::Government,
                    TradeMode::Government => TradeMode::Market,
                };
                self.state.set_trade_mode(next);
            }
            KeyCode::Char('o') => self.state.cycle_order_type(),
            KeyCode::Left if self.trade_field == TradeField::Item => {
                self.state.trade_item.cycle(-1)
            }
            KeyCode::Right if self.trade_field == TradeField::Item => {
                self.state.trade_item.cycle(1)
            }
            KeyCode::Enter if self.require_phase(Phase::Trading) => {
                let Some(item_id) = self.state.trade_item.selected_value().map(str::to_string)
                else {
                    self.set_status("Select an item first", StatusKind::Error);
                    return;
                };
                self.submit(Command::Trade {
                    order_type: self.state.order_type(),
                    item_id,
                    price: self.trade_price.as_i64(),
                    quantity: self.trade_quantity.as_u32(),
                });
            }
            _ => match self.trade_field {
                TradeField::Price => {
                    self.trade_price.edit(&key);
                }
                TradeField::Quantity => {
                    self.trade_quantity.edit(&key);
                }
                TradeField::Item => {}
            },
        }
    }

    fn handle_bank_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Left => self.state.bank_item.cycle(-1),
            KeyCode::Right => self.state.bank_item.cycle(1),
            KeyCode::Enter if self.require_phase(Phase::Trading) => {
                let Some(item_id) = self.state.bank_item.selected_value().map(str::to_string)
                else {
                    self.set_status("Select an item first", StatusKind::Error);
                    return;
                };
                self.submit(Command::BankSell {
                    item_id,
                    quantity: self.bank_quantity.as_u32(),
                });
            }
            _ => {
                self.bank_quantity.edit(&key);
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let area = frame.size();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(3),
            ])
            .split(area);

        self.render_header(frame, rows[0]);
        self.render_ticker(frame, rows[1]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(28),
                Constraint::Min(40),
                Constraint::Length(44),
            ])
            .split(rows[2]);
        self.render_inventory(frame, body[0]);
        self.render_facilities(frame, body[1]);
        self.render_side_panel(frame, body[2]);
        self.render_status(frame, rows[3]);

        if self.state.selection().is_some() {
            self.render_picker(frame, area);
        }
        if let Some(confirm) = self.confirm.as_ref() {
            render_confirm(frame, area, confirm);
        }
        if self.state.game_over().is_some() {
            self.render_game_over(frame, area);
        }
        if self.state.news.is_open() {
            self.render_news(frame, area);
        }
        if let Some(prompt) = &self.name_prompt {
            self.render_name_prompt(frame, prompt);
        }
    }

    fn panel(&self, title: &str, focused: bool) -> Block<'static> {
        let style = if focused {
            Style::default().fg(self.theme.accent)
        } else {
            Style::default()
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(style)
            .title(title.to_string())
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            "FOUNDRY ",
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        )];
        let header = self.state.phase_header();
        if !header.is_empty() {
            spans.push(Span::raw(format!(" {header} ")));
        }
        if let Some(player) = self.state.player() {
            spans.push(Span::styled(
                format!(" {} ", player.name),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!(" ${} ", player.money),
                Style::default().fg(self.theme.success),
            ));
        }
        if let Some(land) = self.state.land_readout() {
            spans.push(Span::raw(format!(" Land {land} ")));
        }
        let link = match (self.connected, self.state.last_poll_at()) {
            (true, Some(at)) => Span::styled(
                format!(" synced {}", at.with_timezone(&Local).format("%H:%M:%S")),
                Style::default().fg(self.theme.muted),
            ),
            _ => Span::styled(" offline", Style::default().fg(self.theme.danger)),
        };
        spans.push(link);

        let paragraph = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_ticker(&self, frame: &mut Frame, area: Rect) {
        let text = self.state.ticker().unwrap_or_default();
        let paragraph = Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(self.theme.warning),
        )))
        .block(Block::default().borders(Borders::ALL).title("News"));
        frame.render_widget(paragraph, area);
    }

    fn render_inventory(&self, frame: &mut Frame, area: Rect) {
        let lines = self.state.inventory_lines();
        let items: Vec<ListItem> = if lines.is_empty() {
            vec![ListItem::new(Span::styled(
                "(warehouse is empty)",
                Style::default()
                    .fg(self.theme.muted)
                    .add_modifier(Modifier::ITALIC),
            ))]
        } else {
            lines
                .into_iter()
                .map(|(label, qty)| {
                    ListItem::new(Line::from(vec![
                        Span::raw(label),
                        Span::styled(format!(" x{qty}"), Style::default().fg(self.theme.accent)),
                    ]))
                })
                .collect()
        };
        frame.render_widget(List::new(items).block(self.panel("Warehouse", false)), area);
    }

    fn render_facilities(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Facilities;
        let halves = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);

        let items: Vec<ListItem> = self
            .state
            .facilities
            .nodes()
            .iter()
            .map(|node| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("Lv.{} ", node.tier),
                        Style::default().fg(self.theme.tier_color(node.tier)),
                    ),
                    Span::styled(node.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(
                        format!("  {}", action_summary(&node.action)),
                        Style::default().fg(self.theme.muted),
                    ),
                ]))
            })
            .collect();

        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(self.facility_cursor));
        }
        let list = List::new(items)
            .block(self.panel("Facilities", focused))
            .highlight_style(
                Style::default()
                    .bg(self.theme.selection_bg)
                    .fg(self.theme.selection_fg),
            )
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, halves[0], &mut list_state);

        let detail = match self.selected_node() {
            Some(node) => self.facility_detail(node),
            None => vec![Line::from(Span::styled(
                "No facilities yet. Build a collector from the Build panel.",
                Style::default().fg(self.theme.muted),
            ))],
        };
        let paragraph = Paragraph::new(detail)
            .block(self.panel("Details", false))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, halves[1]);
    }

    fn facility_detail(&self, node: &FacilityNode) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(Span::styled(
            format!("{} (Lv.{})", node.title, node.tier),
            Style::default().add_modifier(Modifier::BOLD),
        ))];

        match &node.action {
            ActionArea::WaitingForActionPhase => lines.push(Line::from(Span::styled(
                "Waiting for the action phase...",
                Style::default().fg(self.theme.muted),
            ))),
            ActionArea::Passive => lines.push(Line::from(Span::styled(
                "Passive effect active",
                Style::default().fg(self.theme.warning),
            ))),
            ActionArea::MinedThisTurn => lines.push(Line::from("Already mined this turn")),
            ActionArea::NoRecipes => lines.push(Line::from("No recipes available")),
            ActionArea::Production { kind, input } => {
                let product = input
                    .product
                    .selected_option()
                    .map(|option| option.label.clone())
                    .unwrap_or_default();
                let verb = match kind {
                    ProductionKind::Mine => "Mine",
                    ProductionKind::Manufacture | ProductionKind::Diamond => "Produce",
                };
                let mut spans = vec![Span::raw(format!("{verb}: < {product} >"))];
                if let Some(quantity) = input.quantity_text() {
                    spans.push(Span::raw(format!("  qty [{quantity}]")));
                }
                lines.push(Line::from(spans));

                if let Some(readout) = node.readout.as_ref() {
                    let verdict = if readout.is_satisfied() {
                        "ready"
                    } else {
                        "missing inputs"
                    };
                    lines.push(Line::from(format!(
                        "Recipe (x{}): {verdict}",
                        readout.quantity
                    )));
                    for line in &readout.lines {
                        let (mark, color) = if line.is_met() {
                            ("ok", self.theme.success)
                        } else {
                            ("short", self.theme.danger)
                        };
                        lines.push(Line::from(Span::styled(
                            format!(
                                "  {}: {} (have {}) {mark}",
                                line.label, line.required, line.owned
                            ),
                            Style::default().fg(color),
                        )));
                    }
                }
            }
        }

        if node.actions_enabled() {
            if let Some(hint) = node.upgrade_hint {
                lines.push(Line::from(format!("[u] upgrade: needs {hint}")));
            }
            lines.push(Line::from(format!(
                "[x] demolish (cost ${})",
                node.demolish_cost
            )));
        }
        lines
    }

    fn render_side_panel(&self, frame: &mut Frame, area: Rect) {
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(9),
                Constraint::Length(8),
                Constraint::Min(5),
            ])
            .split(area);
        self.render_build(frame, parts[0]);
        self.render_trade(frame, parts[1]);
        self.render_bank(frame, parts[2]);
    }

    fn field_style(&self, active: bool) -> Style {
        if active {
            Style::default()
                .bg(self.theme.selection_bg)
                .fg(self.theme.selection_fg)
        } else {
            Style::default()
        }
    }

    fn render_build(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Build;
        let mut lines = vec![Line::from(format!(
            "[m] collector ${MINER_PRICE}  [b] processor"
        ))];
        for (index, slot) in self.state.payment_slots.iter().enumerate() {
            let label = slot
                .selected_option()
                .map(|option| option.label.clone())
                .unwrap_or_else(|| "None".to_string());
            let active = focused && self.build_field == BuildField::Slot(index);
            lines.push(Line::from(Span::styled(
                format!("Material {}: < {label} >", index + 1),
                self.field_style(active),
            )));
        }
        let kind = SpecialKind::ALL[self.special_cursor];
        let active = focused && self.build_field == BuildField::Special;
        lines.push(Line::from(Span::styled(
            format!("Special: < {} >  [s] pick materials", kind.label()),
            self.field_style(active),
        )));
        let paragraph = Paragraph::new(lines)
            .block(self.panel(Focus::Build.title(), focused))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_trade(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Trade;
        let item = self
            .state
            .trade_item
            .selected_option()
            .map(|option| option.label.clone())
            .unwrap_or_default();
        let lines = vec![
            Line::from(format!(
                "[g] {}  [o] {}",
                self.state.trade_mode().label(),
                self.state.order_type().as_str()
            )),
            Line::from(Span::styled(
                format!("Item: < {item} >"),
                self.field_style(focused && self.trade_field == TradeField::Item),
            )),
            Line::from(Span::styled(
                format!("Price: {}", self.trade_price.text),
                self.field_style(focused && self.trade_field == TradeField::Price),
            )),
            Line::from(Span::styled(
                format!("Quantity: {}", self.trade_quantity.text),
                self.field_style(focused && self.trade_field == TradeField::Quantity),
            )),
        ];
        let paragraph = Paragraph::new(lines).block(self.panel(Focus::Trade.title(), focused));
        frame.render_widget(paragraph, area);
    }

    fn render_bank(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Bank;
        let item = self
            .state
            .bank_item
            .selected_option()
            .map(|option| option.label.clone())
            .unwrap_or_default();
        let lines = vec![
            Line::from(format!("Sell: < {item} >")),
            Line::from(format!("Quantity: {}", self.bank_quantity.text)),
            Line::from(Span::styled(
                "Enter to sell raw materials",
                Style::default().fg(self.theme.muted),
            )),
        ];
        let paragraph = Paragraph::new(lines).block(self.panel(Focus::Bank.title(), focused));
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let color = self.theme.status_color(self.status_kind);
        let help = "Tab panel  arrows move  Enter act  q quit";
        let paragraph = Paragraph::new(Line::from(vec![
            Span::styled(self.status.clone(), Style::default().fg(color)),
            Span::styled(format!("   {help}"), Style::default().fg(self.theme.muted)),
        ]))
        .block(Block::default().borders(Borders::ALL).title("Status"));
        frame.render_widget(paragraph, area);
    }

    fn render_picker(&self, frame: &mut Frame, area: Rect) {
        let (Some(selection), Some(snapshot)) = (self.state.selection(), self.state.snapshot())
        else {
            return;
        };
        let Some(player) = snapshot.player.as_ref() else {
            return;
        };
        let area = centered(area, 64, 18);
        frame.render_widget(Clear, area);

        let validator = Validator::for_snapshot(snapshot);
        let items: Vec<ListItem> = selection
            .candidates(&validator, player)
            .into_iter()
            .map(|candidate| {
                let mark = if candidate.selected { "[x]" } else { "[ ]" };
                let label = snapshot.label_of(&candidate.code).to_string();
                let (note, style) = match &candidate.verdict {
                    Ok(()) => (String::new(), Style::default()),
                    Err(reason) => (
                        format!("  {reason}"),
                        Style::default().fg(self.theme.muted),
                    ),
                };
                ListItem::new(Line::from(Span::styled(
                    format!("{mark} {label} x{}{note}", candidate.owned),
                    style,
                )))
            })
            .collect();

        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(self.picker_cursor.min(items.len() - 1)));
        }
        let title = format!(
            "{}  (Space toggle, Enter confirm, Esc cancel)",
            selection.action()
        );
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .bg(self.theme.selection_bg)
                    .fg(self.theme.selection_fg),
            );
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_news(&self, frame: &mut Frame, area: Rect) {
        let event = self.state.event();
        let area = centered(area, 60, 12);
        frame.render_widget(Clear, area);
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                event.title,
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(event.description),
            Line::from(""),
            Line::from(Span::styled(
                event.effect_text,
                Style::default().fg(self.theme.accent),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Enter to continue",
                Style::default().fg(self.theme.muted),
            )),
        ])
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Breaking News"));
        frame.render_widget(paragraph, area);
    }

    fn render_game_over(&self, frame: &mut Frame, area: Rect) {
        let Some(view) = self.state.game_over() else {
            return;
        };
        let area = centered(area, 60, 20);
        frame.render_widget(Clear, area);

        let mut lines = Vec::new();
        if let (Some(rank), Some(index)) = (view.own_rank(), view.own_index) {
            let scores = &view.ranking[index].scores;
            lines.push(Line::from(Span::styled(
                format!("You finished #{rank}"),
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("Total assets: ${}", scores.total_score)));
            lines.push(Line::from(format!(
                "Cash ${} | Inventory ${} | Facilities ${}",
                scores.cash.unwrap_or(0),
                scores.inventory_value.unwrap_or(0),
                scores.factory_value.unwrap_or(0)
            )));
            lines.push(Line::from(""));
        }
        for (index, entry) in view.ranking.iter().enumerate() {
            let own = view.own_index == Some(index);
            let style = if own {
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let suffix = if own { " (you)" } else { "" };
            lines.push(Line::from(Span::styled(
                format!(
                    "#{} {} - ${}{suffix}",
                    index + 1,
                    entry.name,
                    entry.scores.total_score
                ),
                style,
            )));
        }
        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Game Over"));
        frame.render_widget(paragraph, area);
    }

    fn render_name_prompt(&self, frame: &mut Frame, prompt: &NamePromptModal) {
        let area = centered(frame.size(), 60, 7);
        frame.render_widget(Clear, area);

        let input_line = Line::from(vec![
            Span::styled("> ", Style::default().fg(self.theme.accent)),
            Span::raw(prompt.input.clone()),
        ]);
        let helper = Line::from(vec![
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" register  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" quit"),
        ]);
        let paragraph = Paragraph::new(vec![
            Line::from("Company name"),
            input_line,
            Line::from(""),
            helper,
        ])
        .block(Block::default().borders(Borders::ALL).title("Register"))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);

        let cursor_x =
            (area.x + 3 + prompt.cursor as u16).min(area.x + area.width.saturating_sub(2));
        frame.set_cursor(cursor_x, area.y + 2);
    }
}

fn action_summary(action: &ActionArea) -> &'static str {
    match action {
        ActionArea::WaitingForActionPhase => "waiting",
        ActionArea::Passive => "passive",
        ActionArea::MinedThisTurn => "mined",
        ActionArea::Production { .. } => "ready",
        ActionArea::NoRecipes => "no recipes",
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashMap},
        time::Duration,
    };

    use chrono::Utc;
    use foundry_core::{
        models::{PlayerState, Snapshot},
        net::{GameClient, Poller},
    };

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> FoundryApp {
        let identity = IdentityStore::open(
            std::env::temp_dir()
                .join("foundry-app-tests")
                .join("unregistered.json"),
        );
        let (tx, _rx) = mpsc::channel(4);
        let client = GameClient::new("http://127.0.0.1:9", None).expect("client builds");
        let poller = Poller::new(client, identity.clone(), tx, Duration::from_secs(60));
        FoundryApp::new(identity, Dispatcher::new(poller), "http://127.0.0.1:9".to_string())
    }

    fn holding(items: &[(&str, u32)]) -> ClientEvent {
        let snapshot = Snapshot {
            phase: Phase::Action,
            turn: 1,
            event: None,
            gov_event: None,
            market_prices: HashMap::new(),
            items_meta: BTreeMap::new(),
            player: Some(PlayerState {
                name: "Acme".to_string(),
                money: 0,
                inventory: items
                    .iter()
                    .map(|(code, qty)| (code.to_string(), *qty))
                    .collect(),
                factories: Vec::new(),
                land_limit: 3,
            }),
            final_ranking: None,
        };
        ClientEvent::Snapshot {
            snapshot: Box::new(snapshot),
            player_id: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn picker_cursor_follows_shrinking_inventory() {
        let mut app = app();
        app.handle_client_event(holding(&[("a", 1), ("b", 2), ("c", 3)]));
        app.picker_cursor = 2;

        app.handle_client_event(holding(&[("a", 1), ("b", 0), ("c", 0)]));
        assert_eq!(app.picker_cursor, 0);
        assert_eq!(app.picker_codes().get(app.picker_cursor).map(String::as_str), Some("a"));

        app.handle_client_event(holding(&[]));
        assert_eq!(app.picker_cursor, 0);
    }

    #[test]
    fn cursors_clamp_to_the_last_row() {
        assert_eq!(clamp_cursor(5, 3), 2);
        assert_eq!(clamp_cursor(1, 3), 1);
        assert_eq!(clamp_cursor(4, 0), 0);
    }

    #[test]
    fn name_prompt_edits_at_cursor() {
        let mut prompt = NamePromptModal::new();
        for ch in "Acm".chars() {
            prompt.insert(ch);
        }
        prompt.move_cursor(-1);
        prompt.insert('x');
        assert_eq!(prompt.input, "Acxm");
        prompt.move_end();
        prompt.backspace();
        prompt.move_home();
        prompt.delete();
        assert_eq!(prompt.input, "cx");
        prompt.insert('\n');
        assert_eq!(prompt.input, "cx");
    }

    #[test]
    fn number_fields_only_take_digits() {
        let mut field = NumberField::with("1");
        assert!(field.edit(&key(KeyCode::Char('2'))));
        assert!(!field.edit(&key(KeyCode::Char('a'))));
        assert_eq!(field.as_u32(), 12);
        field.edit(&key(KeyCode::Backspace));
        field.edit(&key(KeyCode::Backspace));
        assert_eq!(field.as_i64(), 0);
    }

    #[test]
    fn focus_cycles_through_every_panel() {
        let start = Focus::Facilities;
        assert_eq!(start.next().next().next().next(), start);
        assert_eq!(start.next().title(), "Build");
    }
}
