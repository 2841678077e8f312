use anyhow::Result;
use chrono::Local;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use foundry_core::{
    net::{AdminAction, ClientEvent, Dispatcher},
    state::AdminState,
    view::Trend,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
    Frame,
};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::term::{
    self, confirm_key, render_confirm, AppEvent, Confirm, ConfirmOutcome, StatusKind, Theme,
};

/// Operator dashboard: phase control, market table, leaderboard and server log.
pub struct AdminApp {
    state: AdminState,
    dispatcher: Dispatcher,
    client_rx: Option<mpsc::Receiver<ClientEvent>>,
    server_url: String,
    theme: Theme,
    confirm: Option<Confirm<AdminAction>>,
    connected: bool,
    status: String,
    status_kind: StatusKind,
    should_quit: bool,
}

impl AdminApp {
    pub fn new(dispatcher: Dispatcher, server_url: String) -> Self {
        Self {
            state: AdminState::new(),
            dispatcher,
            client_rx: None,
            server_url,
            theme: Theme::default(),
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
        self.set_status(format!("Watching {}", self.server_url), StatusKind::Info);

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
                }
                true
            }
            Some(AppEvent::Input(_)) | Some(AppEvent::Tick) => true,
            None => false,
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::AdminSnapshot {
                snapshot,
                received_at,
            } => {
                self.connected = true;
                self.state.apply(*snapshot, received_at);
            }
            ClientEvent::PollFailed(err) => {
                if self.connected {
                    error!("lost connection: {err}");
                }
                self.connected = false;
            }
            ClientEvent::Accepted { action, message } => {
                info!(action, "admin action done");
                let message = message.unwrap_or_else(|| format!("{action} done"));
                self.set_status(message, StatusKind::Success);
            }
            ClientEvent::Failed { error, .. } => {
                self.set_status(error.user_message(), StatusKind::Error);
            }
            ClientEvent::Snapshot { .. }
            | ClientEvent::Registered(_)
            | ClientEvent::RegistrationFailed(_) => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.confirm.is_some() {
            match confirm_key(&mut self.confirm, &key) {
                ConfirmOutcome::Confirmed(action) => {
                    self.dispatcher.admin(action);
                    self.set_status(format!("Sending {}...", action.label()), StatusKind::Info);
                }
                ConfirmOutcome::Cancelled => self.set_status("Cancelled", StatusKind::Info),
                ConfirmOutcome::Pending => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('n') => {
                self.confirm = Some(Confirm::new(
                    "Next Phase",
                    "Advance to the next phase? This moves the game forward.",
                    AdminAction::NextPhase,
                ));
            }
            KeyCode::Char('r') => {
                self.confirm = Some(Confirm::new(
                    "Reset Game",
                    "Reset the game? Every player's data is wiped and cannot be restored.",
                    AdminAction::Reset,
                ));
            }
            _ => {}
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let area = frame.size();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Percentage(50),
                Constraint::Min(6),
                Constraint::Length(3),
            ])
            .split(area);

        self.render_header(frame, rows[0]);
        let tables = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(rows[1]);
        self.render_market(frame, tables[0]);
        self.render_leaderboard(frame, tables[1]);
        self.render_logs(frame, rows[2]);
        self.render_status(frame, rows[3]);

        if let Some(confirm) = self.confirm.as_ref() {
            render_confirm(frame, area, confirm);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            "FOUNDRY ADMIN ",
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        )];
        if let Some((phase, turn)) = self.state.phase_and_turn() {
            spans.push(Span::raw(format!(" {phase}  {turn} ")));
        }
        spans.push(match (self.connected, self.state.last_poll_at()) {
            (true, Some(at)) => Span::styled(
                format!(" synced {}", at.with_timezone(&Local).format("%H:%M:%S")),
                Style::default().fg(self.theme.muted),
            ),
            _ => Span::styled(" offline", Style::default().fg(self.theme.danger)),
        });
        let paragraph =
            Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_market(&self, frame: &mut Frame, area: Rect) {
        let rows = self.state.prices().rows().iter().map(|row| {
            let (arrow, color) = match row.trend {
                Trend::Up => ("▲", self.theme.success),
                Trend::Down => ("▼", self.theme.danger),
                Trend::Same => ("", self.theme.muted),
            };
            Row::new(vec![
                Cell::from(row.label.clone()),
                Cell::from(Span::styled(
                    format!("${} {arrow}", row.price),
                    Style::default().fg(color),
                )),
            ])
        });
        let table = Table::new(rows, [Constraint::Min(12), Constraint::Length(14)])
            .header(
                Row::new(vec!["Item", "Price"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(Block::default().borders(Borders::ALL).title("Market"));
        frame.render_widget(table, area);
    }

    fn render_leaderboard(&self, frame: &mut Frame, area: Rect) {
        let players = self
            .state
            .snapshot()
            .map(|snapshot| snapshot.players.as_slice())
            .unwrap_or(&[]);
        let rows = players.iter().enumerate().map(|(index, player)| {
            Row::new(vec![
                Cell::from(format!("#{}", index + 1)),
                Cell::from(Span::styled(
                    player.name.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Cell::from(Span::styled(
                    format!("${}", player.money),
                    Style::default().fg(self.theme.success),
                )),
                Cell::from(player.land.clone()),
                Cell::from(player.inventory_count.to_string()),
            ])
        });
        let table = Table::new(
            rows,
            [
                Constraint::Length(4),
                Constraint::Min(12),
                Constraint::Length(12),
                Constraint::Length(6),
                Constraint::Length(10),
            ],
        )
        .header(
            Row::new(vec!["Rank", "Company", "Money", "Land", "Inventory"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title("Leaderboard"));
        frame.render_widget(table, area);
    }

    fn render_logs(&self, frame: &mut Frame, area: Rect) {
        let entries = self.state.log_entries();
        let visible = area.height.saturating_sub(2) as usize;
        let skip = entries.len().saturating_sub(visible);
        let items: Vec<ListItem> = entries
            .into_iter()
            .skip(skip)
            .map(|(stamp, message)| {
                let mut spans = Vec::new();
                if let Some(stamp) = stamp {
                    spans.push(Span::styled(
                        format!("{stamp} "),
                        Style::default().fg(self.theme.muted),
                    ));
                }
                spans.push(Span::raw(message.to_string()));
                ListItem::new(Line::from(spans))
            })
            .collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Log"));
        frame.render_widget(list, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let help = "n next phase  r reset  q quit";
        let paragraph = Paragraph::new(Line::from(vec![
            Span::styled(
                self.status.clone(),
                Style::default().fg(self.theme.status_color(self.status_kind)),
            ),
            Span::styled(format!("   {help}"), Style::default().fg(self.theme.muted)),
        ]))
        .block(Block::default().borders(Borders::ALL).title("Status"));
        frame.render_widget(paragraph, area);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use foundry_core::{
        models::AdminSnapshot,
        net::{ClientError, GameClient, Poller},
    };

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn dashboard() -> AdminApp {
        let (tx, _rx) = mpsc::channel(4);
        let client = GameClient::new("http://127.0.0.1:9", None).expect("client builds");
        let poller = Poller::admin(client, tx, Duration::from_secs(60));
        AdminApp::new(Dispatcher::new(poller), "http://127.0.0.1:9".to_string())
    }

    fn admin_data(raw: &str) -> ClientEvent {
        let snapshot: AdminSnapshot = serde_json::from_str(raw).expect("admin data decodes");
        ClientEvent::AdminSnapshot {
            snapshot: Box::new(snapshot),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn actions_wait_for_confirmation() {
        let mut app = dashboard();
        app.handle_key(key(KeyCode::Char('r')));
        assert_eq!(
            app.confirm.as_ref().map(|confirm| confirm.action),
            Some(AdminAction::Reset)
        );

        // Inside the dialog `n` cancels instead of opening next phase.
        app.handle_key(key(KeyCode::Char('n')));
        assert!(app.confirm.is_none());
        assert_eq!(app.status, "Cancelled");

        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(
            app.confirm.as_ref().map(|confirm| confirm.action),
            Some(AdminAction::NextPhase)
        );
        app.handle_key(key(KeyCode::Esc));
        assert!(app.confirm.is_none());
    }

    #[test]
    fn poll_results_drive_connection_state() {
        let mut app = dashboard();
        app.handle_client_event(admin_data(
            r#"{"phase": 2, "turn": 5, "market_prices": {"iron_0": 100},
                "logs": ["[10:00:01] Phase advanced"]}"#,
        ));
        assert!(app.connected);
        assert_eq!(app.state.prices().rows().len(), 1);
        assert_eq!(app.state.log_entries(), [(Some("10:00:01"), "Phase advanced")]);

        app.handle_client_event(ClientEvent::PollFailed(ClientError::NotRegistered));
        assert!(!app.connected);
        assert!(app.state.snapshot().is_some());
    }

    #[test]
    fn refused_action_reports_the_server_detail() {
        let mut app = dashboard();
        app.handle_client_event(ClientEvent::Failed {
            action: AdminAction::Reset.label(),
            error: ClientError::Rejected {
                status: 403,
                detail: "Reset is locked".to_string(),
            },
        });
        assert_eq!(app.status_kind, StatusKind::Error);
        assert!(app.status.contains("Reset is locked"));
    }
}
