use std::{cmp, io, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;

pub(crate) const TICK_RATE: Duration = Duration::from_millis(250);

pub(crate) type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[derive(Debug, Clone)]
pub(crate) struct Theme {
    pub accent: Color,
    pub muted: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub success: Color,
    pub warning: Color,
    pub danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            selection_fg: Color::White,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusKind {
    Info,
    Success,
    Error,
}

impl Theme {
    pub fn status_color(&self, kind: StatusKind) -> Color {
        match kind {
            StatusKind::Info => self.accent,
            StatusKind::Success => self.success,
            StatusKind::Error => self.danger,
        }
    }

    pub fn tier_color(&self, tier: u8) -> Color {
        match tier {
            0 => Color::Gray,
            1 => Color::Blue,
            2 => Color::Magenta,
            _ => self.warning,
        }
    }
}

pub(crate) enum AppEvent {
    Input(Event),
    Tick,
}

/// A yes/no dialog guarding an action of type `T`.
pub(crate) struct Confirm<T> {
    pub title: &'static str,
    pub prompt: String,
    pub action: T,
}

impl<T> Confirm<T> {
    pub fn new(title: &'static str, prompt: impl Into<String>, action: T) -> Self {
        Self {
            title,
            prompt: prompt.into(),
            action,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConfirmOutcome<T> {
    Confirmed(T),
    Cancelled,
    Pending,
}

/// Resolve the open dialog in `slot` against a key press.
pub(crate) fn confirm_key<T>(slot: &mut Option<Confirm<T>>, key: &KeyEvent) -> ConfirmOutcome<T> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Enter => match slot.take() {
            Some(confirm) => ConfirmOutcome::Confirmed(confirm.action),
            None => ConfirmOutcome::Pending,
        },
        KeyCode::Char('n') | KeyCode::Esc => {
            *slot = None;
            ConfirmOutcome::Cancelled
        }
        _ => ConfirmOutcome::Pending,
    }
}

pub(crate) fn render_confirm<T>(frame: &mut Frame, area: Rect, confirm: &Confirm<T>) {
    let area = centered(area, 56, 6);
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(vec![
        Line::from(confirm.prompt.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "y confirm  n cancel",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title(confirm.title));
    frame.render_widget(paragraph, area);
}

pub(crate) fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = cmp::min(width, area.width.saturating_sub(2)).max(10);
    let height = cmp::min(height, area.height.saturating_sub(2)).max(3);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

pub(crate) fn enter_terminal() -> Result<Tui> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enter raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
    terminal.hide_cursor()?;
    terminal.clear()?;
    Ok(terminal)
}

pub(crate) fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

pub(crate) fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn confirm_resolves_once() {
        let mut slot = Some(Confirm::new("Reset", "Reset the game?", 7));
        assert_eq!(confirm_key(&mut slot, &key(KeyCode::Char('x'))), ConfirmOutcome::Pending);
        assert!(slot.is_some());
        assert_eq!(
            confirm_key(&mut slot, &key(KeyCode::Char('y'))),
            ConfirmOutcome::Confirmed(7)
        );
        assert!(slot.is_none());

        let mut slot = Some(Confirm::new("Reset", "Reset the game?", 7));
        assert_eq!(confirm_key(&mut slot, &key(KeyCode::Esc)), ConfirmOutcome::Cancelled);
        assert!(slot.is_none());
    }

    #[test]
    fn centered_rect_stays_inside() {
        let outer = Rect::new(0, 0, 40, 10);
        let inner = centered(outer, 60, 20);
        assert!(inner.width <= outer.width && inner.height <= outer.height);
        assert!(inner.x + inner.width <= outer.width);
    }
}
