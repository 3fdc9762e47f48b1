use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use steward_core::io::diagnostics::DiagnosticLog;
use steward_core::io::mailbox::{MailboxReceiver, MailboxSender};
use steward_core::types::{AgentMessage, AgentStatus, MessageKind};

use crate::event::AppEvent;
use crate::widgets;

/// Lines moved per PageUp/PageDown.
const PAGE: u16 = 10;
/// How often the log pane picks up new diagnostic lines.
const REFRESH_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Log,
    Conversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Operator,
    Agent(MessageKind),
}

/// One line item in the conversation pane.
#[derive(Debug, Clone)]
pub struct Entry {
    pub speaker: Speaker,
    pub content: String,
    /// Local wall-clock `HH:MM:SS`.
    pub at: String,
}

/// Channels between the front end and the agent loop.
pub struct Wiring {
    pub inbound: MailboxSender<String>,
    pub outbound: MailboxReceiver<AgentMessage>,
    pub status: watch::Receiver<AgentStatus>,
    pub log: DiagnosticLog,
    pub display_capacity: usize,
}

/// TUI application state.
pub struct App {
    pub entries: VecDeque<Entry>,
    pub capacity: usize,
    pub log: DiagnosticLog,
    pub input: String,
    pub cursor: usize,
    pub focus: Pane,
    /// Rows scrolled up from the bottom, per pane.
    pub conversation_scroll: u16,
    pub log_scroll: u16,
    pub status: AgentStatus,
    pub should_exit: bool,
}

impl App {
    pub fn new(log: DiagnosticLog, capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            log,
            input: String::new(),
            cursor: 0,
            focus: Pane::Conversation,
            conversation_scroll: 0,
            log_scroll: 0,
            status: AgentStatus::default(),
            should_exit: false,
        }
    }

    /// Append to the conversation pane, dropping the oldest past capacity.
    pub fn push(&mut self, speaker: Speaker, content: impl Into<String>, at: DateTime<Utc>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry {
            speaker,
            content: content.into(),
            at: at.with_timezone(&Local).format("%H:%M:%S").to_string(),
        });
    }

    pub fn push_agent(&mut self, msg: AgentMessage) {
        self.push(Speaker::Agent(msg.kind), msg.content, msg.at);
    }

    /// Take the input line if it has content.
    fn submit_input(&mut self) -> Option<String> {
        let text = self.input.trim().to_owned();
        if text.is_empty() {
            return None;
        }
        self.input.clear();
        self.cursor = 0;
        self.conversation_scroll = 0;
        Some(text)
    }

    fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    fn delete_char_before_cursor(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = self.input[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.input.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn move_cursor_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = self.input[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.cursor = prev;
    }

    fn move_cursor_right(&mut self) {
        if self.cursor >= self.input.len() {
            return;
        }
        let next = self.input[self.cursor..]
            .char_indices()
            .nth(1)
            .map(|(i, _)| self.cursor + i)
            .unwrap_or(self.input.len());
        self.cursor = next;
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Pane::Log => Pane::Conversation,
            Pane::Conversation => Pane::Log,
        };
    }

    fn focused_scroll(&mut self) -> &mut u16 {
        match self.focus {
            Pane::Log => &mut self.log_scroll,
            Pane::Conversation => &mut self.conversation_scroll,
        }
    }

    fn scroll_up(&mut self, rows: u16) {
        let s = self.focused_scroll();
        *s = s.saturating_add(rows);
    }

    fn scroll_down(&mut self, rows: u16) {
        let s = self.focused_scroll();
        *s = s.saturating_sub(rows);
    }
}

/// Run the TUI event loop until the operator exits (Ctrl+C) or shutdown is
/// triggered elsewhere.
pub async fn run_app(wiring: Wiring, token: CancellationToken) -> anyhow::Result<()> {
    let Wiring {
        inbound,
        mut outbound,
        mut status,
        log,
        display_capacity,
    } = wiring;

    terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let stop = Arc::new(AtomicBool::new(false));
    let mut event_rx = crate::event::spawn(stop.clone());

    let mut app = App::new(log, display_capacity);
    let mut refresh = tokio::time::interval(Duration::from_millis(REFRESH_MS));
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    terminal.draw(|f| widgets::draw(f, &app))?;

    loop {
        if app.should_exit {
            break;
        }
        tokio::select! {
            _ = token.cancelled() => break,
            evt = event_rx.recv() => {
                let Some(evt) = evt else { break };
                match evt {
                    AppEvent::Key(key) => handle_key(&mut app, key, &inbound),
                    AppEvent::Resize => {}
                }
            }
            Some(msg) = outbound.recv() => app.push_agent(msg),
            Ok(()) = status.changed() => {
                app.status = *status.borrow_and_update();
            }
            _ = refresh.tick() => {}
        }
        terminal.draw(|f| widgets::draw(f, &app))?;
    }

    stop.store(true, Ordering::Relaxed);
    terminal::disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, inbound: &MailboxSender<String>) {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            app.should_exit = true;
        }
        (_, KeyCode::Enter) => {
            if let Some(text) = app.submit_input() {
                if inbound.post(text.clone()) {
                    app.push(Speaker::Operator, text, Utc::now());
                } else {
                    tracing::warn!("inbound queue full, operator message dropped");
                    app.push(
                        Speaker::Agent(MessageKind::Notice),
                        "input queue is full; message was not delivered",
                        Utc::now(),
                    );
                }
            }
        }
        (_, KeyCode::Tab) => app.toggle_focus(),
        (_, KeyCode::Up) => app.scroll_up(1),
        (_, KeyCode::Down) => app.scroll_down(1),
        (_, KeyCode::PageUp) => app.scroll_up(PAGE),
        (_, KeyCode::PageDown) => app.scroll_down(PAGE),
        (_, KeyCode::Backspace) => app.delete_char_before_cursor(),
        (_, KeyCode::Left) => app.move_cursor_left(),
        (_, KeyCode::Right) => app.move_cursor_right(),
        (_, KeyCode::Home) => app.cursor = 0,
        (_, KeyCode::End) => app.cursor = app.input.len(),
        (_, KeyCode::Char(c)) => app.insert_char(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::io::mailbox;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_str(app: &mut App, s: &str, tx: &MailboxSender<String>) {
        for c in s.chars() {
            handle_key(app, key(KeyCode::Char(c)), tx);
        }
    }

    #[test]
    fn enter_posts_to_inbound_and_echoes() {
        let (tx, mut rx) = mailbox::channel(4);
        let mut app = App::new(DiagnosticLog::new(8), 10);
        type_str(&mut app, "héllo", &tx);
        handle_key(&mut app, key(KeyCode::Enter), &tx);

        assert_eq!(rx.drain(), vec!["héllo".to_string()]);
        assert!(app.input.is_empty());
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0].speaker, Speaker::Operator);
    }

    #[test]
    fn blank_input_is_not_sent() {
        let (tx, mut rx) = mailbox::channel(4);
        let mut app = App::new(DiagnosticLog::new(8), 10);
        type_str(&mut app, "   ", &tx);
        handle_key(&mut app, key(KeyCode::Enter), &tx);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn conversation_is_capped() {
        let mut app = App::new(DiagnosticLog::new(8), 3);
        for i in 0..5 {
            app.push_agent(AgentMessage::reply(format!("m{i}")));
        }
        let kept: Vec<&str> = app.entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(kept, ["m2", "m3", "m4"]);
    }

    #[test]
    fn tab_moves_scrolling_between_panes() {
        let (tx, _rx) = mailbox::channel(4);
        let mut app = App::new(DiagnosticLog::new(8), 10);
        handle_key(&mut app, key(KeyCode::PageUp), &tx);
        assert_eq!(app.conversation_scroll, PAGE);
        handle_key(&mut app, key(KeyCode::Tab), &tx);
        handle_key(&mut app, key(KeyCode::Up), &tx);
        assert_eq!(app.log_scroll, 1);
        assert_eq!(app.conversation_scroll, PAGE);
    }

    #[test]
    fn cursor_edits_respect_char_boundaries() {
        let (tx, _rx) = mailbox::channel(4);
        let mut app = App::new(DiagnosticLog::new(8), 10);
        type_str(&mut app, "aé", &tx);
        handle_key(&mut app, key(KeyCode::Left), &tx);
        handle_key(&mut app, key(KeyCode::Backspace), &tx);
        assert_eq!(app.input, "é");
        assert_eq!(app.cursor, 0);
    }
}
