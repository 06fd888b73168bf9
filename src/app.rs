use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use tokio::runtime::Handle;

use crate::complete::{Candidate, rank};
use crate::msg::Msg;
use crate::notice::{Notice, Severity};
use crate::session::{NewTreeOverrides, Session};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Loading,
    Ready,
    Creating,
}

/// What the user picked, printed once the terminal is restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Chosen(String),
    Created(PathBuf),
}

/// Full-screen tree picker: a filter line over the forest.
pub struct App {
    session: Arc<Session>,
    runtime: Handle,
    event_tx: mpsc::Sender<Msg>,
    new_tree: NewTreeOverrides,
    status: Status,
    query: String,
    candidates: Vec<Candidate>,
    results: Vec<Candidate>,
    selected: usize,
    notifications: VecDeque<Notice>,
    spinner: usize,
    pub should_quit: bool,
    pub outcome: Option<PickOutcome>,
}

impl App {
    pub fn new(
        session: Arc<Session>,
        runtime: Handle,
        event_tx: mpsc::Sender<Msg>,
        query: String,
        new_tree: NewTreeOverrides,
    ) -> Self {
        Self {
            session,
            runtime,
            event_tx,
            new_tree,
            status: Status::Loading,
            query,
            candidates: Vec::new(),
            results: Vec::new(),
            selected: 0,
            notifications: VecDeque::new(),
            spinner: 0,
            should_quit: false,
            outcome: None,
        }
    }

    /// Kick off the first forest load.
    pub fn start(&mut self) {
        self.load_forest(false);
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key),
            Msg::ForestLoaded(forest) => {
                self.candidates = self.session.candidates(&forest, 0..0);
                self.status = Status::Ready;
                self.refresh_results();
            }
            Msg::TreeCreated(Some(path)) => {
                self.outcome = Some(PickOutcome::Created(path));
                self.should_quit = true;
            }
            Msg::TreeCreated(None) => {
                self.status = Status::Ready;
                self.push_notification(Notice::error("no tree was created"));
            }
            Msg::Notice(notice) => self.push_notification(notice),
            Msg::Tick => self.spinner = (self.spinner + 1) % SPINNER.len(),
            Msg::Resize(..) => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Enter => {
                if let Some(candidate) = self.results.get(self.selected) {
                    self.outcome = Some(PickOutcome::Chosen(candidate.insert_text.clone()));
                    self.should_quit = true;
                }
            }
            KeyCode::Down => self.move_selection(1),
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('n') if ctrl => self.move_selection(1),
            KeyCode::Char('p') if ctrl => self.move_selection(-1),
            KeyCode::Char('r') if ctrl => {
                self.push_notification(Notice::info("reloading forest"));
                self.load_forest(true);
            }
            KeyCode::Char('o') if ctrl => self.create_tree(),
            KeyCode::Backspace => {
                self.query.pop();
                self.refresh_results();
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.query.push(ch);
                self.refresh_results();
            }
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.results.is_empty() {
            self.selected = 0;
            return;
        }

        let max = self.results.len().saturating_sub(1) as isize;
        self.selected = (self.selected as isize + delta).clamp(0, max) as usize;
    }

    fn refresh_results(&mut self) {
        let limit = self.session.config().completion.max_results;
        self.results = rank(self.candidates.clone(), &self.query, limit);

        if self.results.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.results.len() {
            self.selected = self.results.len() - 1;
        }
    }

    fn load_forest(&mut self, force: bool) {
        self.status = Status::Loading;
        let session = self.session.clone();
        let tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let forest = if force {
                session.cache().refresh().await
            } else {
                session.cache().get().await
            };
            let _ = tx.send(Msg::ForestLoaded(forest));
        });
    }

    fn create_tree(&mut self) {
        if self.status == Status::Creating {
            return;
        }

        self.status = Status::Creating;
        let session = self.session.clone();
        let tx = self.event_tx.clone();
        let overrides = self.new_tree.clone();
        self.runtime.spawn(async move {
            let created = session.new_tree(overrides).await;
            let _ = tx.send(Msg::TreeCreated(created));
        });
    }

    fn push_notification(&mut self, mut notice: Notice) {
        // Multi-line diagnostics only get their first line in the status bar.
        if let Some(first_line) = notice.message.lines().next() {
            notice.message = first_line.to_string();
        }
        self.notifications.push_back(notice);
        while self.notifications.len() > 8 {
            self.notifications.pop_front();
        }
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // picker
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        self.render_picker(frame, chunks[0]);
        self.render_status_bar(frame, chunks[1]);
    }

    fn render_picker(&self, frame: &mut Frame, area: Rect) {
        let area = centered_rect(80, 80, area);
        frame.render_widget(Clear, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);

        let title = format!(
            " Forest ({}/{}) ",
            self.results.len(),
            self.candidates.len()
        );
        let input = Paragraph::new(self.query.clone()).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(input, chunks[0]);

        let results: Vec<Line> = if self.results.is_empty() {
            let text = match self.status {
                Status::Loading => "Loading forest...",
                _ => "No matches",
            };
            vec![Line::from(Span::styled(
                text,
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            let visible = chunks[1].height as usize;
            let top = self.selected.saturating_sub(visible.saturating_sub(1));
            self.results
                .iter()
                .enumerate()
                .skip(top)
                .take(visible)
                .map(|(idx, item)| {
                    let (marker, style) = if idx == self.selected {
                        ("> ", Style::default().fg(Color::Black).bg(Color::Cyan))
                    } else {
                        ("  ", Style::default().fg(Color::Gray))
                    };
                    Line::from(vec![
                        Span::styled(format!("{marker}{}", item.label), style),
                        Span::styled(
                            format!("  {}", item.detail),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ])
                })
                .collect()
        };

        let result_block = Paragraph::new(results).block(
            Block::default()
                .borders(Borders::LEFT | Borders::RIGHT)
                .style(Style::default().bg(Color::Rgb(10, 10, 18))),
        );
        frame.render_widget(result_block, chunks[1]);

        let footer =
            Paragraph::new(" Enter: insert  Esc: close  ↑/↓: move  C-o: new tree  C-r: reload ")
                .block(
                    Block::default().borders(Borders::ALL).style(
                        Style::default()
                            .bg(Color::Rgb(15, 15, 24))
                            .fg(Color::DarkGray),
                    ),
                );
        frame.render_widget(footer, chunks[2]);

        let cursor_x = chunks[0].x + 1 + self.query.chars().count() as u16;
        let cursor_y = chunks[0].y + 1;
        frame.set_cursor_position((cursor_x, cursor_y));
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let (label, mode_style) = match self.status {
            Status::Loading => (
                format!(" {} LOADING ", SPINNER[self.spinner]),
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ),
            Status::Creating => (
                format!(" {} CREATING ", SPINNER[self.spinner]),
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ),
            Status::Ready => (
                " READY ".to_string(),
                Style::default().fg(Color::Black).bg(Color::Magenta),
            ),
        };
        let mode_span = Span::styled(label, mode_style.add_modifier(Modifier::BOLD));

        let root = self.session.cache().forester().root().display().to_string();
        let (info, info_style) = match self.notifications.back() {
            Some(notice) => (
                format!(" {} ", notice.message),
                match notice.severity {
                    Severity::Critical => Style::default().fg(Color::White).bg(Color::Red),
                    Severity::Error => Style::default().fg(Color::Red).bg(Color::DarkGray),
                    Severity::Info => Style::default().fg(Color::Gray).bg(Color::DarkGray),
                },
            ),
            None => (
                format!(" {root} "),
                Style::default().fg(Color::Gray).bg(Color::DarkGray),
            ),
        };

        let bar = Line::from(vec![mode_span, Span::styled(info, info_style)]);
        let status = Paragraph::new(bar).style(Style::default().bg(Color::DarkGray));
        frame.render_widget(status, area);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
