//! Terminal WebSocket tester built on ratatui.
//!
//! Run with: cargo run -p socket-tester-tui -- --url ws://localhost:8080
//!
//! Logs go to a file (see `--log-file`); set `SOCKET_TESTER_LOG=debug` for
//! transport detail.

use std::{fs::OpenOptions, io, path::PathBuf, sync::Mutex, time::Duration};

use clap::Parser;
use crossterm::{
    event, execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use socket_tester_core::{
    ComposerHistory, ConnectionStatus, Direction, LogEntry, NoticeKind, SettingsStore,
};
use socket_tester_session::{
    Command, SessionController,
    storage::{FileStorage, MemoryStorage},
};
use socket_tester_transport::{
    DriverEvent, TokioScheduler, WsConnector,
    tui::{KeyAction, apply_edit, event_to_action},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SOCKET_TESTER_LOG";

/// Interactive WebSocket tester.
#[derive(Debug, Parser)]
#[command(name = "socket-tester", version, about)]
struct Args {
    /// Settings file (TOML). Defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connect to this address on startup.
    #[arg(long)]
    url: Option<String>,

    /// Diagnostic log file. Defaults to the user data directory.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

type Controller = SessionController<WsConnector, TokioScheduler, Box<dyn SettingsStore>>;

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.clone())?;

    // Several rustls backends may be linked in; pick one explicitly.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let store: Box<dyn SettingsStore> = match args.config.clone().or_else(FileStorage::default_path) {
        Some(path) => {
            info!(path = %path.display(), "using settings file");
            Box::new(FileStorage::new(path))
        }
        None => {
            warn!("no config directory, settings will not be saved");
            Box::new(MemoryStorage::new())
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let controller = SessionController::new(
        WsConnector::new(events_tx.clone()),
        TokioScheduler::new(events_tx),
        store,
    );
    let mut app = App::new(controller);
    app.controller.execute(Command::OpenView);
    if let Some(url) = args.url {
        app.set_address(&url);
        report(app.controller.toggle_connection());
        app.focus = Focus::Composer;
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &mut events_rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
    }

    Ok(())
}

fn init_logging(path: Option<PathBuf>) -> io::Result<()> {
    let Some(path) = path.or_else(|| {
        dirs::data_dir().map(|dir| dir.join("socket-tester").join("socket-tester.log"))
    }) else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Address,
    Composer,
    /// Naming the current address before saving it.
    SaveName,
}

struct App {
    controller: Controller,
    focus: Focus,
    address: ComposerHistory,
    save_name: ComposerHistory,
    quit: bool,
}

impl App {
    fn new(controller: Controller) -> Self {
        let mut address = ComposerHistory::new();
        address.set_value(controller.address());
        let focus = if controller.address().is_empty() {
            Focus::Address
        } else {
            Focus::Composer
        };
        Self {
            controller,
            focus,
            address,
            save_name: ComposerHistory::new(),
            quit: false,
        }
    }

    fn set_address(&mut self, address: &str) {
        self.address.set_value(address);
        self.controller.set_address(address);
    }

    fn handle_action(&mut self, action: KeyAction) {
        match action {
            KeyAction::Quit => self.quit = true,
            KeyAction::SwitchFocus => {
                self.focus = match self.focus {
                    Focus::Address => Focus::Composer,
                    Focus::Composer | Focus::SaveName => Focus::Address,
                };
            }
            KeyAction::ToggleConnection => report(self.controller.toggle_connection()),
            KeyAction::ClearLog => self.controller.execute(Command::ClearLog),
            KeyAction::SaveEndpoint => {
                if self.controller.should_offer_save() {
                    self.save_name.set_value("");
                    self.focus = Focus::SaveName;
                }
            }
            KeyAction::NextEndpoint => match self.controller.select_next_endpoint() {
                Ok(Some(endpoint)) => {
                    let address = endpoint.address.clone();
                    self.address.set_value(address);
                }
                Ok(None) => {}
                Err(e) => debug!("{e}"),
            },
            KeyAction::ScrollUp => self.controller.log_mut().scroll_up(1),
            KeyAction::ScrollDown => self.controller.log_mut().scroll_down(1),
            KeyAction::PageUp => self.controller.log_mut().page_up(),
            KeyAction::PageDown => self.controller.log_mut().page_down(),
            KeyAction::ScrollToBottom => self.controller.log_mut().scroll_to_bottom(),
            KeyAction::Submit => self.submit(),
            edit => self.edit(edit),
        }
    }

    fn submit(&mut self) {
        match self.focus {
            Focus::Address => report(self.controller.toggle_connection()),
            Focus::Composer => report(self.controller.submit_composer()),
            Focus::SaveName => {
                let name = self.save_name.value().to_string();
                let saved = self.controller.save_current_endpoint(&name).map(|_| ());
                if saved.is_ok() {
                    self.focus = Focus::Composer;
                }
                report(saved);
            }
        }
    }

    fn edit(&mut self, action: KeyAction) {
        match self.focus {
            Focus::Address => {
                if self.controller.address_editable() && apply_edit(&mut self.address, action) {
                    let address = self.address.value().to_string();
                    self.controller.set_address(address);
                }
            }
            Focus::Composer => {
                apply_edit(self.controller.composer_mut(), action);
            }
            Focus::SaveName => {
                apply_edit(&mut self.save_name, action);
            }
        }
    }
}

/// Controller failures are already in the message log.
fn report<E: std::fmt::Display>(result: Result<(), E>) {
    if let Err(e) = result {
        debug!("{e}");
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &mut mpsc::UnboundedReceiver<DriverEvent>,
) -> io::Result<()> {
    loop {
        while let Ok(event) = events.try_recv() {
            app.controller.handle_event(event);
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Some(action) = event_to_action(&event::read()?) {
                app.handle_action(action);
            }
        }

        if app.quit {
            app.controller.shutdown();
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Length(3), // Address
            Constraint::Min(3),    // Log
            Constraint::Length(3), // Composer
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    render_address(f, app, chunks[0]);
    render_log(f, app, chunks[1]);
    render_composer(f, app, chunks[2]);
    render_status(f, app, chunks[3]);
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn set_cursor(f: &mut Frame, area: Rect, caret: usize) {
    let x = u16::try_from(caret).unwrap_or(u16::MAX);
    f.set_cursor_position((area.x.saturating_add(x).saturating_add(1), area.y + 1));
}

fn render_address(f: &mut Frame, app: &App, area: Rect) {
    let endpoint = app
        .controller
        .selected_endpoint()
        .map_or_else(String::new, |e| format!(" ({})", e.name));
    let title = format!(
        "Address{endpoint} [{}: Ctrl+D]",
        app.controller.connect_label()
    );
    let style = if app.controller.address_editable() {
        focus_style(app.focus == Focus::Address)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let text = if app.address.value().is_empty() {
        Span::styled(
            "ws://localhost:8080 or wss://example.com/socket",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::raw(app.address.value())
    };
    let input = Paragraph::new(Line::from(text))
        .block(Block::default().borders(Borders::ALL).title(title).border_style(style));
    f.render_widget(input, area);

    if app.focus == Focus::Address {
        set_cursor(f, area, app.address.caret());
    }
}

fn render_log(f: &mut Frame, app: &mut App, area: Rect) {
    let log = app.controller.log_mut();
    log.set_visible_lines(usize::from(area.height.saturating_sub(2)));

    let mut lines: Vec<Line> = Vec::with_capacity(log.total_lines());
    for rendered in log.entries() {
        match &rendered.entry {
            LogEntry::Record(record) => {
                let color = match record.direction() {
                    Direction::Sent => Color::Cyan,
                    Direction::Received => Color::Green,
                };
                if let Some(header) = &rendered.header {
                    lines.push(Line::styled(
                        header.clone(),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ));
                }
                let body = if rendered.is_json {
                    Style::default().fg(Color::LightBlue)
                } else {
                    Style::default()
                };
                lines.extend(rendered.lines.iter().map(|l| Line::styled(l.clone(), body)));
            }
            LogEntry::Notice { kind, .. } => {
                let color = match kind {
                    NoticeKind::Info => Color::Gray,
                    NoticeKind::Error => Color::Red,
                    NoticeKind::Success => Color::Green,
                };
                let style = Style::default().fg(color).add_modifier(Modifier::ITALIC);
                lines.extend(rendered.lines.iter().map(|l| Line::styled(l.clone(), style)));
            }
        }
    }

    let mut block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Messages ({})", log.message_count_text()));
    if log.show_scroll_button() {
        block = block.title_bottom(Line::from(" ↓ scroll to bottom: Ctrl+End ").right_aligned());
    }
    let offset = u16::try_from(log.offset()).unwrap_or(u16::MAX);
    let output = Paragraph::new(lines).block(block).scroll((offset, 0));
    f.render_widget(output, area);
}

fn render_composer(f: &mut Frame, app: &App, area: Rect) {
    let (title, value, caret, focused) = if app.focus == Focus::SaveName {
        (
            "Save connection as (Enter to save, Tab to cancel)",
            app.save_name.value(),
            app.save_name.caret(),
            true,
        )
    } else {
        let composer = app.controller.composer();
        (
            "Message (Enter to send, Up/Down for history)",
            composer.value(),
            composer.caret(),
            app.focus == Focus::Composer,
        )
    };
    let input = Paragraph::new(value).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(focus_style(focused)),
    );
    f.render_widget(input, area);

    if focused {
        set_cursor(f, area, caret);
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let status_style = match app.controller.status() {
        ConnectionStatus::Connected => Style::default().fg(Color::Green),
        ConnectionStatus::Connecting => Style::default().fg(Color::Yellow),
        ConnectionStatus::Error => Style::default().fg(Color::Red),
        ConnectionStatus::Disconnected => Style::default().fg(Color::DarkGray),
    };
    let key = Style::default().fg(Color::Yellow);

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(app.controller.status_bar_text(), status_style),
        Span::raw(" | "),
        Span::styled(app.controller.status_text(), status_style),
        Span::raw(" | "),
    ];
    if app.controller.should_offer_save() {
        spans.push(Span::styled("Ctrl+S", key));
        spans.push(Span::raw(" save | "));
    }
    spans.extend([
        Span::styled("Tab", key),
        Span::raw(" focus | "),
        Span::styled("Ctrl+N", key),
        Span::raw(" next saved | "),
        Span::styled("Ctrl+L", key),
        Span::raw(" clear | "),
        Span::styled("Ctrl+C", key),
        Span::raw(" quit "),
    ]);
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
