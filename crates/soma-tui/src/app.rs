//! App: terminal event loop around the ControlLoop.
//!
//! Architecture:
//! - A blocking task reads crossterm events and forwards them as `AppMessage`s.
//! - Decoded player notifications arrive on their own bounded channel.
//! - Every message is fed to the `ControlLoop` one at a time; the
//!   `PlayerCommand`s it returns go out through `cmd_tx` to the dispatcher.
//! - The loop draws, then awaits the next message.  On quit the session is
//!   persisted, the final commands are flushed and the dispatcher is awaited.

use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseEvent,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    Terminal,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use soma_proto::config::{ConfigStore, StoredState};

use crate::{
    action::Action,
    component::Component,
    components::station_list::StationList,
    core::{ControlLoop, LoopMessage},
    mpv::PlayerEvent,
    player::PlayerCommand,
    widgets::status_bar::{self, InputMode},
};

/// How long quitting waits for the dispatcher to finish shutting the player down.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Terminal(Event),
    Player(PlayerEvent),
}

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

// ── App ───────────────────────────────────────────────────────────────────────

pub struct App {
    core: ControlLoop,
    station_list: StationList,
    store: ConfigStore,
    stored: StoredState,
    cmd_tx: mpsc::Sender<PlayerCommand>,
    dispatcher: JoinHandle<()>,
    /// Last-drawn list rect, used for mouse hit-testing.
    list_area: Rect,
}

impl App {
    pub fn new(
        core: ControlLoop,
        store: ConfigStore,
        stored: StoredState,
        cmd_tx: mpsc::Sender<PlayerCommand>,
        dispatcher: JoinHandle<()>,
    ) -> Self {
        let station_list = StationList::new(core.channels(), core.ui().cursor);
        Self {
            core,
            station_list,
            store,
            stored,
            cmd_tx,
            dispatcher,
            list_area: Rect::default(),
        }
    }

    pub async fn run(mut self, mut player_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);

        // ── Background task: keyboard/mouse events ────────────────────────────
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if tx.blocking_send(AppMessage::Terminal(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        let result = self.event_loop(&mut terminal, &mut rx, &mut player_rx).await;

        // ── Teardown ──────────────────────────────────────────────────────────
        restore_terminal();
        if let Err(e) = terminal.show_cursor() {
            warn!("app: could not show cursor: {}", e);
        }
        self.finish().await;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Tui,
        rx: &mut mpsc::Receiver<AppMessage>,
        player_rx: &mut mpsc::Receiver<PlayerEvent>,
    ) -> anyhow::Result<()> {
        let mut needs_redraw = true;
        while !self.core.is_quitting() {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }

            let msg = tokio::select! {
                Some(msg) = rx.recv() => msg,
                Some(evt) = player_rx.recv() => AppMessage::Player(evt),
                else => {
                    warn!("app: all input channels closed");
                    break;
                }
            };
            needs_redraw = self.handle_message(msg);
        }
        Ok(())
    }

    /// Returns whether the screen needs redrawing.
    fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Player(evt) => {
                self.submit(LoopMessage::Player(evt));
                true
            }
            AppMessage::Terminal(Event::Key(key)) => {
                for action in self.handle_key(key) {
                    self.submit(LoopMessage::User(action));
                }
                true
            }
            AppMessage::Terminal(Event::Mouse(mouse)) => {
                for action in self.handle_mouse(mouse) {
                    self.submit(LoopMessage::User(action));
                }
                true
            }
            AppMessage::Terminal(Event::Resize(..)) => true,
            AppMessage::Terminal(_) => false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
        let plain_q = key.code == KeyCode::Char('q') && !self.station_list.is_filter_active();
        if ctrl_c || plain_q {
            return vec![Action::Quit];
        }
        self.station_list.handle_key(key, self.core.ui())
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) -> Vec<Action> {
        if !self.list_area.contains(Position::new(mouse.column, mouse.row)) {
            return vec![];
        }
        self.station_list
            .handle_mouse(mouse, self.list_area, self.core.ui())
    }

    /// Run one message through the control loop and hand off its commands.
    fn submit(&mut self, msg: LoopMessage) {
        let cmds = self.core.handle(msg);
        debug!("app: phase {:?}, {} command(s)", self.core.phase(), cmds.len());
        for cmd in cmds {
            if let Err(e) = self.cmd_tx.try_send(cmd) {
                warn!("app: dropping player command: {}", e);
            }
        }
    }

    /// Persist the session and wait for the dispatcher to wind down.
    async fn finish(self) {
        let App {
            core,
            store,
            mut stored,
            cmd_tx,
            dispatcher,
            ..
        } = self;

        stored.set_session(core.session());
        match store.save(&stored) {
            Ok(()) => info!("app: session saved to {:?}", store.path()),
            Err(e) => {
                warn!("app: could not save session: {}", e);
                eprintln!("soma: could not save session: {}", e);
            }
        }

        drop(cmd_tx);
        if tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher)
            .await
            .is_err()
        {
            warn!("app: dispatcher did not finish in time");
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(frame.area());

        self.list_area = chunks[0];
        let ui = self.core.ui();
        self.station_list.draw(frame, chunks[0], ui);
        status_bar::draw_separator(frame, chunks[1]);

        let channel_title = ui
            .now_playing
            .as_deref()
            .and_then(|id| self.core.channels().find_by_id(id))
            .map(|c| c.title.as_str());
        let now_playing =
            status_bar::now_playing_text(channel_title, ui.displayed_title.as_deref());
        status_bar::draw_now_playing(frame, chunks[2], now_playing.as_deref());

        let mode = if self.station_list.is_filter_active() {
            InputMode::Filter
        } else {
            InputMode::Normal
        };
        status_bar::draw_keys_bar(frame, chunks[3], mode);
    }
}

/// Leave raw mode and the alternate screen.  Safe to call more than once.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
}
