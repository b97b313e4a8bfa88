//! ControlLoop: single-owner state machine for Session and UI state.
//!
//! Every input (user actions, decoded player notifications) arrives as a
//! `LoopMessage` and is handled strictly one at a time.  `handle` never
//! performs I/O: it mutates state and returns the `PlayerCommand`s the
//! dispatcher should run.  This is the only writer of `Session` after
//! startup reconciliation.
//!
//! Tie-break: only user activation and idle/not-idle notifications touch
//! `Session`; title notifications only ever change `UiState::displayed_title`.
use soma_proto::channel::ChannelList;
use soma_proto::config::Session;
use tracing::{debug, info};

use crate::action::Action;
use crate::mpv::PlayerEvent;
use crate::player::PlayerCommand;
use crate::reconcile::Resolution;

// ── Phase ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Nothing selected.
    Idle,
    /// Cursor moving, no playback change.
    Selecting,
    Playing(String),
    Paused(String),
    /// Terminal; every further message is ignored.
    Quitting,
}

/// Purely presentational state.  `now_playing` is set iff the phase is
/// `Playing`, and then equals the session's selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub cursor: usize,
    pub now_playing: Option<String>,
    pub displayed_title: Option<String>,
}

/// All inputs into the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopMessage {
    User(Action),
    Player(PlayerEvent),
}

// ── ControlLoop ───────────────────────────────────────────────────────────────

pub struct ControlLoop {
    channels: ChannelList,
    session: Session,
    ui: UiState,
    phase: Phase,
    /// true when this process launched the player.
    owns_player: bool,
}

impl ControlLoop {
    pub fn new(channels: ChannelList, resolution: Resolution, owns_player: bool) -> Self {
        let now_playing = match &resolution.phase {
            Phase::Playing(id) => Some(id.clone()),
            _ => None,
        };
        let cursor = resolution.cursor.min(channels.len().saturating_sub(1));
        Self {
            channels,
            session: resolution.session,
            ui: UiState {
                cursor,
                now_playing,
                displayed_title: None,
            },
            phase: resolution.phase,
            owns_player,
        }
    }

    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_quitting(&self) -> bool {
        self.phase == Phase::Quitting
    }

    /// Apply one message; returns the commands to issue, in order.
    pub fn handle(&mut self, msg: LoopMessage) -> Vec<PlayerCommand> {
        if self.is_quitting() {
            debug!("core: quitting, dropping {:?}", msg);
            return Vec::new();
        }
        match msg {
            LoopMessage::User(action) => self.on_user(action),
            LoopMessage::Player(event) => self.on_player(event),
        }
    }

    fn on_user(&mut self, action: Action) -> Vec<PlayerCommand> {
        match action {
            Action::Select(idx) => {
                if idx < self.channels.len() {
                    self.ui.cursor = idx;
                    if self.phase == Phase::Idle {
                        self.phase = Phase::Selecting;
                    }
                }
                Vec::new()
            }
            Action::Activate(idx) => self.activate(idx),
            Action::Quit => {
                info!("core: quit requested (owns_player={})", self.owns_player);
                self.phase = Phase::Quitting;
                self.ui.now_playing = None;
                if self.owns_player {
                    vec![PlayerCommand::Shutdown]
                } else {
                    vec![PlayerCommand::Pause]
                }
            }
        }
    }

    fn activate(&mut self, idx: usize) -> Vec<PlayerCommand> {
        let Some(channel) = self.channels.get(idx) else {
            return Vec::new();
        };
        self.ui.cursor = idx;

        if self.phase == Phase::Playing(channel.id.clone()) {
            info!("core: pausing {}", channel.id);
            let id = channel.id.clone();
            self.session.is_paused = true;
            self.enter_paused(id);
            return vec![PlayerCommand::Pause];
        }

        info!("core: playing {}", channel.id);
        let id = channel.id.clone();
        let url = channel.stream_url.clone();
        self.session = Session::playing(id.clone());
        self.ui.displayed_title = None;
        self.ui.now_playing = Some(id.clone());
        self.phase = Phase::Playing(id);
        vec![PlayerCommand::Play { url }]
    }

    fn on_player(&mut self, event: PlayerEvent) -> Vec<PlayerCommand> {
        match event {
            PlayerEvent::TitleChanged(title) => {
                debug!("core: title {:?}", title);
                self.ui.displayed_title = Some(title);
                Vec::new()
            }
            PlayerEvent::IdleChanged(idle) => {
                let Some(selected) = self.session.selected_channel_id.clone() else {
                    debug!("core: idle={} with no selection, ignored", idle);
                    return Vec::new();
                };
                if idle {
                    debug!("core: player idle, {} paused", selected);
                    self.session.is_paused = true;
                    self.enter_paused(selected);
                    Vec::new()
                } else {
                    debug!("core: player active, {} playing", selected);
                    self.session.is_paused = false;
                    self.ui.now_playing = Some(selected.clone());
                    self.phase = Phase::Playing(selected);
                    vec![PlayerCommand::RefreshTitle]
                }
            }
        }
    }

    fn enter_paused(&mut self, id: String) {
        self.ui.now_playing = None;
        self.ui.displayed_title = None;
        self.phase = Phase::Paused(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use soma_proto::channel::Channel;

    fn channels() -> ChannelList {
        ChannelList::new(
            ["groovesalad", "dronezone", "lush", "defcon"]
                .iter()
                .map(|id| Channel {
                    id: id.to_string(),
                    title: id.to_string(),
                    stream_url: format!("https://api.somafm.com/{}.pls", id),
                    ..Channel::default()
                })
                .collect(),
        )
    }

    fn idle_loop(owns_player: bool) -> ControlLoop {
        ControlLoop::new(
            channels(),
            Resolution {
                session: Session::default(),
                phase: Phase::Idle,
                cursor: 0,
            },
            owns_player,
        )
    }

    fn user(action: Action) -> LoopMessage {
        LoopMessage::User(action)
    }

    fn player(event: PlayerEvent) -> LoopMessage {
        LoopMessage::Player(event)
    }

    fn assert_invariants(core: &ControlLoop) {
        match core.phase() {
            Phase::Playing(id) => {
                assert_eq!(core.ui().now_playing.as_deref(), Some(id.as_str()));
                assert_eq!(core.session().selected_channel_id.as_deref(), Some(id.as_str()));
            }
            _ => assert_eq!(core.ui().now_playing, None, "phase {:?}", core.phase()),
        }
    }

    #[test]
    fn test_activate_plays_then_pauses() {
        let mut core = idle_loop(true);
        let cmds = core.handle(user(Action::Activate(1)));
        assert_eq!(
            cmds,
            vec![PlayerCommand::Play {
                url: "https://api.somafm.com/dronezone.pls".into()
            }]
        );
        assert_eq!(core.phase(), &Phase::Playing("dronezone".into()));
        assert_eq!(core.session(), &Session::playing("dronezone"));

        let cmds = core.handle(user(Action::Activate(1)));
        assert_eq!(cmds, vec![PlayerCommand::Pause]);
        assert_eq!(core.phase(), &Phase::Paused("dronezone".into()));
        assert_eq!(core.session(), &Session::paused("dronezone"));
        assert_invariants(&core);
    }

    #[test]
    fn test_switching_channel_clears_title() {
        let mut core = idle_loop(true);
        core.handle(user(Action::Activate(0)));
        core.handle(player(PlayerEvent::TitleChanged("Bonobo - Kerala".into())));
        assert_eq!(core.ui().displayed_title.as_deref(), Some("Bonobo - Kerala"));

        core.handle(user(Action::Activate(2)));
        assert_eq!(core.ui().displayed_title, None);
        assert_eq!(core.ui().now_playing.as_deref(), Some("lush"));
    }

    #[test]
    fn test_select_moves_cursor_only() {
        let mut core = idle_loop(true);
        assert!(core.handle(user(Action::Select(3))).is_empty());
        assert_eq!(core.ui().cursor, 3);
        assert_eq!(core.phase(), &Phase::Selecting);
        assert_eq!(core.session(), &Session::default());

        // out of range is ignored
        core.handle(user(Action::Select(42)));
        assert_eq!(core.ui().cursor, 3);
    }

    #[test]
    fn test_external_idle_and_resume() {
        let mut core = idle_loop(true);
        core.handle(user(Action::Activate(0)));
        core.handle(player(PlayerEvent::TitleChanged("x".into())));

        assert!(core.handle(player(PlayerEvent::IdleChanged(true))).is_empty());
        assert_eq!(core.phase(), &Phase::Paused("groovesalad".into()));
        assert!(core.session().is_paused);
        assert_eq!(core.ui().displayed_title, None);

        let cmds = core.handle(player(PlayerEvent::IdleChanged(false)));
        assert_eq!(cmds, vec![PlayerCommand::RefreshTitle]);
        assert_eq!(core.phase(), &Phase::Playing("groovesalad".into()));
        assert!(!core.session().is_paused);
        assert_invariants(&core);
    }

    #[test]
    fn test_idle_without_selection_is_ignored() {
        let mut core = idle_loop(true);
        assert!(core.handle(player(PlayerEvent::IdleChanged(false))).is_empty());
        assert_eq!(core.phase(), &Phase::Idle);
        assert_eq!(core.session(), &Session::default());
    }

    #[test]
    fn test_quit_depends_on_ownership() {
        let mut owned = idle_loop(true);
        owned.handle(user(Action::Activate(0)));
        assert_eq!(owned.handle(user(Action::Quit)), vec![PlayerCommand::Shutdown]);
        assert!(owned.is_quitting());
        // session survives quitting so it can be persisted
        assert_eq!(owned.session(), &Session::playing("groovesalad"));

        let mut shared = idle_loop(false);
        assert_eq!(shared.handle(user(Action::Quit)), vec![PlayerCommand::Pause]);
        assert!(shared.handle(user(Action::Activate(1))).is_empty());
        assert!(shared.handle(player(PlayerEvent::IdleChanged(false))).is_empty());
        assert!(shared.is_quitting());
    }

    #[test]
    fn test_title_changes_never_touch_session() {
        let mut core = idle_loop(true);
        core.handle(user(Action::Activate(2)));
        let before = core.session().clone();
        for i in 0..50 {
            let cmds = core.handle(player(PlayerEvent::TitleChanged(format!("track {}", i))));
            assert!(cmds.is_empty());
        }
        assert_eq!(core.session(), &before);
        assert_eq!(core.phase(), &Phase::Playing("lush".into()));
    }

    #[test]
    fn test_double_activation_returns_to_start() {
        let mut core = idle_loop(true);
        core.handle(user(Action::Activate(1)));
        let session = core.session().clone();
        let phase = core.phase().clone();
        for n in 1..=4 {
            core.handle(user(Action::Activate(1)));
            core.handle(user(Action::Activate(1)));
            assert_eq!(core.session(), &session, "after {} pairs", n);
            assert_eq!(core.phase(), &phase);
        }
    }

    #[test]
    fn test_seeded_sequences_keep_invariants() {
        for seed in 0..64u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut core = idle_loop(rng.gen_bool(0.5));
            for _ in 0..200 {
                let before = core.session().clone();
                let msg = match rng.gen_range(0..5) {
                    0 => user(Action::Select(rng.gen_range(0..6))),
                    1 => user(Action::Activate(rng.gen_range(0..6))),
                    2 => player(PlayerEvent::IdleChanged(rng.gen_bool(0.5))),
                    3 => player(PlayerEvent::TitleChanged(format!("t{}", rng.gen::<u16>()))),
                    _ if rng.gen_ratio(1, 50) => user(Action::Quit),
                    _ => player(PlayerEvent::TitleChanged(String::new())),
                };
                let is_title = matches!(msg, LoopMessage::Player(PlayerEvent::TitleChanged(_)));
                core.handle(msg);
                assert_invariants(&core);
                if is_title {
                    assert_eq!(core.session(), &before, "seed {}", seed);
                }
            }
        }
    }
}
