//! PlayerControl seam + command dispatcher.
//!
//! The control loop never awaits player I/O.  It hands `PlayerCommand`s to
//! the dispatcher task, which runs them one after another against anything
//! implementing `PlayerControl` (the mpv handle in production, a recording
//! mock in tests).  Failures are logged and dropped: the player's own state
//! stays authoritative and comes back to the loop as property changes.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mpv::{CommandError, MpvHandle, PlayerEvent, PlayerProcess};

/// Imperative capabilities the rest of the program needs from a player.
pub trait PlayerControl: Clone + Send + Sync + 'static {
    fn query_current_path(&self)
        -> impl Future<Output = Result<Option<String>, CommandError>> + Send;
    fn load(&self, url: &str) -> impl Future<Output = Result<(), CommandError>> + Send;
    fn pause(&self) -> impl Future<Output = Result<(), CommandError>> + Send;
    fn resume(&self) -> impl Future<Output = Result<(), CommandError>> + Send;
    fn is_paused(&self) -> impl Future<Output = Result<bool, CommandError>> + Send;
    fn media_title(&self) -> impl Future<Output = Result<Option<String>, CommandError>> + Send;
    /// Ask a player we own to exit.
    fn shutdown(&self) -> impl Future<Output = Result<(), CommandError>> + Send;
}

impl PlayerControl for MpvHandle {
    async fn query_current_path(&self) -> Result<Option<String>, CommandError> {
        MpvHandle::query_current_path(self).await
    }

    async fn load(&self, url: &str) -> Result<(), CommandError> {
        MpvHandle::load(self, url).await
    }

    async fn pause(&self) -> Result<(), CommandError> {
        self.set_pause(true).await
    }

    async fn resume(&self) -> Result<(), CommandError> {
        self.set_pause(false).await
    }

    async fn is_paused(&self) -> Result<bool, CommandError> {
        MpvHandle::is_paused(self).await
    }

    async fn media_title(&self) -> Result<Option<String>, CommandError> {
        MpvHandle::media_title(self).await
    }

    async fn shutdown(&self) -> Result<(), CommandError> {
        self.quit().await
    }
}

/// Load `url` and make sure it is audible.  mpv keeps its pause flag across
/// `loadfile`, so a paused player is resumed after loading.
pub async fn play_url<P: PlayerControl>(player: &P, url: &str) -> Result<(), CommandError> {
    player.load(url).await?;
    if player.is_paused().await? {
        player.resume().await?;
    }
    Ok(())
}

/// Work the control loop asks the dispatcher to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Load a stream and play it.
    Play { url: String },
    Pause,
    /// Query the current title and feed it back as `PlayerEvent::TitleChanged`.
    RefreshTitle,
    /// Stop the player we launched.  Ends the dispatcher.
    Shutdown,
}

/// Drain `rx` until it closes or a `Shutdown` has been executed.
pub async fn run_dispatcher<P: PlayerControl>(
    player: P,
    process: Option<PlayerProcess>,
    mut rx: mpsc::Receiver<PlayerCommand>,
    events_tx: mpsc::Sender<PlayerEvent>,
) {
    info!("dispatcher: started");
    while let Some(cmd) = rx.recv().await {
        debug!("dispatcher: {:?}", cmd);
        match cmd {
            PlayerCommand::Play { url } => {
                if let Err(e) = play_url(&player, &url).await {
                    warn!("dispatcher: play {} failed: {}", url, e);
                }
            }
            PlayerCommand::Pause => {
                if let Err(e) = player.pause().await {
                    warn!("dispatcher: pause failed: {}", e);
                }
            }
            PlayerCommand::RefreshTitle => match player.media_title().await {
                Ok(Some(title)) => {
                    if events_tx.try_send(PlayerEvent::TitleChanged(title)).is_err() {
                        debug!("dispatcher: event queue unavailable, title dropped");
                    }
                }
                Ok(None) => debug!("dispatcher: no title yet"),
                Err(e) => warn!("dispatcher: title query failed: {}", e),
            },
            PlayerCommand::Shutdown => {
                if let Err(e) = player.shutdown().await {
                    warn!("dispatcher: quit failed: {}", e);
                }
                if let Some(process) = &process {
                    process.kill().await;
                }
                break;
            }
        }
    }
    info!("dispatcher: stopped");
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::mpv::BridgeError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Inner {
        path: Option<String>,
        paused: bool,
        title: Option<String>,
        fail_load: bool,
        calls: Vec<String>,
    }

    /// In-memory player that records every call as a short string.
    #[derive(Clone, Default)]
    pub struct MockPlayer {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockPlayer {
        pub fn with_path(path: &str) -> Self {
            let player = Self::default();
            player.inner.lock().unwrap().path = Some(path.to_string());
            player
        }

        pub fn set_paused(&self, paused: bool) {
            self.inner.lock().unwrap().paused = paused;
        }

        pub fn set_title(&self, title: &str) {
            self.inner.lock().unwrap().title = Some(title.to_string());
        }

        pub fn fail_loads(&self) {
            self.inner.lock().unwrap().fail_load = true;
        }

        pub fn calls(&self) -> Vec<String> {
            self.inner.lock().unwrap().calls.clone()
        }

        pub fn is_paused_now(&self) -> bool {
            self.inner.lock().unwrap().paused
        }

        fn record(&self, call: String) {
            self.inner.lock().unwrap().calls.push(call);
        }
    }

    impl PlayerControl for MockPlayer {
        async fn query_current_path(&self) -> Result<Option<String>, CommandError> {
            self.record("query_path".into());
            Ok(self.inner.lock().unwrap().path.clone())
        }

        async fn load(&self, url: &str) -> Result<(), CommandError> {
            self.record(format!("load {}", url));
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_load {
                return Err(BridgeError::Player("loading failed".into()));
            }
            inner.path = Some(url.to_string());
            Ok(())
        }

        async fn pause(&self) -> Result<(), CommandError> {
            self.record("pause".into());
            self.inner.lock().unwrap().paused = true;
            Ok(())
        }

        async fn resume(&self) -> Result<(), CommandError> {
            self.record("resume".into());
            self.inner.lock().unwrap().paused = false;
            Ok(())
        }

        async fn is_paused(&self) -> Result<bool, CommandError> {
            Ok(self.inner.lock().unwrap().paused)
        }

        async fn media_title(&self) -> Result<Option<String>, CommandError> {
            Ok(self.inner.lock().unwrap().title.clone())
        }

        async fn shutdown(&self) -> Result<(), CommandError> {
            self.record("shutdown".into());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPlayer;
    use super::*;

    async fn dispatch_all(player: &MockPlayer, cmds: Vec<PlayerCommand>) -> Vec<PlayerEvent> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        for cmd in cmds {
            cmd_tx.send(cmd).await.unwrap();
        }
        drop(cmd_tx);
        run_dispatcher(player.clone(), None, cmd_rx, event_tx).await;
        let mut events = Vec::new();
        while let Ok(evt) = event_rx.try_recv() {
            events.push(evt);
        }
        events
    }

    #[tokio::test]
    async fn test_play_resumes_paused_player() {
        let player = MockPlayer::default();
        player.set_paused(true);
        dispatch_all(&player, vec![PlayerCommand::Play { url: "https://a/x.pls".into() }]).await;
        assert_eq!(player.calls(), vec!["load https://a/x.pls", "resume"]);
        assert!(!player.is_paused_now());
    }

    #[tokio::test]
    async fn test_failed_command_does_not_stop_dispatcher() {
        let player = MockPlayer::default();
        player.fail_loads();
        dispatch_all(
            &player,
            vec![
                PlayerCommand::Play { url: "https://a/x.pls".into() },
                PlayerCommand::Pause,
            ],
        )
        .await;
        assert_eq!(player.calls(), vec!["load https://a/x.pls", "pause"]);
    }

    #[tokio::test]
    async fn test_refresh_title_feeds_back_event() {
        let player = MockPlayer::default();
        player.set_title("Carbon Based Lifeforms - Photosynthesis");
        let events = dispatch_all(&player, vec![PlayerCommand::RefreshTitle]).await;
        assert_eq!(
            events,
            vec![PlayerEvent::TitleChanged(
                "Carbon Based Lifeforms - Photosynthesis".into()
            )]
        );
    }

    #[tokio::test]
    async fn test_shutdown_ends_dispatcher() {
        let player = MockPlayer::default();
        dispatch_all(&player, vec![PlayerCommand::Shutdown, PlayerCommand::Pause]).await;
        assert_eq!(player.calls(), vec!["shutdown"]);
    }
}
