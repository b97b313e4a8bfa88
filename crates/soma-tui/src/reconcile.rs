//! Startup reconciliation of the persisted session against the live player.
//!
//! This is the only place persisted intent and live player state are merged.
//! Afterwards the control loop is the single writer of `Session`.

use soma_proto::channel::ChannelList;
use soma_proto::config::Session;
use tracing::{info, warn};

use crate::core::Phase;
use crate::mpv::BridgeError;
use crate::player::{play_url, PlayerControl};

/// Seed for the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub session: Session,
    pub phase: Phase,
    pub cursor: usize,
}

impl Resolution {
    fn nothing_selected(cursor: usize) -> Self {
        Self {
            session: Session::default(),
            phase: Phase::Idle,
            cursor,
        }
    }
}

/// Resolve what is playing.  Only the initial path query may fail the whole
/// step; every later command failure is logged and resolved around.
pub async fn reconcile<P: PlayerControl>(
    player: &P,
    channels: &ChannelList,
    persisted: &Session,
) -> Result<Resolution, BridgeError> {
    let persisted_idx = persisted
        .selected_channel_id
        .as_deref()
        .and_then(|id| channels.position_by_id(id));
    let live_path = player.query_current_path().await?;

    if let Some(path) = live_path {
        let Some(idx) = channels.position_by_stream_url(&path) else {
            info!("reconcile: player has unknown stream {}, pausing it", path);
            if let Err(e) = player.pause().await {
                warn!("reconcile: pause failed: {}", e);
            }
            return Ok(Resolution::nothing_selected(persisted_idx.unwrap_or(0)));
        };
        let id = channels.channels[idx].id.clone();
        let applied = if persisted.is_paused {
            player.pause().await
        } else {
            player.resume().await
        };
        if let Err(e) = applied {
            warn!("reconcile: applying paused={} failed: {}", persisted.is_paused, e);
        }
        info!("reconcile: live stream is {} (paused={})", id, persisted.is_paused);
        let phase = if persisted.is_paused {
            Phase::Paused(id.clone())
        } else {
            Phase::Playing(id.clone())
        };
        return Ok(Resolution {
            session: Session {
                selected_channel_id: Some(id),
                is_paused: persisted.is_paused,
            },
            phase,
            cursor: idx,
        });
    }

    let Some(idx) = persisted_idx else {
        if let Some(id) = &persisted.selected_channel_id {
            info!("reconcile: saved channel {} no longer listed", id);
        }
        return Ok(Resolution::nothing_selected(0));
    };
    let channel = &channels.channels[idx];

    if persisted.is_paused {
        info!("reconcile: restoring paused selection {}", channel.id);
        return Ok(Resolution {
            session: Session::paused(channel.id.clone()),
            phase: Phase::Paused(channel.id.clone()),
            cursor: idx,
        });
    }

    info!("reconcile: player idle, resuming {}", channel.id);
    let phase = match play_url(player, &channel.stream_url).await {
        Ok(()) => Phase::Playing(channel.id.clone()),
        Err(e) => {
            warn!("reconcile: loading {} failed: {}", channel.id, e);
            Phase::Selecting
        }
    };
    Ok(Resolution {
        session: Session::playing(channel.id.clone()),
        phase,
        cursor: idx,
    })
}
