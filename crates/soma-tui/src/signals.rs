//! Termination-signal listener.
//!
//! Runs outside the control loop: on SIGINT/SIGTERM/SIGHUP the terminal is
//! restored, a player we launched is killed, and the process exits with
//! status 1 straight away.  The session is not saved on this path.

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::mpv::PlayerProcess;

/// Exit status used when a signal ends the program.
pub const SIGNAL_EXIT_CODE: i32 = 1;

pub fn spawn_listener(process: Option<PlayerProcess>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let name = match wait_for_termination().await {
            Ok(name) => name,
            Err(e) => {
                warn!("signals: cannot install handlers: {}", e);
                return;
            }
        };
        info!("signals: received {}, terminating", name);
        crate::app::restore_terminal();
        match process {
            Some(process) => {
                info!("signals: killing launched player (pid {:?})", process.pid());
                process.kill().await;
            }
            None => info!("signals: leaving external player running"),
        }
        std::process::exit(SIGNAL_EXIT_CODE);
    })
}

async fn wait_for_termination() -> std::io::Result<&'static str> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sighup.recv() => "SIGHUP",
    };
    Ok(name)
}
