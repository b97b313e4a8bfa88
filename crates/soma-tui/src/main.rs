mod action;
mod app;
mod component;
mod components;
mod core;
mod mpv;
mod player;
mod reconcile;
mod signals;
mod theme;
mod widgets;

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;

use soma_proto::config::ConfigStore;
use soma_proto::{directory, platform};

use crate::mpv::{ConnectOptions, Connection, ObservedProperty, PlayerEvent, PlayerProcess};

/// Capacity of the notification queue between the mpv reader and the loop.
const EVENT_QUEUE: usize = 256;
const COMMAND_QUEUE: usize = 64;

/// SomaFM in the terminal, played through mpv.
#[derive(Parser, Debug)]
#[command(name = "soma", version, about)]
struct Args {
    /// mpv IPC socket path
    #[arg(long, default_value_os_t = platform::default_socket_path())]
    socket: PathBuf,

    /// Launch mpv when nothing is listening on the socket
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    start_mpv: bool,

    /// mpv executable to launch (defaults to the one next to soma, then PATH)
    #[arg(long)]
    mpv: Option<PathBuf>,

    /// Persisted state file (defaults to <config dir>/soma.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-fetch the channel directory even if the cached copy is fresh
    #[arg(long)]
    refresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("soma.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,soma=debug,soma_proto=debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string()
    });
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("soma log: {}", log_path.display());
    tracing::info!("soma starting… {:?}", args);

    // ── Persisted state + directory ──────────────────────────────────────────
    let store = args
        .config
        .clone()
        .map(ConfigStore::new)
        .unwrap_or_else(ConfigStore::open_default);
    let mut stored = store.load();

    if args.refresh || stored.directory.needs_refresh(Utc::now()) {
        stored.directory = directory::fetch_snapshot(platform::DIRECTORY_URL)
            .await
            .context("could not fetch the SomaFM channel directory")?;
    } else {
        tracing::info!(
            "using cached directory ({} channels)",
            stored.directory.channels.len()
        );
    }
    let channels = stored.directory.channels.clone();

    // ── Player bridge ────────────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(EVENT_QUEUE);
    let mut opts = ConnectOptions::new(&args.socket, args.start_mpv);
    opts.stderr_log = Some(data_dir.join("mpv-stderr.log"));
    if let Some(binary) = args.mpv.clone() {
        opts.player_binary = binary;
    }
    let connection = mpv::connect(&opts, event_tx.clone())
        .await
        .with_context(|| format!("cannot reach mpv at {}", args.socket.display()))?;
    let owns_player = connection.owns_player();
    let Connection { handle, process } = connection;

    let startup = async {
        for prop in ObservedProperty::ALL {
            handle.subscribe(prop).await?;
        }
        reconcile::reconcile(&handle, &channels, &stored.session()).await
    };
    let resolution = match startup.await {
        Ok(r) => r,
        Err(e) => {
            abort_launched(process.as_ref()).await;
            return Err(e).context("mpv did not answer during startup");
        }
    };
    tracing::info!("startup resolved to {:?}", resolution.phase);

    signals::spawn_listener(process.clone());

    // ── Control loop + dispatcher ────────────────────────────────────────────
    let core = core::ControlLoop::new(channels, resolution, owns_player);
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let dispatcher = tokio::spawn(player::run_dispatcher(handle, process, cmd_rx, event_tx));

    let result = app::App::new(core, store, stored, cmd_tx, dispatcher)
        .run(event_rx)
        .await;

    // The terminal reader thread stays parked in a blocking read; exit
    // explicitly rather than wait for the runtime to join it.
    match result {
        Ok(()) => {
            tracing::info!("soma exiting");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!("terminal loop failed: {:#}", e);
            eprintln!("soma: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn abort_launched(process: Option<&PlayerProcess>) {
    if let Some(process) = process {
        process.kill().await;
    }
}
