//! mpv IPC bridge with separated reader/writer tasks.
//!
//! Architecture:
//!
//! ```text
//!   connect()
//!         │
//!         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── response (has request_id) → matched oneshot::Sender
//!                                └── property-change           → PlayerEvent → event_tx (try_send)
//! ```
//!
//! Public API:
//!   - `MpvHandle`: cheaply cloneable.  `send(cmd)` returns a `Future<Value>`.
//!   - `PlayerProcess`: owns an mpv child we launched ourselves.
//!   - `connect()`: attach to a listening socket, launching mpv first when allowed.
//!
//! The reader never waits on whoever consumes `PlayerEvent`s: a full queue
//! drops the notification with a warning instead of stalling command replies.
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── connection policy ─────────────────────────────────────────────────────────

/// Connection attempts made after launching mpv before giving up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 15;
/// Spacing between those attempts.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// How long a single command may wait for its reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// ── errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no mpv listening on {path}: {source}")]
    NoListener {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mpv did not become reachable after {attempts} attempts")]
    ConnectionTimeout { attempts: u32 },

    #[error("failed to launch mpv: {0}")]
    Launch(#[source] std::io::Error),

    #[error("mpv IPC connection closed")]
    Closed,

    #[error("mpv IPC timeout for req={0}")]
    Timeout(u64),

    #[error("mpv error: {0}")]
    Player(String),

    #[error("mpv IPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mpv IPC JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run-phase alias: an individual command that failed.
pub type CommandError = BridgeError;

// ── observed properties ───────────────────────────────────────────────────────

/// Properties whose changes mpv pushes to us.  The discriminant doubles as
/// the `observe_property` id we match on in property-change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedProperty {
    MediaTitle = 1,
    CoreIdle = 2,
}

impl ObservedProperty {
    pub const ALL: [ObservedProperty; 2] = [ObservedProperty::MediaTitle, ObservedProperty::CoreIdle];

    pub fn name(self) -> &'static str {
        match self {
            Self::MediaTitle => "media-title",
            Self::CoreIdle => "core-idle",
        }
    }

    pub fn observe_id(self) -> u64 {
        self as u64
    }

    fn from_event(id: Option<u64>, name: Option<&str>) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| Some(p.observe_id()) == id || Some(p.name()) == name)
    }
}

/// An asynchronous notification from the player, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Metadata title of the live stream changed.
    TitleChanged(String),
    /// `core-idle` flipped: `true` means no audio is flowing.
    IdleChanged(bool),
}

impl PlayerEvent {
    /// Decode an unsolicited mpv message.  Anything that is not a
    /// property-change for an observed property, or carries `null` data,
    /// yields `None`.
    pub fn decode(raw: &Value) -> Option<Self> {
        if raw.get("event")?.as_str()? != "property-change" {
            return None;
        }
        let prop = ObservedProperty::from_event(
            raw.get("id").and_then(Value::as_u64),
            raw.get("name").and_then(Value::as_str),
        )?;
        let data = raw.get("data")?;
        match prop {
            ObservedProperty::MediaTitle => data.as_str().map(|t| Self::TitleChanged(t.to_string())),
            ObservedProperty::CoreIdle => data.as_bool().map(Self::IdleChanged),
        }
    }
}

// ── internal channel types ────────────────────────────────────────────────────

type ReplyTx = oneshot::Sender<Result<Value, BridgeError>>;
type PendingMap = Arc<Mutex<HashMap<u64, ReplyTx>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: ReplyTx,
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> Result<Value, BridgeError> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::Closed)?;

        tokio::time::timeout(REPLY_TIMEOUT, reply_rx)
            .await
            .map_err(|_| BridgeError::Timeout(req_id))?
            .map_err(|_| BridgeError::Closed)?
    }

    /// Stream currently loaded by the player, `None` when idle.
    pub async fn query_current_path(&self) -> Result<Option<String>, BridgeError> {
        match self.send(json!(["get_property", "path"])).await {
            Ok(resp) => Ok(resp["data"].as_str().map(str::to_string)),
            // mpv reports the property as unavailable while nothing is loaded
            Err(BridgeError::Player(msg)) if msg == "property unavailable" => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn load(&self, url: &str) -> Result<(), BridgeError> {
        debug!("mpv: sending loadfile command for url={}", url);
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> Result<(), BridgeError> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn is_paused(&self) -> Result<bool, BridgeError> {
        let resp = self.send(json!(["get_property", "pause"])).await?;
        Ok(resp["data"].as_bool().unwrap_or(false))
    }

    pub async fn media_title(&self) -> Result<Option<String>, BridgeError> {
        match self.send(json!(["get_property", "media-title"])).await {
            Ok(resp) => Ok(resp["data"].as_str().map(str::to_string)),
            Err(BridgeError::Player(msg)) if msg == "property unavailable" => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ask mpv to push `property-change` events for `prop`.  They arrive on
    /// the event channel handed to [`connect`].
    pub async fn subscribe(&self, prop: ObservedProperty) -> Result<(), BridgeError> {
        self.send(json!(["observe_property", prop.observe_id(), prop.name()]))
            .await?;
        debug!("mpv: observe_property id={} name={}", prop.observe_id(), prop.name());
        Ok(())
    }

    pub async fn quit(&self) -> Result<(), BridgeError> {
        match self.send(json!(["quit"])).await {
            // mpv may hang up before answering
            Ok(_) | Err(BridgeError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ── launched process ──────────────────────────────────────────────────────────

/// An mpv child spawned by this process.  Cloneable; any clone can kill it.
#[derive(Clone)]
pub struct PlayerProcess {
    kill_tx: mpsc::Sender<oneshot::Sender<()>>,
    pid: Option<u32>,
}

impl PlayerProcess {
    /// Launch `<binary> --idle` listening on `socket_path`.
    pub fn spawn(
        mpv_binary: &Path,
        socket_path: &Path,
        stderr_log: Option<&Path>,
    ) -> Result<Self, BridgeError> {
        let ipc_arg = format!("--input-ipc-server={}", socket_path.display());

        let stderr = match stderr_log.map(open_append) {
            Some(Ok(file)) => std::process::Stdio::from(file),
            Some(Err(e)) => {
                warn!("mpv: cannot open stderr log: {}", e);
                std::process::Stdio::null()
            }
            None => std::process::Stdio::null(),
        };

        info!("mpv: spawning {:?} {}", mpv_binary, ipc_arg);
        let child = tokio::process::Command::new(mpv_binary)
            .arg("--idle=yes")
            .arg(&ipc_arg)
            .arg("--no-video")
            .arg("--quiet")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(BridgeError::Launch)?;
        let pid = child.id();
        info!("mpv: spawned process with pid {:?}", pid);

        let (kill_tx, kill_rx) = mpsc::channel(4);
        tokio::spawn(reap_task(child, kill_rx));
        Ok(Self { kill_tx, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kill the child and wait until it is gone.
    pub async fn kill(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.kill_tx.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Sole owner of the child.  Kills it on request (or once every handle is
/// dropped) and keeps acknowledging late kill requests afterwards.
async fn reap_task(
    mut child: tokio::process::Child,
    mut kill_rx: mpsc::Receiver<oneshot::Sender<()>>,
) {
    let kill_request = tokio::select! {
        req = kill_rx.recv() => Some(req),
        status = child.wait() => {
            match status {
                Ok(s) => warn!("mpv: launched process exited: {}", s),
                Err(e) => warn!("mpv: wait failed: {}", e),
            }
            None
        }
    };
    if let Some(req) = kill_request {
        info!("mpv: killing launched process");
        if let Err(e) = child.kill().await {
            warn!("mpv: kill failed: {}", e);
        }
        if let Some(ack) = req {
            let _ = ack.send(());
        }
    }
    while let Some(ack) = kill_rx.recv().await {
        let _ = ack.send(());
    }
}

// ── connect ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub socket_path: PathBuf,
    pub auto_launch: bool,
    pub max_attempts: u32,
    pub retry_interval: Duration,
    /// Executable launched when nobody is listening.
    pub player_binary: PathBuf,
    /// Where a launched mpv writes its stderr.
    pub stderr_log: Option<PathBuf>,
}

impl ConnectOptions {
    pub fn new(socket_path: impl Into<PathBuf>, auto_launch: bool) -> Self {
        Self {
            socket_path: socket_path.into(),
            auto_launch,
            max_attempts: MAX_CONNECT_ATTEMPTS,
            retry_interval: CONNECT_RETRY_INTERVAL,
            player_binary: soma_proto::platform::find_mpv_binary(),
            stderr_log: None,
        }
    }
}

/// A live control channel, plus the process behind it when we launched it.
pub struct Connection {
    pub handle: MpvHandle,
    pub process: Option<PlayerProcess>,
}

impl Connection {
    pub fn owns_player(&self) -> bool {
        self.process.is_some()
    }
}

/// Attach to mpv at `opts.socket_path`.
///
/// With no listener there and `auto_launch` set, mpv is spawned in idle mode
/// and the socket is retried up to `max_attempts` times.  Property-change
/// notifications are decoded and pushed onto `event_tx`.
pub async fn connect(
    opts: &ConnectOptions,
    event_tx: mpsc::Sender<PlayerEvent>,
) -> Result<Connection, BridgeError> {
    match UnixStream::connect(&opts.socket_path).await {
        Ok(stream) => {
            info!("mpv: connected to existing IPC socket {:?}", opts.socket_path);
            return Ok(Connection {
                handle: start_io_tasks(stream, event_tx),
                process: None,
            });
        }
        Err(e) if !opts.auto_launch => {
            return Err(BridgeError::NoListener {
                path: opts.socket_path.clone(),
                source: e,
            });
        }
        Err(e) => {
            info!("mpv: no listener at {:?} ({}), launching", opts.socket_path, e);
        }
    }

    let process = PlayerProcess::spawn(
        &opts.player_binary,
        &opts.socket_path,
        opts.stderr_log.as_deref(),
    )?;
    let path = opts.socket_path.clone();
    let stream = match retry_connect(opts.max_attempts, opts.retry_interval, |_| {
        UnixStream::connect(path.clone())
    })
    .await
    {
        Ok(s) => s,
        Err(e) => {
            warn!("mpv: launched player never opened {:?}, killing it", path);
            process.kill().await;
            return Err(e);
        }
    };
    info!("mpv: connected to launched player");
    Ok(Connection {
        handle: start_io_tasks(stream, event_tx),
        process: Some(process),
    })
}

/// Call `attempt` (with its 1-based attempt number) until it succeeds, at
/// most `max_attempts` times, sleeping `interval` between failures.
pub async fn retry_connect<T, F, Fut>(
    max_attempts: u32,
    interval: Duration,
    mut attempt: F,
) -> Result<T, BridgeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                debug!("mpv: connect attempt {}/{} failed: {}", n, max_attempts, e);
                if n < max_attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    Err(BridgeError::ConnectionTimeout {
        attempts: max_attempts,
    })
}

fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<PlayerEvent>) -> MpvHandle {
    let (read_half, write_half) = stream.into_split();
    let reader = BufReader::new(read_half);

    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<PlayerEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    // This is a command response; route to the pending request
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            debug!("mpv reader: response req={} ok", req_id);
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(BridgeError::Player(err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else if let Some(evt) = PlayerEvent::decode(&val) {
                    debug!("mpv reader: {:?}", evt);
                    match event_tx.try_send(evt) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(evt)) => {
                            warn!("mpv reader: event queue full, dropping {:?}", evt);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!("mpv reader: event queue closed");
                        }
                    }
                } else {
                    debug!("mpv reader: ignoring {}", trimmed);
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                break;
            }
        }
    }
    // Fail all pending requests
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(BridgeError::Closed));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!(
            "mpv writer: send req={} payload={}",
            req.req_id,
            req.payload.trim()
        );
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            // Remove and fail the request we just registered
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(BridgeError::Io(e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}
