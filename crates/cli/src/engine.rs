//! Progress engine actor
//!
//! A single task owns the [`ProgressState`]. HTTP handlers, viewer
//! connections, the directory watcher and the reconciler all talk to it
//! through channels, so every mutation is applied in order and followed by
//! exactly one broadcast snapshot.

use crate::hub::{BroadcastHub, Outbound};
use rendermon_core::scan::{probe, FrameProbe};
use rendermon_core::{
    now_ms, DirectoryScan, FrameDetector, ProgressSnapshot, ProgressState, ServerMessage,
    TimestampSource, TotalFramesInput, WatchTarget,
};
use rendermon_watcher::{
    EventKind, PeriodicReconciler, Reconciliation, WatchConfig, WatchEvent, Watcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_QUEUE: usize = 256;
const RECONCILE_QUEUE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] rendermon_core::Error),

    #[error("Progress engine is not running")]
    Closed,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Everything the engine needs to run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub watch_dir: PathBuf,
    pub default_total_frames: u64,
    pub watch: WatchConfig,
    pub reconcile_interval: Duration,
    pub frame_time_epsilon: Duration,
    pub detector: FrameDetector,
    pub timestamp_source: TimestampSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("render_output"),
            default_total_frames: 120,
            watch: WatchConfig::default(),
            reconcile_interval: Duration::from_secs(5),
            frame_time_epsilon: Duration::from_millis(100),
            detector: FrameDetector::default(),
            timestamp_source: TimestampSource::default(),
        }
    }
}

enum Command {
    Connect {
        conn_id: String,
        reply: oneshot::Sender<mpsc::Receiver<Outbound>>,
    },
    RequestState {
        conn_id: String,
    },
    SetTotalFrames {
        input: TotalFramesInput,
        origin: Option<String>,
        reply: oneshot::Sender<Result<u64, EngineError>>,
    },
    Reset {
        reply: oneshot::Sender<Result<u64, EngineError>>,
    },
    SwitchTarget {
        directory: String,
        reply: oneshot::Sender<Result<PathBuf, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ProgressSnapshot>,
    },
    Shutdown,
}

/// Cloneable front door to the engine task
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    hub: Arc<BroadcastHub>,
}

impl EngineHandle {
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Register a viewer; its queue already holds the `initialState` snapshot
    pub async fn connect(&self, conn_id: String) -> Result<mpsc::Receiver<Outbound>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { conn_id, reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Send a fresh snapshot to one viewer only
    pub async fn request_state(&self, conn_id: String) -> Result<(), EngineError> {
        self.send(Command::RequestState { conn_id }).await
    }

    /// Set the manual total; `origin` receives an error message on rejection
    pub async fn set_total_frames(
        &self,
        input: TotalFramesInput,
        origin: Option<String>,
    ) -> Result<u64, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetTotalFrames {
            input,
            origin,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Clear counters and recount; returns the recounted frames
    pub async fn reset(&self) -> Result<u64, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Watch a different directory; returns its resolved path
    pub async fn switch_target(&self, directory: String) -> Result<PathBuf, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SwitchTarget { directory, reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub async fn snapshot(&self) -> Result<ProgressSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    async fn send(&self, cmd: Command) -> Result<(), EngineError> {
        self.tx.send(cmd).await.map_err(|_| EngineError::Closed)
    }
}

/// Start the engine on `config.watch_dir`
///
/// The directory is created if needed and scanned before this returns, so
/// the first viewer already sees any frames that were on disk.
pub async fn start(
    config: EngineConfig,
    hub: Arc<BroadcastHub>,
) -> Result<(EngineHandle, JoinHandle<()>), EngineError> {
    let dir = config.watch_dir.clone();
    let target = tokio::task::spawn_blocking(move || WatchTarget::prepare(dir)).await??;

    let (tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let (watch_tx, watch_rx) = mpsc::unbounded_channel();
    let (recon_tx, recon_rx) = mpsc::channel(RECONCILE_QUEUE);

    let mut engine = Engine {
        state: ProgressState::new(target.path().to_path_buf(), config.default_total_frames),
        config,
        hub: hub.clone(),
        generation: 0,
        watcher: None,
        reconciler: None,
        watch_tx,
        recon_tx,
    };
    engine.activate(target.into_path()).await;

    let task = tokio::spawn(engine.run(cmd_rx, watch_rx, recon_rx));
    Ok((EngineHandle { tx, hub }, task))
}

struct Engine {
    state: ProgressState,
    config: EngineConfig,
    hub: Arc<BroadcastHub>,
    /// Bumped on every directory switch; stale events are dropped
    generation: u64,
    watcher: Option<Watcher>,
    reconciler: Option<JoinHandle<()>>,
    watch_tx: mpsc::UnboundedSender<WatchEvent>,
    recon_tx: mpsc::Sender<Reconciliation>,
}

impl Engine {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut watch_rx: mpsc::UnboundedReceiver<WatchEvent>,
        mut recon_rx: mpsc::Receiver<Reconciliation>,
    ) {
        info!(dir = %self.state.watch_dir().display(), "Progress engine running");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(event) = watch_rx.recv() => self.handle_watch_event(event).await,
                Some(result) = recon_rx.recv() => self.handle_reconciliation(result),
            }
        }

        self.release_watch();
        info!("Progress engine stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { conn_id, reply } => {
                let rx = self.hub.add(conn_id.clone());
                self.send_state_to(&conn_id);
                info!(conn_id = %conn_id, connections = self.hub.connection_count(), "Viewer connected");
                let _ = reply.send(rx);
            }
            Command::RequestState { conn_id } => self.send_state_to(&conn_id),
            Command::SetTotalFrames {
                input,
                origin,
                reply,
            } => {
                let result = input
                    .parse()
                    .and_then(|value| self.state.set_manual_total(value as i64));
                match result {
                    Ok(total) => {
                        info!(total, "Manual total frames set");
                        self.broadcast();
                        let _ = reply.send(Ok(total));
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected total frames");
                        if let Some(conn_id) = origin {
                            self.send_to(&conn_id, &ServerMessage::Error { message: e.to_string() });
                        }
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            Command::Reset { reply } => {
                self.state.reset();
                if let Some(scan) = self.scan().await {
                    self.state.apply_scan(&scan);
                }
                info!(completed = self.state.completed_frames(), "Frame counters reset");
                self.broadcast();
                let _ = reply.send(Ok(self.state.completed_frames()));
            }
            Command::SwitchTarget { directory, reply } => {
                let result = self.switch_target(directory).await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot(now_ms()));
            }
            Command::Shutdown => {}
        }
    }

    async fn switch_target(&mut self, directory: String) -> Result<PathBuf, EngineError> {
        let target = tokio::task::spawn_blocking(move || WatchTarget::prepare(directory)).await??;
        let path = target.into_path();

        info!(
            from = %self.state.watch_dir().display(),
            to = %path.display(),
            "Switching watch directory"
        );
        self.activate(path.clone()).await;
        Ok(path)
    }

    /// Replace the watch, reset everything and rescan
    async fn activate(&mut self, path: PathBuf) {
        self.release_watch();
        self.generation += 1;
        self.state.switch_target(path.clone());

        match Watcher::start(
            path.clone(),
            self.generation,
            self.config.watch,
            self.watch_tx.clone(),
        ) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => warn!(error = %e, "File watching unavailable, relying on periodic rescans"),
        }

        let reconciler = PeriodicReconciler::new(
            path,
            self.generation,
            self.config.reconcile_interval,
            self.config.detector,
            self.config.timestamp_source,
            self.recon_tx.clone(),
        );
        self.reconciler = Some(tokio::spawn(reconciler.run()));

        if let Some(scan) = self.scan().await {
            if scan.rejected() > 0 {
                debug!(rejected = scan.rejected(), "Files outside the frame sequence");
            }
            self.state.apply_scan(&scan);
        }
        info!(
            dir = %self.state.watch_dir().display(),
            completed = self.state.completed_frames(),
            generation = self.generation,
            "Watching directory"
        );
        self.broadcast();
    }

    fn release_watch(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(handle) = self.reconciler.take() {
            handle.abort();
        }
    }

    async fn handle_watch_event(&mut self, event: WatchEvent) {
        if event.generation != self.generation {
            debug!(generation = event.generation, "Dropping event from previous watch");
            return;
        }

        match event.kind {
            EventKind::Ready => debug!(generation = event.generation, "Watcher ready"),
            EventKind::Stabilized(path) => self.on_stabilized(path).await,
            EventKind::Removed(path) => {
                debug!(file = %path.display(), "File removed");
                if let Some(scan) = self.scan().await {
                    if self.state.reconcile(&scan, self.config.frame_time_epsilon) {
                        self.broadcast();
                    }
                }
            }
            EventKind::Error(message) => warn!(error = %message, "Watcher error"),
        }
    }

    async fn on_stabilized(&mut self, path: PathBuf) {
        let detector = self.config.detector;
        let source = self.config.timestamp_source;
        let probe_path = path.clone();
        let probed = tokio::task::spawn_blocking(move || probe(&probe_path, &detector, source)).await;

        let record = match probed {
            Ok(Ok(FrameProbe::Frame(record))) => record,
            Ok(Ok(FrameProbe::Rejected { filename, reason })) => {
                warn!(file = %filename, %reason, "File doesn't appear to be part of a sequence");
                return;
            }
            Ok(Ok(FrameProbe::Missing)) => return,
            Ok(Err(e)) => {
                warn!(file = %path.display(), error = %e, "Failed to read new frame");
                return;
            }
            Err(e) => {
                error!(error = %e, "Frame probe task failed");
                return;
            }
        };

        let count = self.scan().await.map(|scan| scan.count());
        let before = self.state.completed_frames();
        let applied = self.state.record_frame(&record, count);

        info!(
            file = %record.filename,
            frame = record.frame_number,
            completed = self.state.completed_frames(),
            "New frame detected"
        );
        if applied || before != self.state.completed_frames() {
            self.broadcast();
        }
    }

    fn handle_reconciliation(&mut self, result: Reconciliation) {
        if result.generation != self.generation {
            debug!(generation = result.generation, "Dropping stale reconciliation");
            return;
        }
        if self
            .state
            .reconcile(&result.scan, self.config.frame_time_epsilon)
        {
            info!(completed = self.state.completed_frames(), "Reconciliation updated progress");
            self.broadcast();
        }
    }

    /// Authoritative listing of the current directory; `None` on failure
    async fn scan(&self) -> Option<DirectoryScan> {
        let dir = self.state.watch_dir().to_path_buf();
        let detector = self.config.detector;
        let source = self.config.timestamp_source;

        match tokio::task::spawn_blocking(move || DirectoryScan::run(&dir, &detector, source)).await {
            Ok(Ok(scan)) => Some(scan),
            Ok(Err(e)) => {
                warn!(error = %e, "Directory scan failed, keeping last known counts");
                None
            }
            Err(e) => {
                error!(error = %e, "Directory scan task failed");
                None
            }
        }
    }

    fn broadcast(&self) {
        let snapshot = self.state.snapshot(now_ms());
        let stats = self.state.stats();
        debug!(
            completed = snapshot.completed_frames,
            total = snapshot.total_frames,
            percentage = snapshot.percentage,
            last_ms = stats.last_frame_time.map(|d| d.as_millis() as u64),
            avg_ms = stats.avg_frame_time.map(|d| d.as_millis() as u64),
            eta_ms = stats.eta.map(|d| d.as_millis() as u64),
            "Broadcasting update"
        );

        if let Some(text) = encode(&ServerMessage::Update(snapshot)) {
            self.hub.broadcast(text);
        }
    }

    fn send_state_to(&self, conn_id: &str) {
        let snapshot = self.state.snapshot(now_ms());
        self.send_to(conn_id, &ServerMessage::InitialState(snapshot));
    }

    fn send_to(&self, conn_id: &str, message: &ServerMessage) {
        if let Some(text) = encode(message) {
            if !self.hub.send_to(conn_id, text) {
                debug!(conn_id, "Viewer unavailable for direct message");
            }
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            error!(error = %e, "Failed to serialize viewer message");
            None
        }
    }
}
