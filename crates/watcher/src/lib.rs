//! File system watching for rendermon
//!
//! This crate provides:
//! - A non-recursive watch on a single render output directory
//! - Size-stability debouncing so half-written frames are never reported
//! - Generation tags so results from a replaced watch can be discarded
//! - A periodic reconciler that rescans the directory for missed events

pub mod debounce;
pub mod reconcile;

pub use debounce::StabilityTracker;
pub use reconcile::{PeriodicReconciler, Reconciliation};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify::event::{EventKind as NotifyKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Errors raised while establishing a watch
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to spawn watcher thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Debounce tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// How long a file's size must hold still before it is reported
    pub stability_threshold: Duration,
    /// How often pending files are re-sampled
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stability_threshold: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Event emitted by a [`Watcher`], tagged with the generation it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub generation: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The watch is established; the initial scan can run
    Ready,
    /// A file has been written and its size is stable
    Stabilized(PathBuf),
    /// A file was removed or renamed away
    Removed(PathBuf),
    /// The backend reported an error; the watch keeps running
    Error(String),
}

/// Active watch on one directory
///
/// Dropping the watcher stops it. The debounce thread notices within one
/// poll interval and exits on its own.
pub struct Watcher {
    root: PathBuf,
    generation: u64,
    stopped: Arc<AtomicBool>,
    inner: Option<RecommendedWatcher>,
}

impl Watcher {
    /// Start watching `root` (non-recursively)
    ///
    /// Events are delivered on `tx` until the watcher is stopped or the
    /// receiver is dropped.
    pub fn start(
        root: PathBuf,
        generation: u64,
        config: WatchConfig,
        tx: UnboundedSender<WatchEvent>,
    ) -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded();

        let mut inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the debounce thread already exited
            let _ = raw_tx.send(res);
        })
        .map_err(|source| WatchError::Notify {
            path: root.clone(),
            source,
        })?;

        inner
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: root.clone(),
                source,
            })?;

        let stopped = Arc::new(AtomicBool::new(false));
        let worker = DebounceWorker {
            root: root.clone(),
            generation,
            config,
            tx,
            stopped: stopped.clone(),
        };

        thread::Builder::new()
            .name(format!("rendermon-watch-{generation}"))
            .spawn(move || worker.run(raw_rx))?;

        info!(
            "Watching {} (generation {}, stability {:?})",
            root.display(),
            generation,
            config.stability_threshold
        );

        Ok(Self {
            root,
            generation,
            stopped,
            inner: Some(inner),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop delivering events; idempotent
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the backend drops the channel sender
        self.inner.take();
        debug!("Stopped watching {} (generation {})", self.root.display(), self.generation);
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct DebounceWorker {
    root: PathBuf,
    generation: u64,
    config: WatchConfig,
    tx: UnboundedSender<WatchEvent>,
    stopped: Arc<AtomicBool>,
}

impl DebounceWorker {
    fn run(self, raw_rx: Receiver<notify::Result<Event>>) {
        let mut tracker = StabilityTracker::new(self.config.stability_threshold);

        if !self.emit(EventKind::Ready) {
            return;
        }

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            match raw_rx.recv_timeout(self.config.poll_interval) {
                Ok(Ok(event)) => {
                    if !self.handle(&mut tracker, event) {
                        break;
                    }
                    // Drain whatever else is queued before sampling sizes
                    while let Ok(next) = raw_rx.try_recv() {
                        let keep_going = match next {
                            Ok(event) => self.handle(&mut tracker, event),
                            Err(e) => self.emit(EventKind::Error(e.to_string())),
                        };
                        if !keep_going {
                            return;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Watcher error on {}: {}", self.root.display(), e);
                    if !self.emit(EventKind::Error(e.to_string())) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if tracker.is_empty() || self.stopped.load(Ordering::SeqCst) {
                continue;
            }

            for path in tracker.poll(Instant::now(), file_size) {
                debug!("Stabilized: {}", path.display());
                if !self.emit(EventKind::Stabilized(path)) {
                    return;
                }
            }
        }

        debug!("Debounce thread for generation {} exiting", self.generation);
    }

    /// Returns false once the receiver is gone
    fn handle(&self, tracker: &mut StabilityTracker, event: Event) -> bool {
        let now = Instant::now();

        for path in event.paths {
            if !self.is_direct_child(&path) {
                continue;
            }

            match event.kind {
                NotifyKind::Create(_) | NotifyKind::Modify(ModifyKind::Data(_)) => {
                    tracker.touch(path, now);
                }
                NotifyKind::Modify(ModifyKind::Name(_)) => {
                    if path.exists() {
                        tracker.touch(path, now);
                    } else {
                        tracker.forget(&path);
                        if !self.emit(EventKind::Removed(path)) {
                            return false;
                        }
                    }
                }
                NotifyKind::Modify(_) => {
                    tracker.touch(path, now);
                }
                NotifyKind::Remove(_) => {
                    tracker.forget(&path);
                    if !self.emit(EventKind::Removed(path)) {
                        return false;
                    }
                }
                NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => {}
            }
        }
        true
    }

    fn is_direct_child(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }

    fn emit(&self, kind: EventKind) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.tx
            .send(WatchEvent {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}
