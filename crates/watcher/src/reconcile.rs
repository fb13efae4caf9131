//! Periodic reconciliation scanner
//!
//! Rescans the watch directory on a fixed interval so frames whose
//! notifications were lost (overflow, network mounts, races during a
//! directory switch) still show up in the counts.

use rendermon_core::{DirectoryScan, FrameDetector, TimestampSource};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Scan result tagged with the watch generation it was taken for
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub generation: u64,
    pub scan: DirectoryScan,
}

/// Periodic reconciliation scanner
pub struct PeriodicReconciler {
    /// Directory being watched
    root: PathBuf,

    /// Generation of the watch this reconciler belongs to
    generation: u64,

    /// Scan interval (default: 5 seconds)
    interval: Duration,

    detector: FrameDetector,
    source: TimestampSource,

    /// Sender for scan results
    result_tx: mpsc::Sender<Reconciliation>,
}

impl PeriodicReconciler {
    pub fn new(
        root: PathBuf,
        generation: u64,
        interval: Duration,
        detector: FrameDetector,
        source: TimestampSource,
        result_tx: mpsc::Sender<Reconciliation>,
    ) -> Self {
        Self {
            root,
            generation,
            interval,
            detector,
            source,
            result_tx,
        }
    }

    /// Run until the receiving side goes away
    ///
    /// The first scan happens one interval after start; the initial scan is
    /// the caller's job.
    pub async fn run(self) {
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting periodic reconciliation of {} (interval: {:?})",
            self.root.display(),
            self.interval
        );

        loop {
            timer.tick().await;

            if self.result_tx.is_closed() {
                break;
            }

            let root = self.root.clone();
            let detector = self.detector;
            let source = self.source;
            let scan = tokio::task::spawn_blocking(move || {
                DirectoryScan::run(&root, &detector, source)
            })
            .await;

            let scan = match scan {
                Ok(Ok(scan)) => scan,
                Ok(Err(e)) => {
                    warn!("Periodic reconciliation scan failed: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Periodic reconciliation task failed: {}", e);
                    continue;
                }
            };

            debug!(
                "Periodic reconciliation of {}: {} frames",
                self.root.display(),
                scan.count()
            );

            let result = Reconciliation {
                generation: self.generation,
                scan,
            };
            if self.result_tx.send(result).await.is_err() {
                break;
            }
        }

        debug!("Reconciler for generation {} stopped", self.generation);
    }
}
