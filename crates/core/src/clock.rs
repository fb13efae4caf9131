//! Viewer-side clock reconciliation
//!
//! Viewers never assume their clock matches the server's. Each snapshot
//! carries the server time at construction; the offset against the local
//! receipt time lets a viewer keep elapsed and since-last-frame displays
//! ticking between pushes. One-way estimate: transit latency is ignored.

use crate::protocol::ProgressSnapshot;
use crate::stats::FrameStats;
use crate::TimestampMs;
use std::time::Duration;

/// `server clock - local clock`, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOffset {
    offset_ms: i64,
}

impl ClockOffset {
    pub fn observe(server_timestamp: TimestampMs, local_at_receipt: TimestampMs) -> Self {
        Self {
            offset_ms: server_timestamp as i64 - local_at_receipt as i64,
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Estimate of the server clock at `local_now`
    pub fn server_now(&self, local_now: TimestampMs) -> TimestampMs {
        (local_now as i64).saturating_add(self.offset_ms).max(0) as TimestampMs
    }

    /// Time elapsed since a server-side timestamp, as seen at `local_now`
    pub fn since(&self, remote: TimestampMs, local_now: TimestampMs) -> Duration {
        Duration::from_millis(self.server_now(local_now).saturating_sub(remote))
    }
}

/// How the in-progress frame compares to recent frame times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHealth {
    Normal,
    /// Past 1.5x the larger of average and last frame time
    Warning,
    /// Past 3x
    Alert,
}

/// Latest snapshot plus the offset observed when it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct LiveProgress {
    snapshot: ProgressSnapshot,
    offset: ClockOffset,
}

impl LiveProgress {
    pub fn new(snapshot: ProgressSnapshot, local_at_receipt: TimestampMs) -> Self {
        let offset = ClockOffset::observe(snapshot.server_timestamp, local_at_receipt);
        Self { snapshot, offset }
    }

    /// Replace the snapshot and refresh the offset
    pub fn apply(&mut self, snapshot: ProgressSnapshot, local_at_receipt: TimestampMs) {
        *self = Self::new(snapshot, local_at_receipt);
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn offset(&self) -> ClockOffset {
        self.offset
    }

    pub fn stats(&self) -> FrameStats {
        self.snapshot.stats()
    }

    /// Time since the first frame
    pub fn elapsed(&self, local_now: TimestampMs) -> Option<Duration> {
        self.snapshot
            .first_frame_timestamp
            .map(|first| self.offset.since(first, local_now))
    }

    /// Time spent on the frame currently rendering
    pub fn since_last_frame(&self, local_now: TimestampMs) -> Option<Duration> {
        self.snapshot
            .last_frame_timestamp
            .map(|last| self.offset.since(last, local_now))
    }

    pub fn health(&self, local_now: TimestampMs) -> FrameHealth {
        let stats = self.stats();
        let (Some(current), Some(avg)) = (self.since_last_frame(local_now), stats.avg_frame_time)
        else {
            return FrameHealth::Normal;
        };
        if current.is_zero() || avg.is_zero() {
            return FrameHealth::Normal;
        }

        let reference = avg.max(stats.last_frame_time.unwrap_or(Duration::ZERO));
        if current > reference.mul_f64(3.0) {
            FrameHealth::Alert
        } else if current > reference.mul_f64(1.5) {
            FrameHealth::Warning
        } else {
            FrameHealth::Normal
        }
    }
}
