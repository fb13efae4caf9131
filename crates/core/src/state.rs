//! Authoritative progress state
//!
//! One `ProgressState` exists per process. It is owned by a single task and
//! mutated only through the methods below, each of which leaves the derived
//! statistics consistent with the counters.

use crate::detect::FrameRecord;
use crate::error::Result;
use crate::protocol::{validate_total_frames, ProgressSnapshot};
use crate::scan::DirectoryScan;
use crate::stats::{FrameStats, FrameTimes};
use crate::TimestampMs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    watch_dir: PathBuf,
    completed_frames: u64,
    detected_total_frames: u64,
    manual_total_override: Option<u64>,
    times: FrameTimes,
    /// Filename behind `times.last`, so a re-stabilized file is not counted twice
    last_filename: Option<String>,
}

impl ProgressState {
    /// `detected_total_frames` is the configured default and must be positive
    pub fn new(watch_dir: PathBuf, detected_total_frames: u64) -> Self {
        Self {
            watch_dir,
            completed_frames: 0,
            detected_total_frames: detected_total_frames.max(1),
            manual_total_override: None,
            times: FrameTimes::default(),
            last_filename: None,
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub fn completed_frames(&self) -> u64 {
        self.completed_frames
    }

    pub fn detected_total_frames(&self) -> u64 {
        self.detected_total_frames
    }

    pub fn manual_total_override(&self) -> Option<u64> {
        self.manual_total_override
    }

    pub fn times(&self) -> &FrameTimes {
        &self.times
    }

    /// Manual override if present, otherwise the configured default
    pub fn effective_total(&self) -> u64 {
        self.manual_total_override
            .unwrap_or(self.detected_total_frames)
    }

    /// Completion percentage, intentionally unclamped
    pub fn percentage(&self) -> f64 {
        self.completed_frames as f64 / self.effective_total() as f64 * 100.0
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats::compute(&self.times, self.completed_frames, self.effective_total())
    }

    /// Clear counters, timestamps and the manual override
    pub fn reset(&mut self) {
        self.completed_frames = 0;
        self.manual_total_override = None;
        self.times = FrameTimes::default();
        self.last_filename = None;
    }

    /// Point at a new directory; all history from the old one is dropped
    pub fn switch_target(&mut self, watch_dir: PathBuf) {
        self.reset();
        self.watch_dir = watch_dir;
    }

    /// Replace counters and timestamps with the result of a full scan
    pub fn apply_scan(&mut self, scan: &DirectoryScan) {
        self.completed_frames = scan.count();
        self.times = scan.frame_times();
        self.last_filename = scan.latest().map(|r| r.filename.clone());
    }

    /// Apply one newly stabilized frame
    ///
    /// `authoritative_count` is a fresh directory count; when the recount
    /// failed the last known count is kept. Returns false when the record is
    /// the file already holding `last` (a repeated notification).
    pub fn record_frame(&mut self, record: &FrameRecord, authoritative_count: Option<u64>) -> bool {
        if self.last_filename.as_deref() == Some(record.filename.as_str())
            && self.times.last == Some(record.created_ms)
        {
            if let Some(count) = authoritative_count {
                self.completed_frames = count;
            }
            return false;
        }

        let before = self.times.last;
        self.times.record(record.created_ms);
        if self.times.last != before {
            self.last_filename = Some(record.filename.clone());
        }

        if let Some(count) = authoritative_count {
            self.completed_frames = count;
        }
        true
    }

    /// Set the manual total; the state is untouched on rejection
    pub fn set_manual_total(&mut self, value: i64) -> Result<u64> {
        let total = validate_total_frames(value)?;
        self.manual_total_override = Some(total);
        Ok(total)
    }

    /// Re-derive counters and timestamps from a periodic scan
    ///
    /// Returns true when the change is worth broadcasting: the count moved,
    /// or the last frame time moved by more than `epsilon`.
    pub fn reconcile(&mut self, scan: &DirectoryScan, epsilon: Duration) -> bool {
        let old_count = self.completed_frames;
        let old_frame_time = self.times.last_frame_time();

        self.apply_scan(scan);

        let new_frame_time = self.times.last_frame_time();
        let frame_time_moved = match (old_frame_time, new_frame_time) {
            (Some(old), Some(new)) => {
                let delta = if old > new { old - new } else { new - old };
                delta > epsilon
            }
            (None, None) => false,
            _ => true,
        };

        old_count != self.completed_frames || frame_time_moved
    }

    /// Build the immutable wire view of the current state
    pub fn snapshot(&self, server_timestamp: TimestampMs) -> ProgressSnapshot {
        ProgressSnapshot {
            completed_frames: self.completed_frames,
            total_frames: self.effective_total(),
            percentage: self.percentage(),
            first_frame_timestamp: self.times.first,
            last_frame_timestamp: self.times.last,
            previous_frame_timestamp: self.times.previous,
            server_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FrameDetector;

    const T0: TimestampMs = 1_700_000_000_000;

    fn frame(name: &str, created_ms: TimestampMs) -> FrameRecord {
        FrameDetector::default().record(name, created_ms).unwrap()
    }

    fn state() -> ProgressState {
        ProgressState::new(PathBuf::from("/renders/sh010"), 100)
    }

    #[test]
    fn test_first_frame_in_empty_directory() {
        let mut state = state();
        state.apply_scan(&DirectoryScan::default());

        assert!(state.record_frame(&frame("frame_0001.png", T0), Some(1)));

        assert_eq!(state.completed_frames(), 1);
        assert_eq!(state.times().first, Some(T0));
        let stats = state.stats();
        assert!(stats.last_frame_time.is_none());
        assert!(stats.avg_frame_time.is_none());
        assert!(stats.eta.is_none());
    }

    #[test]
    fn test_second_frame_ten_seconds_later() {
        let mut state = state();
        state.record_frame(&frame("frame_0001.png", T0), Some(1));
        state.record_frame(&frame("frame_0002.png", T0 + 10_000), Some(2));

        let stats = state.stats();
        assert_eq!(stats.last_frame_time, Some(Duration::from_secs(10)));
        assert_eq!(stats.avg_frame_time, Some(Duration::from_secs(10)));
        assert!((stats.eta.unwrap().as_secs_f64() - 980.0).abs() < 1e-6);
    }

    #[test]
    fn test_manual_total_takes_precedence() {
        let mut state = state();
        state.record_frame(&frame("frame_0001.png", T0), Some(1));
        state.record_frame(&frame("frame_0002.png", T0 + 10_000), Some(2));

        assert_eq!(state.set_manual_total(50).unwrap(), 50);
        assert_eq!(state.effective_total(), 50);
        assert!((state.stats().eta.unwrap().as_secs_f64() - 480.0).abs() < 1e-6);

        let snapshot = state.snapshot(T0 + 11_000);
        assert_eq!(snapshot.total_frames, 50);
        assert!((snapshot.percentage - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_manual_total_leaves_state_unchanged() {
        let mut state = state();
        state.set_manual_total(40).unwrap();
        let before = state.clone();

        assert!(state.set_manual_total(0).is_err());
        assert!(state.set_manual_total(-5).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_overshoot_is_not_clamped() {
        let mut state = state();
        state.set_manual_total(4).unwrap();
        state.apply_scan(&DirectoryScan::from_records(
            (1..=6).map(|i| frame(&format!("f{i:04}.png"), T0 + i * 1_000)).collect(),
        ));

        assert_eq!(state.completed_frames(), 6);
        assert!((state.percentage() - 150.0).abs() < 1e-9);
        assert!(state.stats().eta.is_none());
    }

    #[test]
    fn test_switch_target_resets_everything() {
        let mut state = state();
        state.record_frame(&frame("frame_0001.png", T0), Some(1));
        state.set_manual_total(10).unwrap();

        state.switch_target(PathBuf::from("/renders/sh020"));

        assert_eq!(state.watch_dir(), Path::new("/renders/sh020"));
        assert_eq!(state.completed_frames(), 0);
        assert_eq!(state.manual_total_override(), None);
        assert_eq!(state.times(), &FrameTimes::default());
        assert_eq!(state.effective_total(), 100);
    }

    #[test]
    fn test_reset_then_rescan_is_idempotent() {
        let scan = DirectoryScan::from_records(vec![
            frame("frame_0001.png", T0),
            frame("frame_0002.png", T0 + 5_000),
            frame("frame_0003.png", T0 + 9_000),
        ]);

        let mut state = state();
        state.reset();
        state.apply_scan(&scan);
        let first = state.clone();

        state.reset();
        state.apply_scan(&scan);
        assert_eq!(state, first);
        assert_eq!(state.completed_frames(), 3);
        assert_eq!(state.times().previous, Some(T0 + 5_000));
    }

    #[test]
    fn test_repeated_notification_is_not_double_counted() {
        let mut state = state();
        let record = frame("frame_0001.png", T0);
        assert!(state.record_frame(&record, Some(1)));
        assert!(!state.record_frame(&record, Some(1)));

        assert_eq!(state.times().previous, None);
        assert_eq!(state.completed_frames(), 1);
    }

    #[test]
    fn test_failed_recount_keeps_last_known_count() {
        let mut state = state();
        state.record_frame(&frame("frame_0001.png", T0), Some(7));
        state.record_frame(&frame("frame_0002.png", T0 + 1_000), None);

        assert_eq!(state.completed_frames(), 7);
        assert_eq!(state.times().last, Some(T0 + 1_000));
    }

    #[test]
    fn test_reconcile_reports_material_changes_only() {
        let epsilon = Duration::from_millis(100);
        let mut state = state();
        state.apply_scan(&DirectoryScan::from_records(vec![
            frame("frame_0001.png", T0),
            frame("frame_0002.png", T0 + 10_000),
        ]));

        let jitter = DirectoryScan::from_records(vec![
            frame("frame_0001.png", T0),
            frame("frame_0002.png", T0 + 10_050),
        ]);
        assert!(!state.reconcile(&jitter, epsilon));
        assert_eq!(state.times().last, Some(T0 + 10_050));

        let missed = DirectoryScan::from_records(vec![
            frame("frame_0001.png", T0),
            frame("frame_0002.png", T0 + 10_050),
            frame("frame_0003.png", T0 + 30_000),
        ]);
        assert!(state.reconcile(&missed, epsilon));
        assert_eq!(state.completed_frames(), 3);
        assert_eq!(state.stats().last_frame_time, Some(Duration::from_millis(19_950)));
    }
}
