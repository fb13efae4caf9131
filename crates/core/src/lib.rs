//! Progress-tracking engine for rendermon
//!
//! This crate provides:
//! - Frame filename classification (allowlisted extensions, frame-number extraction)
//! - Authoritative directory scans ordered by frame creation time
//! - The progress state record and its derived frame-time statistics
//! - Wire types for snapshots and the viewer control protocol
//! - Viewer-side clock reconciliation

pub mod clock;
pub mod detect;
pub mod error;
pub mod format;
pub mod protocol;
pub mod scan;
pub mod state;
pub mod stats;
pub mod target;

// Re-exports
pub use clock::{ClockOffset, FrameHealth, LiveProgress};
pub use detect::{ExtractionStrategy, FrameDetector, FrameRecord, Rejection};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ProgressSnapshot, ServerMessage, TotalFramesInput};
pub use scan::{DirectoryScan, TimestampSource};
pub use state::ProgressState;
pub use stats::{FrameStats, FrameTimes};
pub use target::WatchTarget;

/// Milliseconds since the Unix epoch
pub type TimestampMs = u64;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> TimestampMs {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}
