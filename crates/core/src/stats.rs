//! Derived frame-time statistics

use crate::TimestampMs;
use std::time::Duration;

/// The three timestamps every statistic is derived from
///
/// Once set, `last >= previous >= first` holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTimes {
    pub first: Option<TimestampMs>,
    pub previous: Option<TimestampMs>,
    pub last: Option<TimestampMs>,
}

impl FrameTimes {
    /// Fold one newly created frame into the window
    ///
    /// A frame newer than `last` shifts `last` into `previous`. An older
    /// frame only lands where it keeps the ordering intact.
    pub fn record(&mut self, created: TimestampMs) {
        match self.last {
            None => self.last = Some(created),
            Some(last) if created >= last => {
                self.previous = Some(last);
                self.last = Some(created);
            }
            Some(_) => {
                if self.previous.map_or(true, |prev| created > prev) {
                    self.previous = Some(created);
                }
            }
        }

        self.first = Some(self.first.map_or(created, |first| first.min(created)));
    }

    /// Time between the two most recent frames
    pub fn last_frame_time(&self) -> Option<Duration> {
        match (self.last, self.previous) {
            (Some(last), Some(prev)) => Some(Duration::from_millis(last.saturating_sub(prev))),
            _ => None,
        }
    }

    /// Time between the first and the most recent frame
    pub fn span(&self) -> Option<Duration> {
        match (self.first, self.last) {
            (Some(first), Some(last)) => Some(Duration::from_millis(last.saturating_sub(first))),
            _ => None,
        }
    }
}

/// Statistics derived from [`FrameTimes`] and the frame counts
///
/// Every field is `None` when it cannot be computed; zero is a real value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub last_frame_time: Option<Duration>,
    pub avg_frame_time: Option<Duration>,
    pub eta: Option<Duration>,
}

impl FrameStats {
    pub fn compute(times: &FrameTimes, completed: u64, total: u64) -> Self {
        let last_frame_time = times.last_frame_time();

        let avg_frame_time = match times.span() {
            Some(span) if completed > 1 => {
                Some(Duration::from_secs_f64(span.as_secs_f64() / (completed - 1) as f64))
            }
            _ => last_frame_time,
        };

        let eta = avg_frame_time
            .filter(|avg| !avg.is_zero())
            .filter(|_| completed < total)
            .map(|avg| avg.mul_f64((total - completed) as f64));

        Self {
            last_frame_time,
            avg_frame_time,
            eta,
        }
    }
}
