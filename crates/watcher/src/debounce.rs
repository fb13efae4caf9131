//! Size-stability debouncing
//!
//! A render writes a frame over many events. A path is only reported once
//! its size has stopped changing for the quiet period.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Pending {
    size: Option<u64>,
    changed_at: Instant,
}

/// Per-path quiet-period tracker
#[derive(Debug)]
pub struct StabilityTracker {
    threshold: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl StabilityTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: HashMap::new(),
        }
    }

    /// Record activity on `path`, restarting its quiet period
    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|p| p.changed_at = now)
            .or_insert(Pending {
                size: None,
                changed_at: now,
            });
    }

    /// Stop tracking `path` (removed or renamed away)
    pub fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Sample sizes and return paths that have been quiet for the threshold
    ///
    /// `size_of` returns `None` for paths that vanished or are not regular
    /// files; those are dropped.
    pub fn poll<F>(&mut self, now: Instant, mut size_of: F) -> Vec<PathBuf>
    where
        F: FnMut(&Path) -> Option<u64>,
    {
        let mut ready = Vec::new();

        self.pending.retain(|path, pending| {
            let Some(size) = size_of(path) else {
                return false;
            };

            if pending.size != Some(size) {
                pending.size = Some(size);
                pending.changed_at = now;
                return true;
            }

            if now.duration_since(pending.changed_at) >= self.threshold {
                ready.push(path.clone());
                return false;
            }
            true
        });

        ready.sort();
        ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
