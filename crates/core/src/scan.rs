//! Authoritative directory scans
//!
//! The filesystem is the source of truth for progress. Notifications only
//! tell us when to look again; every count comes from one of these scans.

use crate::detect::{FrameDetector, FrameRecord, Rejection};
use crate::error::{Error, Result};
use crate::stats::FrameTimes;
use crate::TimestampMs;
use serde::{Deserialize, Serialize};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Which file timestamp orders frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Birth time, falling back to modification time where unsupported
    #[default]
    Created,
    /// Modification time
    Modified,
}

impl TimestampSource {
    pub fn read(&self, meta: &Metadata) -> io::Result<TimestampMs> {
        let time = match self {
            TimestampSource::Created => meta.created().or_else(|_| meta.modified())?,
            TimestampSource::Modified => meta.modified()?,
        };
        Ok(system_time_ms(time))
    }
}

fn system_time_ms(time: SystemTime) -> TimestampMs {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}

/// Result of listing the watch directory once
///
/// Records are sorted by creation time, ties broken by filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryScan {
    records: Vec<FrameRecord>,
    rejected: usize,
}

impl DirectoryScan {
    /// List `dir` and validate every entry
    ///
    /// Fails only when the directory itself cannot be read. Entries that
    /// cannot be stat'ed are skipped and logged.
    pub fn run(dir: &Path, detector: &FrameDetector, source: TimestampSource) -> Result<Self> {
        let meta = fs::metadata(dir).map_err(|e| Error::io(dir, e))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(dir.to_path_buf()));
        }

        let mut records = Vec::new();
        let mut rejected = 0;

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
                    return Err(Error::io(dir, source));
                }
                Err(err) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let lossy = entry.file_name().to_string_lossy();
            let name: &str = &lossy;

            let frame_number = match detector.classify(name) {
                Ok(n) => n,
                Err(Rejection::DisallowedExtension) => continue,
                Err(reason) => {
                    debug!(file = name, %reason, "File doesn't appear to be part of a sequence");
                    rejected += 1;
                    continue;
                }
            };

            let created_ms = match entry
                .metadata()
                .map_err(io::Error::from)
                .and_then(|meta| source.read(&meta))
            {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(file = name, error = %e, "Failed to stat frame file");
                    continue;
                }
            };

            records.push(FrameRecord {
                filename: name.to_string(),
                frame_number,
                created_ms,
            });
        }

        records.sort_by(|a, b| {
            a.created_ms
                .cmp(&b.created_ms)
                .then_with(|| a.filename.cmp(&b.filename))
        });

        Ok(Self { records, rejected })
    }

    /// Build a scan from already validated records
    pub fn from_records(mut records: Vec<FrameRecord>) -> Self {
        records.sort_by(|a, b| {
            a.created_ms
                .cmp(&b.created_ms)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Self {
            records,
            rejected: 0,
        }
    }

    /// Number of valid frame files
    pub fn count(&self) -> u64 {
        self.records.len() as u64
    }

    /// Files that had a frame extension but failed validation
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// Chronologically first frame
    pub fn first(&self) -> Option<&FrameRecord> {
        self.records.first()
    }

    /// Most recent frame
    pub fn latest(&self) -> Option<&FrameRecord> {
        self.records.last()
    }

    /// Frame created just before [`Self::latest`]
    pub fn previous(&self) -> Option<&FrameRecord> {
        self.records.len().checked_sub(2).map(|i| &self.records[i])
    }

    pub fn frame_times(&self) -> FrameTimes {
        FrameTimes {
            first: self.first().map(|r| r.created_ms),
            previous: self.previous().map(|r| r.created_ms),
            last: self.latest().map(|r| r.created_ms),
        }
    }
}

/// Outcome of examining one changed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameProbe {
    /// Valid frame file
    Frame(FrameRecord),
    /// File exists but is not part of the sequence
    Rejected { filename: String, reason: Rejection },
    /// Path vanished or is not a regular file
    Missing,
}

/// Validate a single file reported by the watcher
pub fn probe(path: &Path, detector: &FrameDetector, source: TimestampSource) -> Result<FrameProbe> {
    let Some(file_name) = path.file_name() else {
        return Ok(FrameProbe::Missing);
    };
    let lossy = file_name.to_string_lossy();
    let name: &str = &lossy;

    let frame_number = match detector.classify(name) {
        Ok(n) => n,
        Err(reason) => {
            return Ok(FrameProbe::Rejected {
                filename: name.to_string(),
                reason,
            })
        }
    };

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FrameProbe::Missing),
        Err(e) => return Err(Error::io(path, e)),
    };
    if !meta.is_file() {
        return Ok(FrameProbe::Missing);
    }

    let created_ms = source.read(&meta).map_err(|e| Error::io(path, e))?;

    Ok(FrameProbe::Frame(FrameRecord {
        filename: name.to_string(),
        frame_number,
        created_ms,
    }))
}
