//! Frame filename classification
//!
//! A file is part of the render sequence when its extension is on the
//! allowlist and its name carries a numeric token. Everything else is
//! rejected before it can reach the progress counters.

use crate::TimestampMs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Extensions recognised as rendered frames (compared case-insensitively)
pub const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "exr", "hdr", "dpx"];

/// Which digit run of a filename holds the frame number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// First contiguous digit run (`shot12_frame_0042.exr` -> 12)
    #[default]
    First,
    /// Last contiguous digit run (`shot12_frame_0042.exr` -> 42)
    Last,
}

/// Why a filename was excluded from the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Extension missing or not on the allowlist
    DisallowedExtension,
    /// No digit run in the filename
    NoFrameNumber,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DisallowedExtension => write!(f, "extension is not a frame format"),
            Rejection::NoFrameNumber => write!(f, "no frame number in filename"),
        }
    }
}

/// A validated frame file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// File name within the watch directory
    pub filename: String,
    /// Number extracted from the filename
    pub frame_number: u64,
    /// Creation time used for ordering and frame-time statistics
    pub created_ms: TimestampMs,
}

/// Filename classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDetector {
    strategy: ExtractionStrategy,
}

impl FrameDetector {
    pub fn new(strategy: ExtractionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }

    /// Check the extension allowlist only
    pub fn has_frame_extension(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                FRAME_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            })
            .unwrap_or(false)
    }

    /// Classify a filename, returning its frame number
    ///
    /// Digit runs too long for a `u64` saturate to `u64::MAX`.
    pub fn classify(&self, filename: &str) -> Result<u64, Rejection> {
        if !Self::has_frame_extension(filename) {
            return Err(Rejection::DisallowedExtension);
        }

        let run = match self.strategy {
            ExtractionStrategy::First => first_digit_run(filename),
            ExtractionStrategy::Last => last_digit_run(filename),
        }
        .ok_or(Rejection::NoFrameNumber)?;

        Ok(parse_saturating(run))
    }

    /// Classify a filename and attach its creation time
    pub fn record(&self, filename: &str, created_ms: TimestampMs) -> Result<FrameRecord, Rejection> {
        let frame_number = self.classify(filename)?;
        Ok(FrameRecord {
            filename: filename.to_string(),
            frame_number,
            created_ms,
        })
    }
}

fn parse_saturating(digits: &str) -> u64 {
    digits.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    })
}

fn first_digit_run(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let len = s[start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len() - start);
    Some(&s[start..start + len])
}

fn last_digit_run(s: &str) -> Option<&str> {
    let end = s.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = s[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    Some(&s[start..end])
}
