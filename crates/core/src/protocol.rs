//! Wire types for the viewer channel
//!
//! Messages are JSON objects tagged by `type`. Snapshot fields are flat and
//! camelCase; unknown timestamps travel as `0`.

use crate::error::{Error, Result};
use crate::stats::{FrameStats, FrameTimes};
use crate::TimestampMs;
use serde::{Deserialize, Serialize};

/// Immutable view of progress sent to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub completed_frames: u64,
    /// Effective total (manual override if set)
    pub total_frames: u64,
    /// Not clamped; exceeds 100 when more frames exist than expected
    pub percentage: f64,
    #[serde(default, with = "zero_as_none")]
    pub first_frame_timestamp: Option<TimestampMs>,
    #[serde(default, with = "zero_as_none")]
    pub last_frame_timestamp: Option<TimestampMs>,
    #[serde(default, with = "zero_as_none")]
    pub previous_frame_timestamp: Option<TimestampMs>,
    /// Sender clock at construction
    pub server_timestamp: TimestampMs,
}

impl ProgressSnapshot {
    pub fn frame_times(&self) -> FrameTimes {
        FrameTimes {
            first: self.first_frame_timestamp,
            previous: self.previous_frame_timestamp,
            last: self.last_frame_timestamp,
        }
    }

    /// Recompute statistics on the receiving side
    pub fn stats(&self) -> FrameStats {
        FrameStats::compute(&self.frame_times(), self.completed_frames, self.total_frames)
    }
}

/// Server to viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Pushed after every state change
    Update(ProgressSnapshot),
    /// Pushed on connect and on `requestState`
    InitialState(ProgressSnapshot),
    /// A command from this viewer was rejected
    Error { message: String },
}

impl ServerMessage {
    pub fn snapshot(&self) -> Option<&ProgressSnapshot> {
        match self {
            ServerMessage::Update(s) | ServerMessage::InitialState(s) => Some(s),
            ServerMessage::Error { .. } => None,
        }
    }
}

/// Viewer to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    SetTotalFrames {
        #[serde(rename = "totalFrames")]
        total_frames: TotalFramesInput,
    },
    RequestState,
    ResetFrames,
}

/// Manual total as sent by clients: a JSON integer or a numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalFramesInput {
    Number(i64),
    Text(String),
}

impl TotalFramesInput {
    /// Parse into a positive frame count
    pub fn parse(&self) -> Result<u64> {
        let value = match self {
            TotalFramesInput::Number(n) => *n,
            TotalFramesInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::InvalidTotalFrames(s.clone()))?,
        };
        validate_total_frames(value)
    }
}

/// Reject anything but a positive integer
pub fn validate_total_frames(value: i64) -> Result<u64> {
    if value < 1 {
        return Err(Error::InvalidTotalFrames(value.to_string()));
    }
    Ok(value as u64)
}

mod zero_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<u64>::deserialize(deserializer)?;
        Ok(value.filter(|&ts| ts > 0))
    }
}
