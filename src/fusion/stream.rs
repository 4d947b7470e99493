//! Observation stream types
//!
//! A `StreamEntry` is one observation from a sensor producer. Entries live
//! only in the per-type temporal buffer; they are consumed by the alignment
//! pass and never persisted on their own.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three observation sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Recognized screen text and elements
    Screen,
    /// Audio transcript
    Audio,
    /// User action
    Action,
}

impl StreamType {
    /// All stream types, in a stable order
    pub const ALL: [StreamType; 3] = [StreamType::Screen, StreamType::Audio, StreamType::Action];

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Screen => "screen",
            StreamType::Audio => "audio",
            StreamType::Action => "action",
        }
    }

    /// Cross-modal weight key for the ordered pair `(self, other)`
    pub fn pair_key(&self, other: StreamType) -> String {
        format!("{}_{}", self.as_str(), other.as_str())
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "screen" => Ok(StreamType::Screen),
            "audio" => Ok(StreamType::Audio),
            "action" => Ok(StreamType::Action),
            other => Err(Error::Validation(format!(
                "unknown stream type '{}', expected one of screen, audio, action",
                other
            ))),
        }
    }
}

/// One buffered observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    /// Source of the observation
    pub stream_type: StreamType,
    /// Structured sensor output
    pub payload: serde_json::Value,
    /// Capture time, Unix ms
    pub timestamp: u64,
    /// Offset applied by the alignment pass, in ms
    pub alignment_offset: i64,
    /// Attention weight assigned by the alignment pass
    pub attention_weight: f64,
}

impl StreamEntry {
    /// A freshly ingested, not yet aligned entry
    pub fn new(stream_type: StreamType, payload: serde_json::Value, timestamp: u64) -> Self {
        Self {
            stream_type,
            payload,
            timestamp,
            alignment_offset: 0,
            attention_weight: 1.0,
        }
    }

    /// Whether `other_ts` falls within `window` ms of this entry
    pub fn within(&self, other_ts: u64, window: u64) -> bool {
        self.timestamp.abs_diff(other_ts) <= window
    }
}
