//! Typed memory categories and their records

use super::stream::StreamEntry;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The five fixed memory categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// How to do things (action sequences)
    Procedural,
    /// What things mean (facts, concepts)
    Semantic,
    /// When things happened (alignment results)
    Temporal,
    /// What is in focus right now
    Working,
    /// What happened (experienced events)
    Episodic,
}

impl MemoryCategory {
    /// All categories, in a stable order
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Procedural,
        MemoryCategory::Semantic,
        MemoryCategory::Temporal,
        MemoryCategory::Working,
        MemoryCategory::Episodic,
    ];

    /// Lowercase category key
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Procedural => "procedural",
            MemoryCategory::Semantic => "semantic",
            MemoryCategory::Temporal => "temporal",
            MemoryCategory::Working => "working",
            MemoryCategory::Episodic => "episodic",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MemoryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

/// A payload stored under one memory category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    /// The stored value
    pub payload: serde_json::Value,
    /// When the record was written, Unix ms
    pub stored_at: u64,
    /// Number of query hits on this record
    pub access_count: u32,
    /// Last query hit, Unix ms
    pub last_accessed: Option<u64>,
    /// Whether this is a lossy stand-in produced by compression
    pub compressed: bool,
}

impl CategoryRecord {
    /// A fresh, uncompressed record
    pub fn new(payload: serde_json::Value, stored_at: u64) -> Self {
        Self {
            payload,
            stored_at,
            access_count: 0,
            last_accessed: None,
            compressed: false,
        }
    }

    /// Record a query hit
    pub fn record_access(&mut self, now: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Some(now);
    }

    /// Serialized payload size in bytes, the unit DMC measures volume in
    pub fn volume(&self) -> usize {
        serde_json::to_vec(&self.payload).map(|v| v.len()).unwrap_or(0)
    }
}

/// Records of one category keyed by record key
pub type CategoryMap = BTreeMap<String, CategoryRecord>;

/// Output of one alignment pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    /// When the pass ran, Unix ms
    pub timestamp: u64,
    /// Offset the entries were aligned with
    pub offset_ms: i64,
    /// Aligned entries per stream type name
    pub per_type_aligned_entries: BTreeMap<String, Vec<StreamEntry>>,
    /// Correspondence score per ordered type pair (`screen_audio`, ...)
    pub cross_modal_weights: BTreeMap<String, f64>,
}

/// Outcome of a DMC pass over one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    pub category: MemoryCategory,
    /// Serialized payload bytes before the pass
    pub original_size: usize,
    /// Serialized payload bytes after the pass
    pub new_size: usize,
    /// `1 - new_size / original_size`, 0 for an empty category
    pub compression_ratio: f64,
    pub target_ratio: f64,
    /// Records kept verbatim
    pub kept: usize,
    /// Records replaced by a compressed stand-in
    pub compressed: usize,
    /// Records dropped
    pub dropped: usize,
}

/// One query hit inside a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub key: String,
    pub payload: serde_json::Value,
    pub relevance: f64,
}

/// Result of a query over all five categories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    /// Ranked hits per category name; categories without hits are omitted
    pub results: BTreeMap<String, Vec<QueryHit>>,
    pub total_hits: usize,
    pub elapsed_ms: u64,
}
