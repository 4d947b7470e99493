//! On-disk record envelope and edge store reports
//!
//! Layout:
//! ```text
//! <root>/
//! ├── 3f/
//! │   ├── 3f9c0d...e1.json
//! │   └── ...
//! └── a7/
//!     └── a71b44...09.json
//! ```
//!
//! Each file is one self-describing envelope:
//! `{ id, data, timestamp, encrypted, compressed, originalSize? }`.
//! When `compressed` or `encrypted` is set, `data` is the base64 of the
//! transformed bytes (compressed first, then sealed); otherwise it is the
//! original JSON value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Length of a record id (128-bit, lowercase hex)
pub const ID_LEN: usize = 32;

/// Persisted record envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    /// 32 lowercase hex chars
    pub id: String,
    /// Original value, or base64 of the transformed bytes
    pub data: serde_json::Value,
    /// Write time, Unix ms; the sole ordering key for cleanup and eviction
    pub timestamp: u64,
    pub encrypted: bool,
    pub compressed: bool,
    /// Serialized size before compression, in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
}

/// Whether `id` is a well-formed record id
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// `<root>/<id[0..2]>/<id>.json`
pub fn record_path(root: &Path, id: &str) -> PathBuf {
    let shard = id.get(..2).unwrap_or("00");
    root.join(shard).join(format!("{}.json", id))
}

/// Returned by `store_local`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub id: String,
    pub stored: bool,
    pub encrypted: bool,
    pub compressed: bool,
    pub timestamp: u64,
    pub path: PathBuf,
}

/// One retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRecord {
    pub id: String,
    /// Decoded payload
    pub data: serde_json::Value,
    pub timestamp: u64,
    pub relevance: f64,
    pub encrypted: bool,
    pub compressed: bool,
}

/// A record that was found but could not be decoded during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub id: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Returned by `retrieve_local`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    /// Sorted by relevance, then recency, both descending
    pub results: Vec<RetrievedRecord>,
    pub total_found: usize,
    pub query_time_ms: u64,
    /// Records that were read but failed to decrypt or decode
    pub failures: Vec<RecordFailure>,
}

/// Returned by `enforce_storage_limits`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub size_before: u64,
    pub size_after: u64,
    /// Ids of evicted records, oldest first
    pub evicted: Vec<String>,
}

/// Returned by `cleanup`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted_files: usize,
    pub deleted_ids: Vec<String>,
    /// Records with a timestamp below this were deleted, Unix ms
    pub cutoff_time: u64,
    pub remaining_files: usize,
}

/// Returned by `get_storage_stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub utilization_percent: f64,
    pub remaining_space: u64,
}
