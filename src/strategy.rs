//! Pluggable scoring and compression strategies
//!
//! Fusion never hard-codes how important a record is, how much attention an
//! observation deserves, or how related two streams are. Each decision goes
//! through one of the traits below. The defaults are deterministic
//! heuristics over recency, access frequency and any `confidence` /
//! `importance` signal carried by the payload; a learned model can replace
//! any of them without changing the fusion contracts.
//!
//! ```text
//! StreamEntry ──► AttentionScorer ──► aligned entry (attention_weight)
//!   [entries a] × [entries b] ──► CorrespondenceScorer ──► cross-modal weight
//! CategoryRecord ──► ImportanceScorer ──► keep │ Compressor ──► stand-in │ drop
//! ```

use crate::error::Result;
use crate::fusion::{CategoryRecord, StreamEntry};
use serde_json::Value;

/// Scores a stored category record in `[0, 1]` for DMC.
pub trait ImportanceScorer: Send + Sync {
    fn score(&self, record: &CategoryRecord, now: u64) -> Result<f64>;
}

/// Scores how much attention an observation deserves at a given offset.
pub trait AttentionScorer: Send + Sync {
    fn score(&self, entry: &StreamEntry, offset_ms: i64, now: u64) -> Result<f64>;
}

/// Estimates how related two differently-typed groups of aligned entries are.
pub trait CorrespondenceScorer: Send + Sync {
    fn score(&self, a: &[StreamEntry], b: &[StreamEntry]) -> Result<f64>;
}

/// Lossy compress-or-drop step for records below the retention threshold.
pub trait Compressor: Send + Sync {
    /// `Ok(None)` means the record has no residual value and is dropped.
    fn compress(
        &self,
        record: &CategoryRecord,
        score: f64,
        target_ratio: f64,
    ) -> Result<Option<CategoryRecord>>;
}

/// Numeric confidence carried by a payload (`confidence`, then `importance`).
pub fn payload_confidence(payload: &Value) -> Option<f64> {
    ["confidence", "importance"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_f64))
        .map(|c| c.clamp(0.0, 1.0))
}

/// Default importance: confidence, recency half-life decay and access frequency.
///
/// Formula: `confidence * 0.5 + recency * 0.3 + access * 0.2`, halved for
/// records that are already compressed stand-ins.
#[derive(Debug, Clone)]
pub struct RecencyImportance {
    /// Age at which the recency term halves, in ms
    pub half_life_ms: u64,
    /// Confidence assumed when the payload carries none
    pub default_confidence: f64,
}

impl Default for RecencyImportance {
    fn default() -> Self {
        Self {
            half_life_ms: 60 * 60 * 1000,
            default_confidence: 0.5,
        }
    }
}

impl ImportanceScorer for RecencyImportance {
    fn score(&self, record: &CategoryRecord, now: u64) -> Result<f64> {
        let reference = record.last_accessed.unwrap_or(record.stored_at);
        let age = now.saturating_sub(reference) as f64;
        let recency = 0.5f64.powf(age / self.half_life_ms.max(1) as f64);
        let access = 1.0 - 1.0 / (1.0 + f64::from(record.access_count));
        let confidence =
            payload_confidence(&record.payload).unwrap_or(self.default_confidence);

        let mut score = confidence * 0.5 + recency * 0.3 + access * 0.2;
        if record.compressed {
            score *= 0.5;
        }
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Default attention: exponential decay of the aligned timestamp's distance
/// from now, blended with payload confidence.
#[derive(Debug, Clone)]
pub struct RecencyAttention {
    /// Decay constant, in ms
    pub decay_ms: f64,
}

impl Default for RecencyAttention {
    fn default() -> Self {
        Self { decay_ms: 5_000.0 }
    }
}

impl AttentionScorer for RecencyAttention {
    fn score(&self, entry: &StreamEntry, offset_ms: i64, now: u64) -> Result<f64> {
        let aligned = entry.timestamp as i128 + offset_ms as i128;
        let distance = (now as i128 - aligned).unsigned_abs() as f64;
        let recency = (-distance / self.decay_ms.max(1.0)).exp();
        let confidence = payload_confidence(&entry.payload).unwrap_or(0.5);
        Ok((recency * 0.6 + confidence * 0.4).clamp(0.0, 1.0))
    }
}

/// Default correspondence: for each entry of `a`, the closest entry of `b`
/// in time, decayed over the window and weighted by both attention weights;
/// averaged over `a`.
#[derive(Debug, Clone)]
pub struct TemporalCorrespondence {
    /// Decay constant, in ms (normally the temporal window)
    pub window_ms: f64,
}

impl Default for TemporalCorrespondence {
    fn default() -> Self {
        Self { window_ms: 1000.0 }
    }
}

impl CorrespondenceScorer for TemporalCorrespondence {
    fn score(&self, a: &[StreamEntry], b: &[StreamEntry]) -> Result<f64> {
        if a.is_empty() || b.is_empty() {
            return Ok(0.0);
        }

        let total: f64 = a
            .iter()
            .map(|ea| {
                b.iter()
                    .map(|eb| {
                        let dt = ea.timestamp.abs_diff(eb.timestamp) as f64;
                        let weight = (ea.attention_weight * eb.attention_weight).sqrt();
                        (-dt / self.window_ms.max(1.0)).exp() * weight
                    })
                    .fold(0.0, f64::max)
            })
            .sum();
        Ok((total / a.len() as f64).clamp(0.0, 1.0))
    }
}

/// Default compress-or-drop: truncates strings, halves arrays and keeps only
/// the scalar fields of objects.
///
/// Drops the record when it is already a compressed stand-in, when the
/// target ratio asks for everything below the threshold to go (`>= 1.0`),
/// or when nothing survives the reduction.
#[derive(Debug, Clone)]
pub struct TruncatingCompressor {
    /// Maximum characters kept per string
    pub max_chars: usize,
}

impl Default for TruncatingCompressor {
    fn default() -> Self {
        Self { max_chars: 64 }
    }
}

impl TruncatingCompressor {
    fn reduce(&self, value: &Value, depth: usize) -> Value {
        match value {
            Value::String(s) => Value::String(s.chars().take(self.max_chars).collect()),
            Value::Array(items) => {
                let keep = (items.len() + 1) / 2;
                Value::Array(
                    items
                        .iter()
                        .take(keep)
                        .map(|v| self.reduce(v, depth + 1))
                        .filter(|v| !is_empty(v))
                        .collect(),
                )
            }
            Value::Object(map) if depth == 0 => Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_object() && !v.is_array())
                    .map(|(k, v)| (k.clone(), self.reduce(v, depth + 1)))
                    .collect(),
            ),
            // Nested objects carry no residual value once flattened.
            Value::Object(_) => Value::Null,
            other => other.clone(),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl Compressor for TruncatingCompressor {
    fn compress(
        &self,
        record: &CategoryRecord,
        _score: f64,
        target_ratio: f64,
    ) -> Result<Option<CategoryRecord>> {
        if target_ratio >= 1.0 || record.compressed {
            return Ok(None);
        }

        let reduced = self.reduce(&record.payload, 0);
        if is_empty(&reduced) {
            return Ok(None);
        }

        Ok(Some(CategoryRecord {
            payload: reduced,
            compressed: true,
            ..record.clone()
        }))
    }
}
