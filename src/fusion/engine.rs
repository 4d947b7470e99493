//! Temporal memory fusion engine
//!
//! Buffers observations per stream type, aligns streams that share a
//! temporal window, keeps the five memory categories, and compresses a
//! category on demand (DMC). All state is owned by one
//! `TemporalMemoryFusion` instance behind a `tokio::sync::RwLock`.

use super::category::{
    AlignmentResult, CategoryMap, CategoryRecord, CompressionReport, MemoryCategory, QueryHit,
    QueryResult,
};
use super::stream::{StreamEntry, StreamType};
use crate::config::FusionConfig;
use crate::edge::EdgeStore;
use crate::error::{Error, Result};
use crate::matching::match_score;
use crate::now_millis;
use crate::strategy::{
    AttentionScorer, Compressor, CorrespondenceScorer, ImportanceScorer, RecencyAttention,
    RecencyImportance, TemporalCorrespondence, TruncatingCompressor,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Entries scored between cooperative yields to the runtime
const YIELD_EVERY: usize = 256;

/// Mutable fusion state
#[derive(Default)]
struct FusionState {
    buffers: BTreeMap<StreamType, VecDeque<StreamEntry>>,
    categories: BTreeMap<MemoryCategory, CategoryMap>,
}

/// Multi-modal temporal memory with five typed categories
pub struct TemporalMemoryFusion {
    config: FusionConfig,
    state: Arc<RwLock<FusionState>>,
    importance: Box<dyn ImportanceScorer>,
    attention: Box<dyn AttentionScorer>,
    correspondence: Box<dyn CorrespondenceScorer>,
    compressor: Box<dyn Compressor>,
    edge: Option<Arc<EdgeStore>>,
}

impl TemporalMemoryFusion {
    /// Create an engine with the default strategies
    pub fn new(config: FusionConfig) -> Self {
        let correspondence = TemporalCorrespondence {
            window_ms: config.temporal_window as f64,
        };
        Self {
            config,
            state: Arc::new(RwLock::new(FusionState::default())),
            importance: Box::new(RecencyImportance::default()),
            attention: Box::new(RecencyAttention::default()),
            correspondence: Box::new(correspondence),
            compressor: Box::new(TruncatingCompressor::default()),
            edge: None,
        }
    }

    /// Replace the DMC importance strategy
    pub fn with_importance_scorer(mut self, scorer: impl ImportanceScorer + 'static) -> Self {
        self.importance = Box::new(scorer);
        self
    }

    /// Replace the attention strategy used by alignment
    pub fn with_attention_scorer(mut self, scorer: impl AttentionScorer + 'static) -> Self {
        self.attention = Box::new(scorer);
        self
    }

    /// Replace the cross-modal correspondence strategy
    pub fn with_correspondence_scorer(
        mut self,
        scorer: impl CorrespondenceScorer + 'static,
    ) -> Self {
        self.correspondence = Box::new(scorer);
        self
    }

    /// Replace the compress-or-drop strategy
    pub fn with_compressor(mut self, compressor: impl Compressor + 'static) -> Self {
        self.compressor = Box::new(compressor);
        self
    }

    /// Persist every alignment result to `edge` as well
    pub fn with_edge_store(mut self, edge: Arc<EdgeStore>) -> Self {
        self.edge = Some(edge);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    // =========================================================================
    // Ingest & alignment
    // =========================================================================

    /// Ingest one observation named by its wire stream type.
    ///
    /// Fails with `Error::Validation` for anything but `screen`, `audio` or
    /// `action`. See [`ingest`](Self::ingest) for the alignment side effect.
    pub async fn ingest_stream(
        &self,
        stream_type: &str,
        payload: serde_json::Value,
        timestamp: u64,
    ) -> Result<StreamEntry> {
        let stream_type: StreamType = stream_type.parse()?;
        self.ingest(stream_type, payload, timestamp).await
    }

    /// Ingest one observation.
    ///
    /// When more than one stream type has buffered entries afterwards, the
    /// entries within `temporal_window` ms of `timestamp` are aligned in one
    /// pass, provided at least two types are present in that window. Aligned
    /// entries leave their buffers; the result lands in the temporal category.
    /// If the pass fails, the entries go back to the front of their buffers
    /// and the error is returned, so a later pass can align them.
    pub async fn ingest(
        &self,
        stream_type: StreamType,
        payload: serde_json::Value,
        timestamp: u64,
    ) -> Result<StreamEntry> {
        let entry = StreamEntry::new(stream_type, payload, timestamp);

        let batch = {
            let mut state = self.state.write().await;
            let buffer = state.buffers.entry(stream_type).or_default();
            buffer.push_back(entry.clone());
            if buffer.len() > self.config.max_buffer_entries {
                if let Some(dropped) = buffer.pop_front() {
                    debug!(
                        stream_type = %stream_type,
                        timestamp = dropped.timestamp,
                        "Buffer full, dropped oldest entry"
                    );
                }
            }

            let present = state.buffers.values().filter(|b| !b.is_empty()).count();
            if present > 1 {
                drain_window(&mut state.buffers, timestamp, self.config.temporal_window)
            } else {
                BTreeMap::new()
            }
        };

        if !batch.is_empty() {
            self.align_batch(batch, self.config.temporal_alignment)
                .await?;
        }

        Ok(entry)
    }

    /// Align every buffered entry with `offset_ms` and record the result.
    ///
    /// Returns the aligned entries per stream type name. Strategy and
    /// persistence failures propagate with the entries left buffered; an
    /// empty buffer set returns an empty map and records nothing.
    pub async fn align_temporal_streams(
        &self,
        offset_ms: i64,
    ) -> Result<BTreeMap<String, Vec<StreamEntry>>> {
        let batch: BTreeMap<StreamType, Vec<StreamEntry>> = {
            let mut state = self.state.write().await;
            state
                .buffers
                .iter_mut()
                .filter(|(_, b)| !b.is_empty())
                .map(|(t, b)| (*t, b.drain(..).collect()))
                .collect()
        };

        if batch.is_empty() {
            return Ok(BTreeMap::new());
        }

        let result = self.align_batch(batch, offset_ms).await?;
        Ok(result.per_type_aligned_entries)
    }

    /// Run one alignment pass over entries already taken out of the buffers,
    /// putting them back if the pass fails.
    async fn align_batch(
        &self,
        batch: BTreeMap<StreamType, Vec<StreamEntry>>,
        offset_ms: i64,
    ) -> Result<AlignmentResult> {
        match self.run_alignment(batch.clone(), offset_ms).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(
                    types = batch.len(),
                    entries = batch.values().map(Vec::len).sum::<usize>(),
                    "Alignment pass failed, entries returned to buffers: {}",
                    e
                );
                self.restore_batch(batch).await;
                Err(e)
            }
        }
    }

    /// Put entries back at the front of their buffers, oldest first.
    async fn restore_batch(&self, batch: BTreeMap<StreamType, Vec<StreamEntry>>) {
        let mut state = self.state.write().await;
        for (stream_type, entries) in batch {
            let buffer = state.buffers.entry(stream_type).or_default();
            for entry in entries.into_iter().rev() {
                buffer.push_front(entry);
            }
            while buffer.len() > self.config.max_buffer_entries {
                if let Some(dropped) = buffer.pop_front() {
                    debug!(
                        stream_type = %stream_type,
                        timestamp = dropped.timestamp,
                        "Buffer full, dropped oldest entry"
                    );
                }
            }
        }
    }

    async fn run_alignment(
        &self,
        batch: BTreeMap<StreamType, Vec<StreamEntry>>,
        offset_ms: i64,
    ) -> Result<AlignmentResult> {
        let now = now_millis();

        let mut aligned: BTreeMap<StreamType, Vec<StreamEntry>> = BTreeMap::new();
        let mut scored = 0usize;
        for (stream_type, entries) in batch {
            let mut out = Vec::with_capacity(entries.len());
            for mut entry in entries {
                entry.attention_weight = self.attention.score(&entry, offset_ms, now)?;
                entry.alignment_offset = offset_ms;
                out.push(entry);

                scored += 1;
                if scored % YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }
            aligned.insert(stream_type, out);
        }

        let mut cross_modal_weights = BTreeMap::new();
        for (a, entries_a) in &aligned {
            for (b, entries_b) in &aligned {
                if a == b {
                    continue;
                }
                let weight = self.correspondence.score(entries_a, entries_b)?;
                cross_modal_weights.insert(a.pair_key(*b), weight);
            }
        }

        let result = AlignmentResult {
            timestamp: now,
            offset_ms,
            per_type_aligned_entries: aligned
                .into_iter()
                .map(|(t, entries)| (t.as_str().to_string(), entries))
                .collect(),
            cross_modal_weights,
        };
        let value = serde_json::to_value(&result)?;

        // Persist before committing, so a failed write leaves no in-memory
        // trace of the pass.
        let persisted = match &self.edge {
            Some(edge) => Some(edge.store_local(&value, true).await?),
            None => None,
        };

        let key = {
            let mut state = self.state.write().await;
            let temporal = state
                .categories
                .entry(MemoryCategory::Temporal)
                .or_default();
            let mut ts = now;
            while temporal.contains_key(&alignment_key(ts)) {
                ts += 1;
            }
            let key = alignment_key(ts);
            temporal.insert(key.clone(), CategoryRecord::new(value.clone(), now));
            key
        };

        debug!(
            key = %key,
            types = result.per_type_aligned_entries.len(),
            pairs = result.cross_modal_weights.len(),
            "Alignment pass recorded"
        );

        if let Some(manifest) = persisted {
            debug!(key = %key, record_id = %manifest.id, "Alignment snapshot persisted");
        }

        Ok(result)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// Write a record directly into a category, replacing any previous value
    /// under `key`.
    pub async fn put_record(
        &self,
        category: &str,
        key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let category: MemoryCategory = category.parse()?;
        let mut state = self.state.write().await;
        state
            .categories
            .entry(category)
            .or_default()
            .insert(key.into(), CategoryRecord::new(payload, now_millis()));
        Ok(())
    }

    /// Copy of one category's records
    pub async fn category_snapshot(&self, category: MemoryCategory) -> CategoryMap {
        self.state
            .read()
            .await
            .categories
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of records in a category
    pub async fn category_len(&self, category: MemoryCategory) -> usize {
        self.state
            .read()
            .await
            .categories
            .get(&category)
            .map_or(0, |c| c.len())
    }

    /// Number of entries waiting in one stream buffer
    pub async fn buffered_len(&self, stream_type: StreamType) -> usize {
        self.state
            .read()
            .await
            .buffers
            .get(&stream_type)
            .map_or(0, |b| b.len())
    }

    /// Run one DMC pass over `category` at the configured
    /// `compression_ratio`.
    pub async fn compress_memory_default(&self, category: &str) -> Result<CompressionReport> {
        self.compress_memory(category, self.config.compression_ratio)
            .await
    }

    /// Run one DMC pass over `category`.
    ///
    /// `target_ratio` in `[0, 1]` is the fraction of volume the pass aims to
    /// remove and doubles as the retention threshold: records whose
    /// importance is at least `target_ratio` are kept verbatim, the rest go
    /// through the compressor and are replaced by a stand-in or dropped. The
    /// category is replaced as a whole.
    ///
    /// The threshold is `target_ratio` itself, not `1 - target_ratio`. That
    /// makes `0.0` keep every record and `1.0` remove every record scoring
    /// below 1.0; the complement would invert both ends.
    ///
    /// Not safe to repeat as a no-op: every call re-scores the current,
    /// already compressed state, so calling twice with the same ratio
    /// usually degrades retained records further.
    pub async fn compress_memory(
        &self,
        category: &str,
        target_ratio: f64,
    ) -> Result<CompressionReport> {
        let category: MemoryCategory = category.parse()?;
        if !(0.0..=1.0).contains(&target_ratio) {
            return Err(Error::Validation(format!(
                "target ratio must be within 0.0..=1.0, got {}",
                target_ratio
            )));
        }
        let threshold = target_ratio;
        let now = now_millis();

        let mut state = self.state.write().await;
        let current = state.categories.entry(category).or_default();

        let original_size: usize = current.values().map(CategoryRecord::volume).sum();
        let mut next = CategoryMap::new();
        let (mut kept, mut compressed, mut dropped) = (0, 0, 0);

        for (key, record) in current.iter() {
            let score = self.importance.score(record, now)?;
            if score >= threshold {
                next.insert(key.clone(), record.clone());
                kept += 1;
                continue;
            }
            match self.compressor.compress(record, score, target_ratio)? {
                Some(stand_in) => {
                    next.insert(key.clone(), stand_in);
                    compressed += 1;
                }
                None => dropped += 1,
            }
        }

        let new_size: usize = next.values().map(CategoryRecord::volume).sum();
        *current = next;

        let compression_ratio = if original_size == 0 {
            0.0
        } else {
            1.0 - new_size as f64 / original_size as f64
        };

        info!(
            category = %category,
            original_size,
            new_size,
            kept,
            compressed,
            dropped,
            "Memory category compressed"
        );

        Ok(CompressionReport {
            category,
            original_size,
            new_size,
            compression_ratio,
            target_ratio,
            kept,
            compressed,
            dropped,
        })
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Search all five categories.
    ///
    /// Exact mode is a case-insensitive substring test on the serialized
    /// payload; fuzzy mode also accepts close edit-distance matches. Every
    /// hit counts as an access on its record. Never fails; a slow query is
    /// logged.
    pub async fn query_memory(&self, query: &str, fuzzy: bool) -> QueryResult {
        let started = Instant::now();
        let now = now_millis();
        let mut results = BTreeMap::new();
        let mut total_hits = 0;

        {
            let mut state = self.state.write().await;
            for (category, records) in state.categories.iter_mut() {
                let mut hits: Vec<QueryHit> = records
                    .iter_mut()
                    .filter_map(|(key, record)| {
                        let text = serde_json::to_string(&record.payload).unwrap_or_default();
                        let relevance =
                            match_score(&text, query, fuzzy, self.config.fuzzy_threshold)?;
                        record.record_access(now);
                        Some(QueryHit {
                            key: key.clone(),
                            payload: record.payload.clone(),
                            relevance,
                        })
                    })
                    .collect();

                if hits.is_empty() {
                    continue;
                }
                hits.sort_by(|a, b| {
                    b.relevance
                        .partial_cmp(&a.relevance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.key.cmp(&b.key))
                });
                total_hits += hits.len();
                results.insert(category.as_str().to_string(), hits);
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.slow_query_ms {
            warn!(
                query = %query,
                elapsed_ms,
                target_ms = self.config.slow_query_ms,
                "Memory query exceeded latency target"
            );
        }

        QueryResult {
            query: query.to_string(),
            results,
            total_hits,
            elapsed_ms,
        }
    }
}

fn alignment_key(ts: u64) -> String {
    format!("alignment_{}", ts)
}

/// Remove and return the buffered entries within `window` ms of `center`,
/// but only when at least two stream types are represented.
fn drain_window(
    buffers: &mut BTreeMap<StreamType, VecDeque<StreamEntry>>,
    center: u64,
    window: u64,
) -> BTreeMap<StreamType, Vec<StreamEntry>> {
    let types_in_window = buffers
        .values()
        .filter(|b| b.iter().any(|e| e.within(center, window)))
        .count();
    if types_in_window < 2 {
        return BTreeMap::new();
    }

    let mut batch = BTreeMap::new();
    for (stream_type, buffer) in buffers.iter_mut() {
        let (inside, outside): (Vec<_>, Vec<_>) =
            buffer.drain(..).partition(|e| e.within(center, window));
        buffer.extend(outside);
        if !inside.is_empty() {
            batch.insert(*stream_type, inside);
        }
    }
    batch
}
