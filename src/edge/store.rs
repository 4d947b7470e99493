//! Local edge store with sharded JSON envelopes
//!
//! Records are written once and never updated in place. A record leaves the
//! store only through `cleanup` (age) or quota eviction (oldest first).
//!
//! The store assumes a single owning process per root. Within that process
//! concurrent calls are safe without locks: shard creation is idempotent,
//! writes go through a temp file and a rename, and scans treat files that
//! vanish mid-scan as soft misses.

use super::cloud::{CloudEnvelope, CloudUploader, LaplaceNoise, NoiseInjector, SyncReceipt};
use super::record::{
    is_valid_id, record_path, CleanupReport, EdgeRecord, EvictionReport, RecordFailure,
    RetrievalResult, RetrievedRecord, StorageStats, StoreManifest,
};
use crate::codec::{Codec, GzipCodec};
use crate::config::StorageConfig;
use crate::crypto::{AesGcmCipher, Cipher, RecordKey};
use crate::error::{Error, Result};
use crate::matching::match_score;
use crate::now_millis;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Fraction of `max_local_size` eviction shrinks the store to
const EVICTION_HEADROOM: f64 = 0.8;

/// Durable local record store
pub struct EdgeStore {
    config: StorageConfig,
    codec: Box<dyn Codec>,
    cipher: Box<dyn Cipher>,
    noise: Box<dyn NoiseInjector>,
    uploader: Option<Arc<dyn CloudUploader>>,
}

impl EdgeStore {
    /// Open (or create) a store at `config.root`
    pub async fn new(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.root).await?;

        let key = match &config.encryption_key {
            Some(secret) => RecordKey::derive(secret)?,
            None => {
                warn!(
                    root = %config.root.display(),
                    "No encryption key configured; encrypted records will be unreadable after restart"
                );
                RecordKey::random()
            }
        };

        let store = Self {
            config,
            codec: Box::new(GzipCodec::default()),
            cipher: Box::new(AesGcmCipher::new(key)),
            noise: Box::new(LaplaceNoise::default()),
            uploader: None,
        };
        debug!(
            root = %store.config.root.display(),
            codec = store.codec.name(),
            cipher = store.cipher.name(),
            "Edge store opened"
        );
        Ok(store)
    }

    /// Replace the compression codec
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replace the record cipher
    pub fn with_cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Box::new(cipher);
        self
    }

    /// Replace the differential-privacy noise strategy
    pub fn with_noise(mut self, noise: impl NoiseInjector + 'static) -> Self {
        self.noise = Box::new(noise);
        self
    }

    /// Set the cloud upload target
    pub fn with_uploader(mut self, uploader: Arc<dyn CloudUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Store configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Persist `data` as a new record stamped with the current time.
    pub async fn store_local(&self, data: &serde_json::Value, encrypted: bool) -> Result<StoreManifest> {
        self.store_local_at(data, encrypted, now_millis()).await
    }

    /// Persist `data` as a new record with an explicit timestamp (Unix ms).
    ///
    /// Encryption applies only when `encrypted` is requested and the store
    /// is privacy-preserving. The write is followed by quota enforcement,
    /// which never evicts the record just written. A record whose envelope
    /// alone exceeds 80% of `max_local_size` is rejected with
    /// `Error::Storage` before anything is written. A failed write is
    /// returned to the caller and not retried.
    pub async fn store_local_at(
        &self,
        data: &serde_json::Value,
        encrypted: bool,
        timestamp: u64,
    ) -> Result<StoreManifest> {
        let id = Uuid::new_v4().simple().to_string();
        let record = self.seal(id, data, encrypted, timestamp)?;
        let path = record_path(&self.config.root, &record.id);

        let json = serde_json::to_vec(&record)?;
        let headroom = eviction_target(self.config.max_local_size);
        if json.len() as u64 > headroom {
            return Err(Error::Storage(format!(
                "record is {} bytes, larger than the {} bytes left after eviction",
                json.len(),
                headroom
            )));
        }

        // create_dir_all succeeds when the shard already exists, including
        // when another writer created it a moment ago.
        if let Some(shard) = path.parent() {
            tokio::fs::create_dir_all(shard).await?;
        }

        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            return Err(Error::Storage(format!(
                "Failed to write record {}: {}",
                record.id, e
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Storage(format!(
                "Failed to commit record {}: {}",
                record.id, e
            )));
        }

        debug!(
            record_id = %record.id,
            encrypted = record.encrypted,
            compressed = record.compressed,
            bytes = json.len(),
            "Record stored"
        );

        self.evict_down_to_headroom(Some(&path)).await?;

        Ok(StoreManifest {
            id: record.id,
            stored: true,
            encrypted: record.encrypted,
            compressed: record.compressed,
            timestamp,
            path,
        })
    }

    /// Build the envelope: compress, then seal.
    fn seal(
        &self,
        id: String,
        data: &serde_json::Value,
        encrypted: bool,
        timestamp: u64,
    ) -> Result<EdgeRecord> {
        let compressed = self.config.compression_enabled;
        let encrypted = encrypted && self.config.privacy_preserving;

        if !compressed && !encrypted {
            return Ok(EdgeRecord {
                id,
                data: data.clone(),
                timestamp,
                encrypted,
                compressed,
                original_size: None,
            });
        }

        let mut bytes = serde_json::to_vec(data)?;
        let original_size = compressed.then_some(bytes.len() as u64);
        if compressed {
            bytes = self.codec.encode(&bytes)?;
        }
        if encrypted {
            bytes = self.cipher.seal(&bytes)?;
        }

        Ok(EdgeRecord {
            id,
            data: serde_json::Value::String(STANDARD.encode(bytes)),
            timestamp,
            encrypted,
            compressed,
            original_size,
        })
    }

    /// Decode an envelope: open, then decompress.
    fn open(&self, record: &EdgeRecord) -> Result<serde_json::Value> {
        if !record.encrypted && !record.compressed {
            return Ok(record.data.clone());
        }

        let encoded = record.data.as_str().ok_or_else(|| {
            Error::Storage(format!("record {} data is not an encoded string", record.id))
        })?;
        let mut bytes = STANDARD
            .decode(encoded)
            .map_err(|e| Error::Storage(format!("record {} has invalid base64: {}", record.id, e)))?;

        if record.encrypted {
            bytes = self.cipher.open(&bytes)?;
        }
        if record.compressed {
            bytes = self.codec.decode(&bytes)?;
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Read and decode one record by id. Every failure is returned,
    /// including `Error::Crypto` for a wrong or rotated key.
    pub async fn load_record(&self, id: &str) -> Result<serde_json::Value> {
        if !is_valid_id(id) {
            return Err(Error::Validation(format!("invalid record id '{}'", id)));
        }
        let path = record_path(&self.config.root, id);
        let record = read_record(&path).await.map_err(|e| match e {
            Error::Io(io) if io.kind() == ErrorKind::NotFound => {
                Error::Storage(format!("record {} not found", id))
            }
            other => other,
        })?;
        self.open(&record)
    }

    /// Every record file under the root (`<root>/<xx>/<id>.json`), sorted.
    pub async fn list_record_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut shards = match tokio::fs::read_dir(&self.config.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(shard) = shards.next_entry().await? {
            let shard_path = shard.path();
            let is_dir = shard.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || !is_shard_name(&shard_path) {
                continue;
            }
            let mut entries = match tokio::fs::read_dir(&shard_path).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to read shard {}: {}", shard_path.display(), e);
                    continue;
                }
            };
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let path = entry.path();
                        if path.extension().and_then(|e| e.to_str()) == Some("json") {
                            files.push(path);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to list shard {}: {}", shard_path.display(), e);
                        break;
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Search every record for `query`.
    ///
    /// Best-effort: a file that vanished, cannot be read, or does not parse is
    /// skipped. A record that fails to decrypt or decode is logged and listed
    /// in `failures`. The result always carries a count, possibly zero.
    pub async fn retrieve_local(&self, query: &str, fuzzy_match: bool) -> RetrievalResult {
        let started = Instant::now();
        let files = match self.list_record_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list records under {}: {}", self.config.root.display(), e);
                Vec::new()
            }
        };
        self.scan(files, query, fuzzy_match, started).await
    }

    async fn scan(
        &self,
        files: Vec<PathBuf>,
        query: &str,
        fuzzy_match: bool,
        started: Instant,
    ) -> RetrievalResult {
        let mut results = Vec::new();
        let mut failures = Vec::new();

        for path in files {
            let record = match read_record(&path).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };

            let data = match self.open(&record) {
                Ok(data) => data,
                Err(e) => {
                    if matches!(e, Error::Crypto(_)) {
                        error!(record_id = %record.id, "Failed to decrypt record: {}", e);
                    } else {
                        warn!(record_id = %record.id, "Failed to decode record: {}", e);
                    }
                    failures.push(RecordFailure {
                        id: record.id,
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let text = serde_json::to_string(&data).unwrap_or_default();
            if let Some(relevance) =
                match_score(&text, query, fuzzy_match, self.config.fuzzy_threshold)
            {
                results.push(RetrievedRecord {
                    id: record.id,
                    data,
                    timestamp: record.timestamp,
                    relevance,
                    encrypted: record.encrypted,
                    compressed: record.compressed,
                });
            }
        }

        results.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        RetrievalResult {
            query: query.to_string(),
            total_found: results.len(),
            results,
            query_time_ms: started.elapsed().as_millis() as u64,
            failures,
        }
    }

    // =========================================================================
    // Capacity & retention
    // =========================================================================

    /// Evict oldest records until the store is at most 80% of
    /// `max_local_size`, if it currently exceeds the budget.
    ///
    /// Records that cannot be parsed have no timestamp and are evicted first.
    /// Per-file deletion errors are logged and skipped.
    pub async fn enforce_storage_limits(&self) -> Result<EvictionReport> {
        self.evict_down_to_headroom(None).await
    }

    async fn evict_down_to_headroom(&self, keep: Option<&Path>) -> Result<EvictionReport> {
        let max = self.config.max_local_size;
        let sized = self.sized_files().await?;
        let size_before: u64 = sized.iter().map(|(_, size)| size).sum();

        let mut report = EvictionReport {
            size_before,
            size_after: size_before,
            evicted: Vec::new(),
        };
        if size_before <= max {
            return Ok(report);
        }

        let mut aged = Vec::with_capacity(sized.len());
        for (path, size) in sized {
            if keep == Some(path.as_path()) {
                continue;
            }
            let (timestamp, id) = match read_record(&path).await {
                Ok(record) => (record.timestamp, record.id),
                Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Unparseable record {} queued for eviction: {}", path.display(), e);
                    (0, file_stem(&path))
                }
            };
            aged.push((timestamp, id, path, size));
        }
        aged.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let target = eviction_target(max);
        let mut total = size_before;
        for (timestamp, id, path, size) in aged {
            if total <= target {
                break;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    total = total.saturating_sub(size);
                    debug!(record_id = %id, timestamp, size, "Record evicted");
                    report.evicted.push(id);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    total = total.saturating_sub(size);
                }
                Err(e) => {
                    warn!("Failed to evict {}: {}", path.display(), e);
                }
            }
        }

        report.size_after = total;
        info!(
            evicted = report.evicted.len(),
            size_before,
            size_after = total,
            max_size = max,
            "Storage limit enforced"
        );
        Ok(report)
    }

    /// Delete every record with `timestamp < now - older_than_ms`.
    pub async fn cleanup(&self, older_than_ms: u64) -> Result<CleanupReport> {
        let cutoff_time = now_millis().saturating_sub(older_than_ms);
        let files = self.list_record_files().await?;

        let mut report = CleanupReport {
            cutoff_time,
            ..Default::default()
        };
        for path in files {
            let record = match read_record(&path).await {
                Ok(record) => record,
                Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Skipping unreadable record {} during cleanup: {}", path.display(), e);
                    report.remaining_files += 1;
                    continue;
                }
            };

            if record.timestamp >= cutoff_time {
                report.remaining_files += 1;
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.deleted_files += 1;
                    report.deleted_ids.push(record.id);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete {}: {}", path.display(), e);
                    report.remaining_files += 1;
                }
            }
        }

        info!(
            deleted = report.deleted_files,
            remaining = report.remaining_files,
            cutoff_time,
            "Cleanup complete"
        );
        Ok(report)
    }

    /// Current usage against the byte budget
    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        let sized = self.sized_files().await?;
        let total_size: u64 = sized.iter().map(|(_, size)| size).sum();
        let max_size = self.config.max_local_size;

        Ok(StorageStats {
            total_files: sized.len(),
            total_size,
            max_size,
            utilization_percent: total_size as f64 / max_size as f64 * 100.0,
            remaining_space: max_size.saturating_sub(total_size),
        })
    }

    /// Record files with their on-disk size; files that vanished are skipped.
    async fn sized_files(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut sized = Vec::new();
        for path in self.list_record_files().await? {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => sized.push((path, meta.len())),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(sized)
    }

    // =========================================================================
    // Cloud sync
    // =========================================================================

    /// Hand `data` to the configured uploader.
    ///
    /// Fails with `Error::CloudSyncDisabled` unless `cloud_sync` is set. With
    /// `differential_privacy`, numeric values are perturbed first; the payload
    /// is then sealed when the store is privacy-preserving. With
    /// `local_first`, the original data is stored locally before uploading.
    pub async fn sync_to_cloud(
        &self,
        data: &serde_json::Value,
        differential_privacy: bool,
    ) -> Result<SyncReceipt> {
        if !self.config.cloud_sync {
            return Err(Error::CloudSyncDisabled);
        }
        let uploader = self
            .uploader
            .as_ref()
            .ok_or_else(|| Error::Config("cloud sync enabled but no uploader configured".to_string()))?;

        let local = if self.config.local_first {
            Some(self.store_local(data, true).await?)
        } else {
            None
        };

        let payload = if differential_privacy {
            self.noise.inject(data)?
        } else {
            data.clone()
        };
        let mut body = serde_json::to_vec(&payload)?;
        let encrypted = self.config.privacy_preserving;
        if encrypted {
            body = self.cipher.seal(&body)?;
        }

        let envelope = CloudEnvelope {
            id: Uuid::new_v4().simple().to_string(),
            body,
            encrypted,
            noised: differential_privacy,
            timestamp: now_millis(),
        };
        let envelope_id = envelope.id.clone();
        let remote_id = uploader.upload(envelope).await?;
        info!(envelope_id = %envelope_id, remote_id = %remote_id, "Synced to cloud");

        Ok(SyncReceipt {
            remote_id,
            encrypted,
            noised: differential_privacy,
            local,
        })
    }
}

/// Bytes the store may hold after an eviction pass
fn eviction_target(max_local_size: u64) -> u64 {
    (max_local_size as f64 * EVICTION_HEADROOM) as u64
}

async fn read_record(path: &Path) -> Result<EdgeRecord> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn is_shard_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() == 2 && n.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    fn config(dir: &TempDir) -> StorageConfig {
        StorageConfig {
            encryption_key: Some("test secret".to_string()),
            ..StorageConfig::with_root(dir.path())
        }
    }

    async fn make_store() -> (EdgeStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = EdgeStore::new(config(&dir)).await.unwrap();
        (store, dir)
    }

    #[derive(Default)]
    struct RecordingUploader {
        uploads: Mutex<Vec<CloudEnvelope>>,
    }

    #[async_trait]
    impl CloudUploader for RecordingUploader {
        async fn upload(&self, envelope: CloudEnvelope) -> Result<String> {
            let mut uploads = self.uploads.lock().await;
            uploads.push(envelope);
            Ok(format!("remote-{}", uploads.len()))
        }
    }

    #[tokio::test]
    async fn test_store_and_retrieve_encrypted() {
        let (store, _dir) = make_store().await;
        let data = json!({"text": "Budget meeting at 3pm", "app": "calendar", "n": [1, 2, 3]});

        let manifest = store.store_local(&data, true).await.unwrap();
        assert!(manifest.stored);
        assert!(manifest.encrypted);
        assert!(manifest.compressed);
        assert_eq!(manifest.id.len(), 32);
        assert!(manifest.path.exists());

        let found = store.retrieve_local("budget meeting", false).await;
        assert_eq!(found.total_found, 1);
        assert_eq!(found.results[0].id, manifest.id);
        assert_eq!(found.results[0].data, data);
        assert!(found.failures.is_empty());
    }

    #[tokio::test]
    async fn test_envelope_on_disk() {
        let (store, dir) = make_store().await;
        let data = json!({"secret": "do not leak"});
        let manifest = store.store_local(&data, true).await.unwrap();

        let expected = dir
            .path()
            .join(&manifest.id[..2])
            .join(format!("{}.json", manifest.id));
        assert_eq!(manifest.path, expected);

        let raw = std::fs::read_to_string(&expected).unwrap();
        assert!(!raw.contains("do not leak"));
        let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope["id"], manifest.id);
        assert_eq!(envelope["encrypted"], true);
        assert_eq!(envelope["compressed"], true);
        assert_eq!(envelope["originalSize"], serde_json::to_vec(&data).unwrap().len());
        assert!(envelope["data"].is_string());
    }

    #[tokio::test]
    async fn test_plain_record_keeps_value() {
        let dir = TempDir::new().unwrap();
        let store = EdgeStore::new(StorageConfig {
            compression_enabled: false,
            ..config(&dir)
        })
        .await
        .unwrap();

        let data = json!({"note": "plain"});
        let manifest = store.store_local(&data, false).await.unwrap();
        assert!(!manifest.encrypted);
        assert!(!manifest.compressed);

        let raw: EdgeRecord =
            serde_json::from_slice(&std::fs::read(&manifest.path).unwrap()).unwrap();
        assert_eq!(raw.data, data);
        assert!(raw.original_size.is_none());
        assert_eq!(store.load_record(&manifest.id).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_encryption_requires_privacy_mode() {
        let dir = TempDir::new().unwrap();
        let store = EdgeStore::new(StorageConfig {
            privacy_preserving: false,
            ..config(&dir)
        })
        .await
        .unwrap();

        let manifest = store.store_local(&json!("visible"), true).await.unwrap();
        assert!(!manifest.encrypted);
        assert!(manifest.compressed);
        assert_eq!(store.load_record(&manifest.id).await.unwrap(), json!("visible"));
    }

    #[tokio::test]
    async fn test_load_record_errors() {
        let (store, _dir) = make_store().await;
        assert!(matches!(
            store.load_record("../../etc/passwd").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.load_record(&"0".repeat(32)).await,
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let writer = EdgeStore::new(config(&dir)).await.unwrap();
        let manifest = writer.store_local(&json!({"k": "v"}), true).await.unwrap();

        let reader = EdgeStore::new(StorageConfig {
            encryption_key: Some("rotated".to_string()),
            ..config(&dir)
        })
        .await
        .unwrap();

        assert!(matches!(
            reader.load_record(&manifest.id).await,
            Err(Error::Crypto(_))
        ));

        let scan = reader.retrieve_local("", false).await;
        assert_eq!(scan.total_found, 0);
        assert_eq!(scan.failures.len(), 1);
        assert_eq!(scan.failures[0].id, manifest.id);
    }

    #[tokio::test]
    async fn test_retrieve_sorts_by_relevance_then_recency() {
        let (store, _dir) = make_store().await;
        let older = store
            .store_local_at(&json!("deploy the release"), true, 1_000)
            .await
            .unwrap();
        let newer = store
            .store_local_at(&json!("deploy the release again"), true, 2_000)
            .await
            .unwrap();
        let fuzzy = store
            .store_local_at(&json!("deplo checklist"), true, 3_000)
            .await
            .unwrap();
        store
            .store_local_at(&json!("unrelated"), true, 4_000)
            .await
            .unwrap();

        let found = store.retrieve_local("deploy", true).await;
        let ids: Vec<&str> = found.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str(), fuzzy.id.as_str()]);
        assert!(found.results[2].relevance < 1.0);

        let exact = store.retrieve_local("deploy", false).await;
        assert_eq!(exact.total_found, 2);
    }

    #[tokio::test]
    async fn test_scan_tolerates_vanished_and_corrupt_files() {
        let (store, dir) = make_store().await;
        let keep = store.store_local(&json!("alpha one"), true).await.unwrap();
        let gone = store.store_local(&json!("alpha two"), true).await.unwrap();

        let corrupt_dir = dir.path().join("ff");
        std::fs::create_dir_all(&corrupt_dir).unwrap();
        std::fs::write(corrupt_dir.join(format!("{}.json", "f".repeat(32))), b"{not json").unwrap();

        // Listing happens before the concurrent delete.
        let files = store.list_record_files().await.unwrap();
        assert_eq!(files.len(), 3);
        std::fs::remove_file(&gone.path).unwrap();

        let found = store.scan(files, "alpha", false, Instant::now()).await;
        assert_eq!(found.total_found, 1);
        assert_eq!(found.results[0].id, keep.id);
        assert!(found.failures.is_empty());
    }

    #[tokio::test]
    async fn test_list_ignores_stray_files() {
        let (store, dir) = make_store().await;
        store.store_local(&json!(1), false).await.unwrap();
        std::fs::write(dir.path().join("README"), b"hi").unwrap();
        std::fs::create_dir_all(dir.path().join("not-a-shard")).unwrap();
        std::fs::write(dir.path().join("not-a-shard").join("x.json"), b"{}").unwrap();

        assert_eq!(store.list_record_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_shard() {
        let (store, _dir) = make_store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.store_local(&json!({"i": i}), true).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        // 32 ids over 256 shards: shared shards are likely, and every write succeeded.
        assert_eq!(store.get_storage_stats().await.unwrap().total_files, 32);
    }

    #[tokio::test]
    async fn test_quota_evicts_oldest_with_headroom() {
        let dir = TempDir::new().unwrap();
        let plain = |max_local_size| StorageConfig {
            compression_enabled: false,
            privacy_preserving: false,
            max_local_size,
            ..config(&dir)
        };
        let payload = json!({"text": "x".repeat(200)});

        // Measure one record on a scratch store with no pressure.
        let scratch_dir = TempDir::new().unwrap();
        let scratch = EdgeStore::new(StorageConfig {
            root: scratch_dir.path().to_path_buf(),
            ..plain(u64::MAX)
        })
        .await
        .unwrap();
        scratch.store_local_at(&payload, false, 1_000).await.unwrap();
        let size = scratch.get_storage_stats().await.unwrap().total_size;

        // Room for three records, not four.
        let max = size * 3 + size / 3;
        let store = EdgeStore::new(plain(max)).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..4 {
            let m = store
                .store_local_at(&payload, false, 1_000 + i)
                .await
                .unwrap();
            ids.push(m.id);
        }

        let stats = store.get_storage_stats().await.unwrap();
        assert!(stats.total_size <= (max as f64 * 0.8) as u64);
        assert_eq!(stats.total_files, 2);

        let remaining: Vec<String> = store
            .retrieve_local("", false)
            .await
            .results
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert!(!remaining.contains(&ids[0]));
        assert!(!remaining.contains(&ids[1]));
        assert!(remaining.contains(&ids[2]));
        assert!(remaining.contains(&ids[3]));

        // The next write fits without another eviction.
        store.store_local_at(&payload, false, 2_000).await.unwrap();
        let stats = store.get_storage_stats().await.unwrap();
        assert_eq!(stats.total_files, 3);
        assert!(stats.total_size <= max);
    }

    #[tokio::test]
    async fn test_oversized_record_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = EdgeStore::new(StorageConfig {
            compression_enabled: false,
            privacy_preserving: false,
            max_local_size: 1_000,
            ..config(&dir)
        })
        .await
        .unwrap();

        let err = store
            .store_local(&json!({"text": "x".repeat(1_000)}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(store.list_record_files().await.unwrap().is_empty());

        // Small records still fit.
        let manifest = store.store_local(&json!(1), false).await.unwrap();
        assert!(manifest.path.exists());
    }

    #[tokio::test]
    async fn test_backdated_write_survives_its_own_eviction() {
        let dir = TempDir::new().unwrap();
        let payload = json!({"text": "y".repeat(200)});
        let plain = |root: &Path, max_local_size| StorageConfig {
            compression_enabled: false,
            privacy_preserving: false,
            max_local_size,
            ..StorageConfig::with_root(root)
        };

        let scratch_dir = TempDir::new().unwrap();
        let scratch = EdgeStore::new(plain(scratch_dir.path(), u64::MAX))
            .await
            .unwrap();
        scratch.store_local_at(&payload, false, 5_000).await.unwrap();
        let size = scratch.get_storage_stats().await.unwrap().total_size;

        let store = EdgeStore::new(plain(dir.path(), size * 3 + size / 3))
            .await
            .unwrap();
        let mut newer = Vec::new();
        for ts in [5_000, 5_001, 5_002] {
            newer.push(store.store_local_at(&payload, false, ts).await.unwrap().id);
        }

        // Older than everything on disk, so it would be first in line.
        let backdated = store.store_local_at(&payload, false, 1_000).await.unwrap();
        assert!(backdated.stored);
        assert!(backdated.path.exists());
        assert!(store.load_record(&backdated.id).await.is_ok());

        // The two oldest of the earlier records made room instead.
        assert!(store.load_record(&newer[0]).await.is_err());
        assert!(store.load_record(&newer[1]).await.is_err());
        assert!(store.load_record(&newer[2]).await.is_ok());
    }

    #[tokio::test]
    async fn test_enforce_under_budget_is_noop() {
        let (store, _dir) = make_store().await;
        store.store_local(&json!("small"), true).await.unwrap();
        let report = store.enforce_storage_limits().await.unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.size_before, report.size_after);
    }

    #[tokio::test]
    async fn test_cleanup_removes_exactly_old_records() {
        let (store, _dir) = make_store().await;
        let now = now_millis();

        let mut old = Vec::new();
        for age in [60_000, 120_000, 3_600_000] {
            old.push(store.store_local_at(&json!({"age": age}), true, now - age).await.unwrap().id);
        }
        let mut fresh = Vec::new();
        for age in [0, 1_000] {
            fresh.push(store.store_local_at(&json!({"age": age}), true, now - age).await.unwrap().id);
        }

        let report = store.cleanup(30_000).await.unwrap();
        assert_eq!(report.deleted_files, 3);
        assert_eq!(report.remaining_files, 2);
        let mut deleted = report.deleted_ids.clone();
        deleted.sort();
        old.sort();
        assert_eq!(deleted, old);

        for id in &fresh {
            assert!(store.load_record(id).await.is_ok());
        }
        for id in &old {
            assert!(store.load_record(id).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_storage_stats() {
        let (store, _dir) = make_store().await;
        let empty = store.get_storage_stats().await.unwrap();
        assert_eq!(empty.total_files, 0);
        assert_eq!(empty.total_size, 0);
        assert_eq!(empty.remaining_space, empty.max_size);

        store.store_local(&json!("one"), true).await.unwrap();
        store.store_local(&json!("two"), false).await.unwrap();
        let stats = store.get_storage_stats().await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert!(stats.total_size > 0);
        assert_eq!(stats.remaining_space, stats.max_size - stats.total_size);
        assert!(stats.utilization_percent > 0.0);
    }

    #[tokio::test]
    async fn test_sync_disabled() {
        let (store, _dir) = make_store().await;
        let store = store.with_uploader(Arc::new(RecordingUploader::default()));
        assert!(matches!(
            store.sync_to_cloud(&json!({"x": 1}), true).await,
            Err(Error::CloudSyncDisabled)
        ));
    }

    #[tokio::test]
    async fn test_sync_without_uploader() {
        let dir = TempDir::new().unwrap();
        let store = EdgeStore::new(StorageConfig {
            cloud_sync: true,
            ..config(&dir)
        })
        .await
        .unwrap();
        assert!(matches!(
            store.sync_to_cloud(&json!({"x": 1}), false).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_encrypts_and_stores_locally_first() {
        let dir = TempDir::new().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let store = EdgeStore::new(StorageConfig {
            cloud_sync: true,
            ..config(&dir)
        })
        .await
        .unwrap()
        .with_uploader(uploader.clone());

        let data = json!({"steps": 4200, "label": "walk"});
        let receipt = store.sync_to_cloud(&data, true).await.unwrap();
        assert_eq!(receipt.remote_id, "remote-1");
        assert!(receipt.encrypted);
        assert!(receipt.noised);

        let local = receipt.local.unwrap();
        assert_eq!(store.load_record(&local.id).await.unwrap(), data);

        let uploads = uploader.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        let opened = AesGcmCipher::new(RecordKey::derive("test secret").unwrap())
            .open(&uploads[0].body)
            .unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&opened).unwrap();
        assert_eq!(sent["label"], "walk");
        assert_ne!(sent["steps"].as_f64(), Some(4200.0));
    }

    #[tokio::test]
    async fn test_sync_remote_only() {
        let dir = TempDir::new().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let store = EdgeStore::new(StorageConfig {
            cloud_sync: true,
            local_first: false,
            privacy_preserving: false,
            ..config(&dir)
        })
        .await
        .unwrap()
        .with_uploader(uploader.clone());

        let receipt = store.sync_to_cloud(&json!({"n": 1}), false).await.unwrap();
        assert!(receipt.local.is_none());
        assert!(!receipt.encrypted);
        assert_eq!(store.get_storage_stats().await.unwrap().total_files, 0);

        let uploads = uploader.uploads.lock().await;
        let sent: serde_json::Value = serde_json::from_slice(&uploads[0].body).unwrap();
        assert_eq!(sent, json!({"n": 1}));
    }
}
