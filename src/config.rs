//! edgemem configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main edgemem configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeMemConfig {
    /// Temporal memory fusion configuration
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Edge storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl EdgeMemConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.fusion.validate()?;
        self.storage.validate()
    }
}

/// Temporal memory fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Alignment offset applied by ingest-triggered passes, in ms
    pub temporal_alignment: i64,

    /// Default DMC target ratio (fraction of volume to remove, 0.0..=1.0)
    pub compression_ratio: f64,

    /// Time radius for cross-modal alignment, in ms
    pub temporal_window: u64,

    /// Normalized edit distance below which a fuzzy match is accepted
    pub fuzzy_threshold: f64,

    /// Soft latency target for queries, in ms (logged, never enforced)
    pub slow_query_ms: u64,

    /// Maximum buffered entries per stream type before the oldest is dropped
    pub max_buffer_entries: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            temporal_alignment: 100,
            compression_ratio: 0.5,
            temporal_window: 1000,
            fuzzy_threshold: 0.3,
            slow_query_ms: 100,
            max_buffer_entries: 1024,
        }
    }
}

impl FusionConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.compression_ratio) {
            return Err(Error::Config(format!(
                "compression_ratio must be within 0.0..=1.0, got {}",
                self.compression_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(Error::Config(format!(
                "fuzzy_threshold must be within 0.0..=1.0, got {}",
                self.fuzzy_threshold
            )));
        }
        if self.temporal_window == 0 {
            return Err(Error::Config("temporal_window must be positive".to_string()));
        }
        if self.max_buffer_entries == 0 {
            return Err(Error::Config(
                "max_buffer_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Edge storage configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the sharded record store
    pub root: PathBuf,

    /// Persist locally before any cloud upload
    pub local_first: bool,

    /// Encrypt records at rest when the caller asks for it
    pub privacy_preserving: bool,

    /// Allow `sync_to_cloud`
    pub cloud_sync: bool,

    /// Secret material the record key is derived from.
    /// `None` generates a random key that lives as long as the process.
    pub encryption_key: Option<String>,

    /// Byte budget for all record files
    pub max_local_size: u64,

    /// Compress record payloads before writing
    pub compression_enabled: bool,

    /// Normalized edit distance below which a fuzzy match is accepted
    pub fuzzy_threshold: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            local_first: true,
            privacy_preserving: true,
            cloud_sync: false,
            encryption_key: None,
            max_local_size: 100 * 1024 * 1024,
            compression_enabled: true,
            fuzzy_threshold: 0.3,
        }
    }
}

impl StorageConfig {
    /// Default configuration rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_local_size == 0 {
            return Err(Error::Config("max_local_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(Error::Config(format!(
                "fuzzy_threshold must be within 0.0..=1.0, got {}",
                self.fuzzy_threshold
            )));
        }
        if matches!(&self.encryption_key, Some(k) if k.is_empty()) {
            return Err(Error::Config("encryption_key must not be empty".to_string()));
        }
        Ok(())
    }
}

// Keep the key out of logs.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("root", &self.root)
            .field("local_first", &self.local_first)
            .field("privacy_preserving", &self.privacy_preserving)
            .field("cloud_sync", &self.cloud_sync)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field("max_local_size", &self.max_local_size)
            .field("compression_enabled", &self.compression_enabled)
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .finish()
    }
}

/// Default store root (~/.edgemem/store)
pub fn default_root() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".edgemem")
        .join("store")
}
