//! Edge storage: local-first, privacy-preserving record persistence
//!
//! Records live as one JSON envelope per file under a two-hex-char shard
//! directory. Payloads are optionally compressed and then sealed with
//! AES-256-GCM. A byte budget is enforced after every write by evicting the
//! oldest records. Cloud upload is an injected collaborator and off by default.

pub mod cloud;
pub mod record;
pub mod store;

pub use cloud::{CloudEnvelope, CloudUploader, LaplaceNoise, NoiseInjector, SyncReceipt};
pub use record::{
    CleanupReport, EdgeRecord, EvictionReport, RecordFailure, RetrievalResult, RetrievedRecord,
    StorageStats, StoreManifest,
};
pub use store::EdgeStore;
