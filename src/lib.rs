//! edgemem - Bounded, privacy-preserving multi-modal memory
//!
//! edgemem keeps an assistant's memory close to the device: observations
//! from several sensing streams are fused into typed in-memory categories,
//! and durable records are written to a local, encrypted, size-bounded store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                    Temporal Memory Fusion                          │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐                            │
//! │  │  Screen  │ │  Audio   │ │  Action  │   per-type buffers         │
//! │  └────┬─────┘ └────┬─────┘ └────┬─────┘                            │
//! │       └────────────┼────────────┘                                  │
//! │  ┌─────────────────▼─────────────────────────────────────────┐    │
//! │  │                 Temporal Alignment                         │    │
//! │  │  - Attention weight per entry                              │    │
//! │  │  - Cross-modal correspondence per ordered pair             │    │
//! │  └─────────────────┬─────────────────────────────────────────┘    │
//! │  ┌─────────────────▼─────────────────────────────────────────┐    │
//! │  │  procedural │ semantic │ temporal │ working │ episodic     │    │
//! │  │          DMC: keep / compress / drop by importance         │    │
//! │  └─────────────────┬─────────────────────────────────────────┘    │
//! └────────────────────┼──────────────────────────────────────────────┘
//!                      │ alignment snapshots
//! ┌────────────────────▼──────────────────────────────────────────────┐
//! │                         Edge Store                                 │
//! │  gzip ─▶ AES-256-GCM ─▶ <root>/<xx>/<id>.json                      │
//! │  - Exact / fuzzy retrieval                                         │
//! │  - Byte quota, oldest-first eviction                               │
//! │  - Age-based cleanup                                               │
//! │  - Cloud sync boundary (DP noise, sealed upload)                   │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`fusion`]: Stream buffers, alignment, memory categories, DMC
//! - [`edge`]: Sharded local record store and cloud sync boundary
//! - [`strategy`]: Pluggable importance, attention, correspondence and compression
//! - [`crypto`]: Record encryption and key derivation
//! - [`codec`]: Payload compression
//! - [`matching`]: Exact and fuzzy text matching
//! - [`repository`]: Memory CRUD contract
//! - [`recall`]: Combined fusion and edge recall
//! - [`config`]: Configuration management

pub mod codec;
pub mod config;
pub mod crypto;
pub mod edge;
pub mod error;
pub mod fusion;
pub mod matching;
pub mod recall;
pub mod repository;
pub mod strategy;

pub use config::{EdgeMemConfig, FusionConfig, StorageConfig};
pub use edge::EdgeStore;
pub use error::{Error, Result};
pub use fusion::{MemoryCategory, StreamType, TemporalMemoryFusion};
pub use recall::{recall, Recall};

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
