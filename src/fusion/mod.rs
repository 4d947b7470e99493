//! Temporal memory fusion: multi-modal observations into typed memory
//!
//! Observations (screen, audio, action) are buffered per stream type,
//! aligned across a shared temporal window, and recorded in five typed
//! categories: procedural, semantic, temporal, working, episodic.

pub mod category;
pub mod engine;
pub mod stream;

pub use category::{
    AlignmentResult, CategoryMap, CategoryRecord, CompressionReport, MemoryCategory, QueryHit,
    QueryResult,
};
pub use engine::TemporalMemoryFusion;
pub use stream::{StreamEntry, StreamType};
