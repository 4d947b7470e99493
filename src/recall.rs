//! Combined recall across fusion memory and the edge store

use crate::edge::{EdgeStore, RetrievalResult};
use crate::fusion::{QueryResult, TemporalMemoryFusion};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Union of an in-memory query and a local store retrieval
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recall {
    pub fusion: QueryResult,
    pub edge: RetrievalResult,
    /// Fusion hits plus edge hits
    pub total: usize,
}

/// Ask both memories the same question concurrently.
pub async fn recall(
    fusion: &TemporalMemoryFusion,
    edge: &EdgeStore,
    query: &str,
    fuzzy: bool,
) -> Recall {
    let (fusion, edge) = tokio::join!(
        fusion.query_memory(query, fuzzy),
        edge.retrieve_local(query, fuzzy)
    );
    let total = fusion.total_hits + edge.total_found;
    debug!(
        query = %query,
        fusion_hits = fusion.total_hits,
        edge_hits = edge.total_found,
        "Recall complete"
    );
    Recall {
        fusion,
        edge,
        total,
    }
}
