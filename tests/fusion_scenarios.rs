//! End-to-end fusion behavior, including persistence of alignment snapshots

use edgemem::config::{FusionConfig, StorageConfig};
use edgemem::fusion::{MemoryCategory, StreamType, TemporalMemoryFusion};
use edgemem::{recall, EdgeStore, Error};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

async fn make_edge(dir: &TempDir) -> Arc<EdgeStore> {
    let config = StorageConfig {
        encryption_key: Some("integration".to_string()),
        ..StorageConfig::with_root(dir.path())
    };
    Arc::new(EdgeStore::new(config).await.unwrap())
}

#[tokio::test]
async fn test_every_stream_type_is_accepted() {
    let fusion = TemporalMemoryFusion::new(FusionConfig::default());
    for (i, stream_type) in StreamType::ALL.iter().enumerate() {
        // Spread far apart so no alignment fires.
        let ts = 1_000_000 * (i as u64 + 1);
        fusion
            .ingest_stream(stream_type.as_str(), json!({"i": i}), ts)
            .await
            .unwrap();
    }
    for bad in ["video", "Screen", " audio", ""] {
        let err = fusion.ingest_stream(bad, json!({}), 0).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{bad:?} accepted");
    }
}

#[tokio::test]
async fn test_screen_audio_alignment_is_persisted() {
    let dir = TempDir::new().unwrap();
    let edge = make_edge(&dir).await;
    let fusion =
        TemporalMemoryFusion::new(FusionConfig::default()).with_edge_store(edge.clone());

    fusion
        .ingest_stream("screen", json!({"app": "editor", "confidence": 0.9}), 50_000)
        .await
        .unwrap();
    assert_eq!(fusion.category_len(MemoryCategory::Temporal).await, 0);

    fusion
        .ingest_stream("audio", json!({"transcript": "save the file"}), 50_400)
        .await
        .unwrap();

    let temporal = fusion.category_snapshot(MemoryCategory::Temporal).await;
    assert_eq!(temporal.len(), 1);
    let (key, record) = temporal.iter().next().unwrap();
    assert!(key.starts_with("alignment_"));
    assert!(record.payload["perTypeAlignedEntries"]["screen"].is_array());
    assert!(record.payload["perTypeAlignedEntries"]["audio"].is_array());
    assert!(record.payload["crossModalWeights"]["screen_audio"].is_number());

    // The aligned entries were consumed.
    assert_eq!(fusion.buffered_len(StreamType::Screen).await, 0);
    assert_eq!(fusion.buffered_len(StreamType::Audio).await, 0);

    let stored = edge.retrieve_local("", false).await;
    assert_eq!(stored.total_found, 1);
    assert!(stored.results[0].encrypted);
    let snapshot = &stored.results[0].data;
    assert_eq!(snapshot["offsetMs"], record.payload["offsetMs"]);
    assert_eq!(
        snapshot["perTypeAlignedEntries"]["audio"][0]["payload"]["transcript"],
        "save the file"
    );
}

#[tokio::test]
async fn test_distant_streams_do_not_align() {
    let fusion = TemporalMemoryFusion::new(FusionConfig::default());
    fusion
        .ingest_stream("screen", json!({"app": "mail"}), 10_000)
        .await
        .unwrap();
    fusion
        .ingest_stream("action", json!({"click": "send"}), 20_000)
        .await
        .unwrap();

    assert_eq!(fusion.category_len(MemoryCategory::Temporal).await, 0);
    assert_eq!(fusion.buffered_len(StreamType::Screen).await, 1);
    assert_eq!(fusion.buffered_len(StreamType::Action).await, 1);

    // An explicit pass aligns whatever is buffered.
    let aligned = fusion.align_temporal_streams(25).await.unwrap();
    assert_eq!(aligned.len(), 2);
    assert!(aligned["screen"].iter().all(|e| e.alignment_offset == 25));
    assert_eq!(fusion.category_len(MemoryCategory::Temporal).await, 1);
}

#[tokio::test]
async fn test_compression_extremes() {
    let fusion = TemporalMemoryFusion::new(FusionConfig::default());
    for i in 0..4 {
        fusion
            .put_record(
                "episodic",
                format!("visit_{}", i),
                json!({"place": "cafe", "notes": "long description ".repeat(20)}),
            )
            .await
            .unwrap();
    }

    let keep_all = fusion.compress_memory("episodic", 0.0).await.unwrap();
    assert_eq!(keep_all.new_size, keep_all.original_size);
    assert_eq!(keep_all.kept, 4);

    let squeeze = fusion.compress_memory("episodic", 1.0).await.unwrap();
    assert_eq!(squeeze.kept, 0);
    assert!(squeeze.new_size < squeeze.original_size);

    assert!(matches!(
        fusion.compress_memory("dreams", 0.5).await,
        Err(Error::UnknownCategory(_))
    ));
}

#[tokio::test]
async fn test_recall_spans_memory_and_store() {
    let dir = TempDir::new().unwrap();
    let edge = make_edge(&dir).await;
    let fusion = TemporalMemoryFusion::new(FusionConfig::default());

    fusion
        .put_record("working", "draft", json!({"title": "quarterly report"}))
        .await
        .unwrap();
    edge.store_local(&json!({"doc": "quarterly report v2"}), true)
        .await
        .unwrap();

    let found = recall(&fusion, &edge, "quartely report", true).await;
    assert_eq!(found.fusion.total_hits, 1);
    assert_eq!(found.edge.total_found, 1);
    assert_eq!(found.total, 2);
}
