//! Whole-pipeline runs against a mock Kaggle endpoint and the in-memory store

mod common;

use common::{kaggle_config, review_csv, reviews_zip};
use std::sync::Arc;
use steamlake_ingest::extract::ExtractOutcome;
use steamlake_ingest::progress::Progress;
use steamlake_ingest::storage::{BucketStatus, MemoryStore};
use steamlake_ingest::transform::ConvertOutcome;
use steamlake_ingest::{IngestError, IngestPipeline, PipelineConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline_config(root: &TempDir, server: &MockServer) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.data_dir = root.path().join("data");
    config.cache_dir = root.path().join("cache");
    config.mirror_dir = root.path().join("notebooks/data");
    config.parquet_dir = root.path().join("notebooks/data/parquet");
    config.kaggle = kaggle_config(&server.uri());
    config
}

async fn mount_dataset(server: &MockServer, expected_requests: u64) {
    let archive = reviews_zip(&[
        ("10", review_csv(&[Some(1), Some(2)]).as_str()),
        ("730", review_csv(&[Some(3), None]).as_str()),
        ("12345", review_csv(&[Some(4)]).as_str()),
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v1/datasets/download/artermiloff/steam-games-reviews-2024"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(expected_requests)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pipeline_runs_every_stage_then_becomes_a_no_op() {
    let server = MockServer::start().await;
    mount_dataset(&server, 1).await;

    let root = TempDir::new().unwrap();
    let config = pipeline_config(&root, &server);
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestPipeline::new(config.clone(), store.clone(), Progress::new(false));
    let cancel = CancellationToken::new();

    let first = pipeline.run(false, &cancel).await.unwrap();

    assert!(first.is_complete());
    assert!(matches!(first.extraction, ExtractOutcome::Extracted { members: 3, .. }));
    assert!(first.buckets.iter().all(|(_, s)| *s == BucketStatus::Created));
    assert_eq!(first.reviews.uploaded_count(), 3);
    // 12345 is not in the default mirror list
    assert_eq!(first.mirror.copied.len(), 2);
    assert!(root.path().join("notebooks/data/730.csv").is_file());
    assert!(!root.path().join("notebooks/data/12345.csv").exists());
    assert!(matches!(
        first.conversion,
        ConvertOutcome::Converted {
            rows_written: 4,
            rows_dropped: 1,
            ..
        }
    ));
    assert_eq!(first.parquet.uploaded_count(), 1);

    let mut keys = store.keys("datalake");
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "extract/parquet/steam_reviews.parquet",
            "extract/reviews/10.csv",
            "extract/reviews/12345.csv",
            "extract/reviews/730.csv",
        ]
    );
    let puts_after_first = store.put_calls();

    let second = pipeline.run(false, &cancel).await.unwrap();

    assert!(matches!(second.extraction, ExtractOutcome::Skipped { .. }));
    assert!(second.buckets.iter().all(|(_, s)| *s == BucketStatus::Existing));
    assert_eq!(second.reviews.uploaded_count(), 0);
    assert_eq!(second.reviews.skipped_count(), 3);
    assert!(second.mirror.copied.is_empty());
    assert!(matches!(second.conversion, ConvertOutcome::Skipped { .. }));
    assert_eq!(second.parquet.uploaded_count(), 0);
    assert_eq!(store.put_calls(), puts_after_first);
}

#[tokio::test]
async fn test_cancelled_pipeline_stops_before_the_next_stage() {
    let server = MockServer::start().await;
    mount_dataset(&server, 0).await;

    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestPipeline::new(pipeline_config(&root, &server), store.clone(), Progress::new(false));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline.run(false, &cancel).await.unwrap_err();
    assert!(matches!(err, IngestError::Cancelled { .. }));
    assert_eq!(store.put_calls(), 0);
}
