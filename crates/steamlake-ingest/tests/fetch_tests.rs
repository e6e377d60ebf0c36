//! Cache-checked download tests against a mock Kaggle endpoint

mod common;

use common::{kaggle_config, reviews_zip};
use indicatif::ProgressBar;
use steamlake_common::checksum::sha256_file;
use steamlake_ingest::fetch::{CacheState, DatasetFetcher, DatasetId};
use steamlake_ingest::{Idempotent, IngestError};
use tempfile::TempDir;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DATASET_PATH: &str = "/api/v1/datasets/download/artermiloff/steam-games-reviews-2024";

fn dataset() -> DatasetId {
    DatasetId::parse("artermiloff/steam-games-reviews-2024").unwrap()
}

fn archive_bytes() -> Vec<u8> {
    reviews_zip(&[("10", "recommendationid\n1\n"), ("730", "recommendationid\n2\n")])
}

#[tokio::test]
async fn test_second_fetch_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes()))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();
    let cancel = CancellationToken::new();

    let first = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
    assert_eq!(
        first,
        cache.path().join("datasets/artermiloff/steam-games-reviews-2024.zip")
    );
    assert_eq!(std::fs::read(&first).unwrap(), archive_bytes());

    let entry = fetcher.cache_entry(&dataset());
    let metadata = entry.metadata().unwrap().unwrap();
    assert_eq!(metadata.size, archive_bytes().len() as u64);
    assert_eq!(metadata.sha256, sha256_file(&first).unwrap());
    assert!(!entry.partial_path().exists());

    assert!(fetcher.plan(&dataset(), false).already_done());
    let second = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
    assert_eq!(first, second);
    // `expect(1)` is verified when the server drops
}

#[tokio::test]
async fn test_force_refresh_downloads_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes()))
        .expect(2)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();
    let cancel = CancellationToken::new();

    fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
    assert!(!fetcher.plan(&dataset(), true).already_done());
    fetcher
        .fetch(&dataset(), true, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_not_found_is_not_retried_and_leaves_no_cache_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("dataset not found"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();

    let err = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        IngestError::RemoteFetch { status, body, .. } => {
            assert_eq!(status, Some(404));
            assert_eq!(body, "dataset not found");
        },
        other => panic!("expected RemoteFetch, got {other:?}"),
    }

    let entry = fetcher.cache_entry(&dataset());
    assert!(!entry.path().exists());
    assert!(!entry.partial_path().exists());
    assert_eq!(entry.state(), CacheState::Missing);
}

#[tokio::test]
async fn test_server_errors_are_retried_up_to_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(3)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();

    let err = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::RemoteFetch { status: Some(503), .. }));
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes()))
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();

    let path = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(path).unwrap(), archive_bytes());
}

#[tokio::test]
async fn test_credentials_are_sent_and_rejections_map_to_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .and(basic_auth("alice", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();

    let mut config = kaggle_config(&server.uri());
    config.username = Some("alice".to_string());
    config.key = Some("wrong".to_string());
    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(config.clone(), cache.path()).unwrap();
    let err = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Authentication { .. }), "{err:?}");

    config.key = Some("secret".to_string());
    let fetcher = DatasetFetcher::new(config, cache.path()).unwrap();
    fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_downloaded_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes()))
        .expect(2)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();
    let cancel = CancellationToken::new();

    let path = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();

    // Simulate a file cut short behind our back
    std::fs::write(&path, b"PK").unwrap();
    assert_eq!(fetcher.cache_entry(&dataset()).state(), CacheState::Corrupt);

    fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), archive_bytes());
    assert_eq!(fetcher.cache_entry(&dataset()).state(), CacheState::Complete);
}

#[tokio::test]
async fn test_cancelled_backoff_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = kaggle_config(&server.uri());
    config.retry_base_delay_ms = 60_000;
    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(config, cache.path()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Cancelled { stage: "download" }));
    assert!(!fetcher.cache_entry(&dataset()).path().exists());
}

#[tokio::test]
async fn test_tampered_cache_is_downloaded_again_when_verifying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes()))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = kaggle_config(&server.uri());
    config.verify_checksum = true;
    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(config, cache.path()).unwrap();
    let cancel = CancellationToken::new();

    let path = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
    assert!(fetcher.plan(&dataset(), false).already_done());

    // Same length, so only the digest can tell
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();
    assert_eq!(fetcher.cache_entry(&dataset()).state(), CacheState::Complete);
    assert_eq!(fetcher.plan(&dataset(), false).state, CacheState::Corrupt);

    fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), archive_bytes());
}

#[tokio::test]
async fn test_cancel_during_body_leaves_only_the_partial_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(archive_bytes())
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(kaggle_config(&server.uri()), cache.path()).unwrap();
    let entry = fetcher.cache_entry(&dataset());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Cancelled { stage: "download" }));
    assert!(entry.partial_path().exists());
    assert!(!entry.path().exists());
    assert_eq!(entry.state(), CacheState::Missing);

    let path = fetcher
        .fetch(&dataset(), false, &ProgressBar::hidden(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), archive_bytes());
    assert!(!entry.partial_path().exists());
}
