//! Shared helpers for steamlake-ingest integration tests
//!
//! - fixture builders for review CSVs and Kaggle-style zip archives
//! - [`TestMinio`]: a throwaway MinIO container (needs Docker)

#![allow(dead_code)]

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use steamlake_ingest::config::KaggleConfig;
use steamlake_ingest::storage::{S3Store, StorageConfig};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

pub const REVIEW_HEADER: &str =
    "recommendationid,timestamp_created,timestamp_updated,voted_up,steam_purchase,review";

/// 2024-01-15T00:00:00Z
pub const JAN_2024: i64 = 1_705_276_800;

/// A small review CSV; `None` ids become empty (null) primary keys
pub fn review_csv(ids: &[Option<i64>]) -> String {
    let mut csv = String::from(REVIEW_HEADER);
    csv.push('\n');
    for (i, id) in ids.iter().enumerate() {
        let id = id.map(|id| id.to_string()).unwrap_or_default();
        csv.push_str(&format!(
            "{},{},{},{},{},review {}\n",
            id,
            JAN_2024,
            JAN_2024 + 60,
            if i % 2 == 0 { "true" } else { "false" },
            "true",
            i
        ));
    }
    csv
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create fixture dir");
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

/// Zip bytes shaped like the Kaggle download: `SteamReviews2024/<game>.csv`
pub fn reviews_zip(games: &[(&str, &str)]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        for (game, csv) in games {
            zip.start_file(
                format!("SteamReviews2024/{}.csv", game),
                zip::write::SimpleFileOptions::default(),
            )
            .expect("start zip member");
            zip.write_all(csv.as_bytes()).expect("write zip member");
        }
        zip.finish().expect("finish zip");
    }
    buffer.into_inner()
}

/// Kaggle settings pointing at a mock server, with fast retries
pub fn kaggle_config(base_url: &str) -> KaggleConfig {
    KaggleConfig {
        base_url: format!("{}/api/v1/datasets/download", base_url),
        retry_base_delay_ms: 1,
        timeout_secs: 10,
        ..KaggleConfig::default()
    }
}

pub const MINIO_ACCESS_KEY: &str = "minio";
pub const MINIO_SECRET_KEY: &str = "minio1234";

/// MinIO test container
///
/// The container is stopped when this value is dropped.
pub struct TestMinio {
    container: ContainerAsync<GenericImage>,
    client: S3Client,
    endpoint: String,
}

impl TestMinio {
    pub async fn start() -> Result<Self> {
        let container = GenericImage::new("minio/minio", "latest")
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("MinIO Object Storage Server"))
            .with_env_var("MINIO_ROOT_USER", MINIO_ACCESS_KEY)
            .with_env_var("MINIO_ROOT_PASSWORD", MINIO_SECRET_KEY)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .context("Failed to start MinIO container")?;

        let host = container.get_host().await.context("Failed to get MinIO host")?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .context("Failed to get MinIO port")?;
        let endpoint = format!("http://{}:{}", host, port);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(aws_credential_types::Credentials::new(
                MINIO_ACCESS_KEY,
                MINIO_SECRET_KEY,
                None,
                None,
                "static",
            ))
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            container,
            client: S3Client::from_conf(s3_config),
            endpoint,
        })
    }

    /// Raw SDK client, for checking what the store wrote
    pub fn client(&self) -> &S3Client {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::for_minio(&self.endpoint, MINIO_ACCESS_KEY, MINIO_SECRET_KEY)
    }

    pub fn store(&self) -> S3Store {
        S3Store::new(&self.storage_config())
    }
}
