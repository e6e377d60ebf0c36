//! Object store access
//!
//! [`ObjectStore`] is the seam between the stages and the S3-compatible
//! backend. [`S3Store`] talks to MinIO/AWS through `aws-sdk-s3`;
//! [`MemoryStore`] keeps objects in memory and records call statistics so
//! the upload stage can be tested without a server.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, instrument};

pub mod config;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use memory::MemoryStore;
pub use s3::S3Store;

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Every key under `prefix`, following pagination to the end
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Upload a local file, returning the number of bytes sent
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<u64> {
        let data = tokio::fs::read(path).await?;
        let size = data.len() as u64;
        self.put_object(bucket, key, data, content_type).await?;
        Ok(size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    Existing,
}

/// Create each bucket that does not exist yet
#[instrument(skip(store))]
pub async fn ensure_buckets(
    store: &dyn ObjectStore,
    buckets: &[String],
) -> Result<Vec<(String, BucketStatus)>> {
    let mut statuses = Vec::with_capacity(buckets.len());

    for bucket in buckets {
        let status = if store.bucket_exists(bucket).await? {
            BucketStatus::Existing
        } else {
            store.create_bucket(bucket).await?;
            info!(bucket = %bucket, "Created bucket");
            BucketStatus::Created
        };
        statuses.push((bucket.clone(), status));
    }

    Ok(statuses)
}

/// `prefix/name` without doubled or leading slashes
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Last key segment without its extension: `extract/reviews/730.csv` -> `730`
pub fn key_stem(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().filter(|n| !n.is_empty())?;
    Some(match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    })
}

pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => CSV_CONTENT_TYPE,
        Some("parquet") => PARQUET_CONTENT_TYPE,
        _ => BINARY_CONTENT_TYPE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("extract/reviews", "730.csv"), "extract/reviews/730.csv");
        assert_eq!(object_key("/extract/reviews/", "730.csv"), "extract/reviews/730.csv");
        assert_eq!(object_key("", "730.csv"), "730.csv");
    }

    #[test]
    fn test_key_stem() {
        assert_eq!(key_stem("extract/reviews/730.csv"), Some("730"));
        assert_eq!(key_stem("extract/parquet/steam_reviews.parquet"), Some("steam_reviews"));
        assert_eq!(key_stem("archive.tar.gz"), Some("archive.tar"));
        assert_eq!(key_stem("extract/reviews/"), None);
        assert_eq!(key_stem("README"), Some("README"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/10.csv")), CSV_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("x.PARQUET")), PARQUET_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("x.bin")), BINARY_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_ensure_buckets_is_idempotent() {
        let store = MemoryStore::new();
        let buckets = vec!["datalake".to_string(), "warehouse".to_string()];

        let first = ensure_buckets(&store, &buckets).await.unwrap();
        assert!(first.iter().all(|(_, s)| *s == BucketStatus::Created));

        let second = ensure_buckets(&store, &buckets).await.unwrap();
        assert!(second.iter().all(|(_, s)| *s == BucketStatus::Existing));
    }
}
