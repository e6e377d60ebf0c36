use serde::{Deserialize, Serialize};

/// Default MinIO endpoint from the local docker-compose stack.
pub const DEFAULT_S3_ENDPOINT: &str = "http://localhost:9000";

pub const DEFAULT_S3_REGION: &str = "us-east-1";

pub const DEFAULT_S3_ACCESS_KEY: &str = "minio";

pub const DEFAULT_S3_SECRET_KEY: &str = "minio1234";

/// Connection settings for the S3-compatible object store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// `None` talks to AWS proper
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    /// Read `S3_*` variables through `lookup`, falling back to the local MinIO defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            endpoint: match lookup("S3_ENDPOINT") {
                Some(endpoint) if endpoint.is_empty() => None,
                Some(endpoint) => Some(endpoint),
                None => defaults.endpoint,
            },
            region: lookup("S3_REGION").unwrap_or(defaults.region),
            access_key: lookup("S3_ACCESS_KEY")
                .or_else(|| lookup("AWS_ACCESS_KEY_ID"))
                .unwrap_or(defaults.access_key),
            secret_key: lookup("S3_SECRET_KEY")
                .or_else(|| lookup("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or(defaults.secret_key),
            path_style: lookup("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.path_style),
        }
    }

    pub fn for_minio(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            path_style: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::for_minio(DEFAULT_S3_ENDPOINT, DEFAULT_S3_ACCESS_KEY, DEFAULT_S3_SECRET_KEY)
    }
}
