//! Pipeline configuration
//!
//! One explicit structure replaces the module-level constants of a typical
//! notebook pipeline. Values come from defaults, then `.env`, then the
//! process environment; the CLI applies its flags last.

use crate::error::{IngestError, Result};
use crate::fetch::DatasetId;
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_DATASET: &str = "artermiloff/steam-games-reviews-2024";

pub const DEFAULT_KAGGLE_URL: &str = "https://www.kaggle.com/api/v1/datasets/download";

pub const DEFAULT_DATA_DIR: &str = "data";

/// Top-level directory inside the Kaggle archive
pub const REVIEWS_DIR_NAME: &str = "SteamReviews2024";

pub const DEFAULT_MIRROR_DIR: &str = "notebooks/data";

pub const DEFAULT_PARQUET_FILE: &str = "steam_reviews.parquet";

pub const DEFAULT_DATALAKE_BUCKET: &str = "datalake";

pub const DEFAULT_WAREHOUSE_BUCKET: &str = "warehouse";

pub const DEFAULT_REVIEWS_PREFIX: &str = "extract/reviews";

pub const DEFAULT_PARQUET_PREFIX: &str = "extract/parquet";

/// Upper bound on uploads running at once.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;

/// Games copied next to the notebooks after a sync.
pub const DEFAULT_MIRROR_GAME_IDS: [&str; 4] = ["10", "289070", "578080", "730"];

/// Generous: the review archive is a few hundred megabytes.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

pub const DEFAULT_DREMIO_URL: &str = "http://localhost:9047";

pub const DEFAULT_DREMIO_USERNAME: &str = "dremio";

pub const DEFAULT_DREMIO_PASSWORD: &str = "dremio123";

/// As seen from inside the docker network, not from the host.
pub const DEFAULT_NESSIE_ENDPOINT: &str = "http://nessie:19120/api/v2";

pub const DEFAULT_INTERNAL_S3_ENDPOINT: &str = "minio:9000";

pub const DEFAULT_STEAM_APP_LIST_URL: &str =
    "https://api.steampowered.com/ISteamApps/GetAppList/v2/";

/// Everything the ingestion stages need
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub dataset: String,
    /// Archive is extracted here
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Notebook-facing copies of selected games
    pub mirror_dir: PathBuf,
    pub parquet_dir: PathBuf,
    pub parquet_file_name: String,
    pub mirror_game_ids: Vec<String>,
    pub upload_concurrency: usize,
    pub buckets: BucketConfig,
    pub kaggle: KaggleConfig,
    pub storage: StorageConfig,
    pub dremio: DremioConfig,
    pub steam_app_list_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketConfig {
    pub datalake: String,
    pub warehouse: String,
    pub reviews_prefix: String,
    pub parquet_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaggleConfig {
    pub base_url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub key: Option<String>,
    pub timeout_secs: u64,
    /// Total attempts per download, including the first
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Re-hash a cached archive against its recorded sha256 before reusing it
    pub verify_checksum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DremioConfig {
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub nessie_endpoint: String,
    /// Object store endpoint as Dremio reaches it
    pub s3_endpoint: String,
    pub timeout_secs: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            datalake: DEFAULT_DATALAKE_BUCKET.to_string(),
            warehouse: DEFAULT_WAREHOUSE_BUCKET.to_string(),
            reviews_prefix: DEFAULT_REVIEWS_PREFIX.to_string(),
            parquet_prefix: DEFAULT_PARQUET_PREFIX.to_string(),
        }
    }
}

impl Default for KaggleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_KAGGLE_URL.to_string(),
            username: None,
            key: None,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_retries: DEFAULT_DOWNLOAD_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_DELAY_MS,
            verify_checksum: false,
        }
    }
}

impl Default for DremioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DREMIO_URL.to_string(),
            username: DEFAULT_DREMIO_USERNAME.to_string(),
            password: DEFAULT_DREMIO_PASSWORD.to_string(),
            nessie_endpoint: DEFAULT_NESSIE_ENDPOINT.to_string(),
            s3_endpoint: DEFAULT_INTERNAL_S3_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mirror_dir = PathBuf::from(DEFAULT_MIRROR_DIR);
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cache_dir: default_cache_dir(),
            parquet_dir: mirror_dir.join("parquet"),
            mirror_dir,
            parquet_file_name: DEFAULT_PARQUET_FILE.to_string(),
            mirror_game_ids: DEFAULT_MIRROR_GAME_IDS.iter().map(|s| s.to_string()).collect(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            buckets: BucketConfig::default(),
            kaggle: KaggleConfig::default(),
            storage: StorageConfig::default(),
            dremio: DremioConfig::default(),
            steam_app_list_url: DEFAULT_STEAM_APP_LIST_URL.to_string(),
        }
    }
}

/// Platform cache directory (`~/.cache/steamlake` on Linux)
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("steamlake"))
        .unwrap_or_else(|| PathBuf::from(".steamlake-cache"))
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IngestError::config(format!("{} has invalid value '{}'", key, raw))),
    }
}

impl PipelineConfig {
    /// Load `.env` (if any) and the process environment, then validate
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from defaults plus whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dataset) = lookup("STEAMLAKE_DATASET") {
            config.dataset = dataset;
        }
        if let Some(dir) = lookup("STEAMLAKE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("STEAMLAKE_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("STEAMLAKE_MIRROR_DIR") {
            config.mirror_dir = PathBuf::from(&dir);
            config.parquet_dir = PathBuf::from(dir).join("parquet");
        }
        if let Some(dir) = lookup("STEAMLAKE_PARQUET_DIR") {
            config.parquet_dir = PathBuf::from(dir);
        }
        if let Some(ids) = lookup("STEAMLAKE_MIRROR_GAME_IDS") {
            config.mirror_game_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(n) = parse_var("STEAMLAKE_UPLOAD_CONCURRENCY", lookup("STEAMLAKE_UPLOAD_CONCURRENCY"))? {
            config.upload_concurrency = n;
        }
        if let Some(bucket) = lookup("STEAMLAKE_DATALAKE_BUCKET") {
            config.buckets.datalake = bucket;
        }
        if let Some(bucket) = lookup("STEAMLAKE_WAREHOUSE_BUCKET") {
            config.buckets.warehouse = bucket;
        }

        if let Some(url) = lookup("STEAMLAKE_KAGGLE_URL") {
            config.kaggle.base_url = url;
        }
        config.kaggle.username = lookup("KAGGLE_USERNAME");
        config.kaggle.key = lookup("KAGGLE_KEY");
        if let Some(secs) = parse_var("STEAMLAKE_HTTP_TIMEOUT_SECS", lookup("STEAMLAKE_HTTP_TIMEOUT_SECS"))? {
            config.kaggle.timeout_secs = secs;
        }
        if let Some(n) = parse_var("STEAMLAKE_DOWNLOAD_RETRIES", lookup("STEAMLAKE_DOWNLOAD_RETRIES"))? {
            config.kaggle.max_retries = n;
        }
        if let Some(ms) = parse_var("STEAMLAKE_RETRY_DELAY_MS", lookup("STEAMLAKE_RETRY_DELAY_MS"))? {
            config.kaggle.retry_base_delay_ms = ms;
        }
        if let Some(verify) = parse_var("STEAMLAKE_VERIFY_CACHE", lookup("STEAMLAKE_VERIFY_CACHE"))? {
            config.kaggle.verify_checksum = verify;
        }

        config.storage = StorageConfig::from_lookup(&lookup);

        if let Some(url) = lookup("DREMIO_URL") {
            config.dremio.base_url = url;
        }
        if let Some(user) = lookup("DREMIO_USERNAME") {
            config.dremio.username = user;
        }
        if let Some(password) = lookup("DREMIO_PASSWORD") {
            config.dremio.password = password;
        }
        if let Some(endpoint) = lookup("DREMIO_NESSIE_ENDPOINT") {
            config.dremio.nessie_endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("DREMIO_S3_ENDPOINT") {
            config.dremio.s3_endpoint = endpoint;
        }

        if let Some(url) = lookup("STEAM_APP_LIST_URL") {
            config.steam_app_list_url = url;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        DatasetId::parse(&self.dataset)?;

        if self.upload_concurrency == 0 {
            return Err(IngestError::config("upload concurrency must be greater than 0"));
        }
        if self.kaggle.max_retries == 0 {
            return Err(IngestError::config("download retries must be at least 1"));
        }
        if self.buckets.datalake.trim().is_empty() || self.buckets.warehouse.trim().is_empty() {
            return Err(IngestError::config("bucket names cannot be empty"));
        }
        if self.parquet_file_name.trim().is_empty() {
            return Err(IngestError::config("parquet file name cannot be empty"));
        }
        if self.kaggle.username.is_some() != self.kaggle.key.is_some() {
            tracing::warn!("Only one of KAGGLE_USERNAME/KAGGLE_KEY is set; downloading anonymously");
        }

        Ok(())
    }

    pub fn dataset_id(&self) -> Result<DatasetId> {
        DatasetId::parse(&self.dataset)
    }

    /// Where the extracted review CSVs land
    pub fn reviews_dir(&self) -> PathBuf {
        self.data_dir.join(REVIEWS_DIR_NAME)
    }

    pub fn parquet_output(&self) -> PathBuf {
        self.parquet_dir.join(&self.parquet_file_name)
    }

    pub fn app_ids_output(&self) -> PathBuf {
        self.parquet_dir.join("appids.json")
    }
}
