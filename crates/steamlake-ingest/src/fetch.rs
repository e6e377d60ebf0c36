//! Cache-checked dataset download
//!
//! A dataset is downloaded at most once per cache root. The final cache path
//! only ever appears through a rename of a fully written `<path>.part`, and a
//! `<path>.json` sidecar records what was fetched. An interrupted download
//! leaves the `.part` file behind; the next attempt truncates it.

use crate::config::KaggleConfig;
use crate::error::{IngestError, Result};
use crate::idempotence::Idempotent;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use indicatif::ProgressBar;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use steamlake_common::checksum::{verify_sha256, StreamingSha256};
use steamlake_common::CommonError;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const USER_AGENT: &str = concat!("steamlake/", env!("CARGO_PKG_VERSION"));

/// `<owner>/<dataset>` as used in Kaggle download URLs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId {
    owner: String,
    name: String,
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl DatasetId {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if valid_segment(owner) && valid_segment(name) => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            },
            _ => Err(IngestError::InvalidDatasetId(raw.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for DatasetId {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DatasetId {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DatasetId> for String {
    fn from(id: DatasetId) -> Self {
        id.to_string()
    }
}

/// Sidecar written next to a completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub dataset: DatasetId,
    pub url: String,
    pub size: u64,
    pub sha256: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Missing,
    Complete,
    /// Sidecar unreadable or disagreeing with the file on disk
    Corrupt,
}

/// Where a dataset lives in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    dataset: DatasetId,
    path: PathBuf,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

impl CacheEntry {
    /// `<cache_root>/datasets/<owner>/<dataset>.zip`
    pub fn new(cache_root: &Path, dataset: &DatasetId) -> Self {
        let path = cache_root
            .join("datasets")
            .join(dataset.owner())
            .join(format!("{}.zip", dataset.name()));
        Self {
            dataset: dataset.clone(),
            path,
        }
    }

    pub fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partial_path(&self) -> PathBuf {
        with_suffix(&self.path, ".part")
    }

    pub fn metadata_path(&self) -> PathBuf {
        with_suffix(&self.path, ".json")
    }

    pub fn metadata(&self) -> Result<Option<CacheMetadata>> {
        match std::fs::read(self.metadata_path()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Re-hash the cached file against the digest in its sidecar
    ///
    /// `Ok(true)` when they agree or no digest was recorded.
    pub fn verify(&self) -> Result<bool> {
        let expected = match self.metadata()? {
            Some(meta) if !meta.sha256.is_empty() => meta.sha256,
            _ => return Ok(true),
        };

        match verify_sha256(&self.path, &expected) {
            Ok(()) => Ok(true),
            Err(CommonError::ChecksumMismatch { expected, actual }) => {
                warn!(
                    path = %self.path.display(),
                    %expected,
                    %actual,
                    "Cached file does not match its recorded sha256"
                );
                Ok(false)
            },
            Err(err) => Err(err.into()),
        }
    }

    pub fn state(&self) -> CacheState {
        let on_disk = match std::fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return CacheState::Missing,
        };

        match self.metadata() {
            // Only a rename can create the final path, so no sidecar still means complete
            Ok(None) => CacheState::Complete,
            Ok(Some(meta)) if meta.size == on_disk => CacheState::Complete,
            Ok(Some(meta)) => {
                warn!(
                    path = %self.path.display(),
                    expected = meta.size,
                    actual = on_disk,
                    "Cached file size disagrees with its metadata"
                );
                CacheState::Corrupt
            },
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Unreadable cache metadata");
                CacheState::Corrupt
            },
        }
    }
}

/// What `fetch` would do for a dataset
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub entry: CacheEntry,
    pub state: CacheState,
    pub force_refresh: bool,
}

impl Idempotent for FetchPlan {
    fn already_done(&self) -> bool {
        !self.force_refresh && self.state == CacheState::Complete
    }
}

/// Downloads Kaggle datasets into the local cache
pub struct DatasetFetcher {
    client: reqwest::Client,
    config: KaggleConfig,
    cache_root: PathBuf,
}

impl DatasetFetcher {
    pub fn new(config: KaggleConfig, cache_root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self::with_client(client, config, cache_root))
    }

    pub fn with_client(
        client: reqwest::Client,
        config: KaggleConfig,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            config,
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn cache_entry(&self, dataset: &DatasetId) -> CacheEntry {
        CacheEntry::new(&self.cache_root, dataset)
    }

    pub fn plan(&self, dataset: &DatasetId, force_refresh: bool) -> FetchPlan {
        let entry = self.cache_entry(dataset);
        let mut state = entry.state();

        if state == CacheState::Complete && self.config.verify_checksum && !force_refresh {
            state = match entry.verify() {
                Ok(true) => CacheState::Complete,
                Ok(false) => CacheState::Corrupt,
                Err(err) => {
                    warn!(error = %err, "Cannot verify cached dataset");
                    CacheState::Corrupt
                },
            };
        }
        FetchPlan {
            entry,
            state,
            force_refresh,
        }
    }

    pub fn download_url(&self, dataset: &DatasetId) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            dataset.owner(),
            dataset.name()
        )
    }

    /// Return the cached archive, downloading it first if needed
    #[instrument(skip(self, progress, cancel), fields(dataset = %dataset))]
    pub async fn fetch(
        &self,
        dataset: &DatasetId,
        force_refresh: bool,
        progress: &ProgressBar,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let plan = self.plan(dataset, force_refresh);

        if plan.already_done() {
            info!(path = %plan.entry.path().display(), "Dataset already cached");
            return Ok(plan.entry.path().to_path_buf());
        }

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled { stage: "download" });
        }

        match plan.state {
            CacheState::Complete => info!("Refreshing cached dataset"),
            CacheState::Corrupt => info!("Cached dataset is corrupt; downloading again"),
            CacheState::Missing => {},
        }

        let entry = plan.entry;
        if let Some(parent) = entry.path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = self.download_url(dataset);
        let (size, sha256) = self.download_with_retry(&url, &entry, progress, cancel).await?;

        tokio::fs::rename(entry.partial_path(), entry.path()).await?;

        let metadata = CacheMetadata {
            dataset: dataset.clone(),
            url,
            size,
            sha256,
            fetched_at: Utc::now(),
        };
        tokio::fs::write(entry.metadata_path(), serde_json::to_vec_pretty(&metadata)?).await?;

        info!(
            path = %entry.path().display(),
            size,
            sha256 = %metadata.sha256,
            "Dataset downloaded"
        );
        Ok(entry.path().to_path_buf())
    }

    async fn download_with_retry(
        &self,
        url: &str,
        entry: &CacheEntry,
        progress: &ProgressBar,
        cancel: &CancellationToken,
    ) -> Result<(u64, String)> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.download_once(url, entry, progress, cancel).await {
                Ok(done) => return Ok(done),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = Duration::from_millis(
                        self.config
                            .retry_base_delay_ms
                            .saturating_mul(2u64.saturating_pow(attempt - 1)),
                    );
                    warn!(
                        "Download attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, err, delay
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(IngestError::Cancelled { stage: "download" });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    progress.set_position(0);
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn download_once(
        &self,
        url: &str,
        entry: &CacheEntry,
        progress: &ProgressBar,
        cancel: &CancellationToken,
    ) -> Result<(u64, String)> {
        let mut request = self.client.get(url);
        if let (Some(username), Some(key)) = (&self.config.username, &self.config.key) {
            request = request.basic_auth(username, Some(key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::remote_fetch(url, None, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::authentication(
                "Kaggle",
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::remote_fetch(url, Some(status.as_u16()), body.trim()));
        }

        let expected = response.content_length();
        match expected {
            Some(len) => progress.set_length(len),
            None => warn!(url, "Response has no Content-Length; size cannot be verified"),
        }

        let partial = entry.partial_path();
        debug!(path = %partial.display(), "Writing download");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut hasher = StreamingSha256::new();
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    file.flush().await?;
                    return Err(IngestError::Cancelled { stage: "download" });
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                IngestError::remote_fetch(url, None, format!("body interrupted: {}", e))
            })?;

            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            progress.set_position(hasher.bytes());
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let size = hasher.bytes();
        if let Some(expected) = expected {
            if size != expected {
                return Err(IngestError::remote_fetch(
                    url,
                    None,
                    format!("truncated body: received {} of {} bytes", size, expected),
                ));
            }
        }

        Ok((size, hasher.finalize()))
    }
}
