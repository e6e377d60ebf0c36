//! End-to-end ingestion: fetch, extract, upload, mirror, convert
//!
//! Stages run strictly one after another. Each one is individually
//! idempotent, so re-running the pipeline after a failure only redoes what
//! did not finish. Cancellation is honoured between stages and inside the
//! download and upload stages.

use crate::config::PipelineConfig;
use crate::error::{IngestError, Result};
use crate::extract::{extract, ExtractOutcome};
use crate::fetch::DatasetFetcher;
use crate::mirror::{LocalMirror, MirrorReport, PostSyncHook};
use crate::progress::Progress;
use crate::storage::{ensure_buckets, BucketStatus, ObjectStore};
use crate::transform::{convert_to_parquet, ConvertOutcome, TransformOptions};
use crate::upload::{files_with_extension, sync_upload, SyncReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

#[derive(Debug)]
pub struct PipelineReport {
    pub archive: PathBuf,
    pub extraction: ExtractOutcome,
    pub buckets: Vec<(String, BucketStatus)>,
    pub reviews: SyncReport,
    pub mirror: MirrorReport,
    pub conversion: ConvertOutcome,
    pub parquet: SyncReport,
}

impl PipelineReport {
    /// Every file ended up in the bucket
    pub fn is_complete(&self) -> bool {
        self.reviews.is_complete() && self.parquet.is_complete()
    }
}

fn checkpoint(cancel: &CancellationToken, stage: &'static str) -> Result<()> {
    if cancel.is_cancelled() {
        info!("Cancelled before {}", stage);
        return Err(IngestError::Cancelled { stage });
    }
    Ok(())
}

/// Run synchronous stage work on the blocking pool
async fn blocking<T, F>(stage: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(format!("{} task failed: {}", stage, e))))?
}

pub struct IngestPipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    progress: Progress,
    transform: TransformOptions,
}

impl IngestPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>, progress: Progress) -> Self {
        Self {
            config,
            store,
            progress,
            transform: TransformOptions::default(),
        }
    }

    pub fn with_transform_options(mut self, options: TransformOptions) -> Self {
        self.transform = options;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Fetch the dataset archive into the cache and extract it into the data dir
    pub async fn download(
        &self,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, ExtractOutcome)> {
        let dataset = self.config.dataset_id()?;
        let fetcher = DatasetFetcher::new(self.config.kaggle.clone(), &self.config.cache_dir)?;

        let bar = self.progress.download(&format!("Downloading {}", dataset));
        let archive = fetcher.fetch(&dataset, force_refresh, &bar, cancel).await;
        bar.finish_and_clear();
        let archive = archive?;

        checkpoint(cancel, "extract")?;

        let bar = self.progress.count(0, "Extracting archive");
        let extraction = {
            let archive = archive.clone();
            let target = self.config.data_dir.clone();
            let bar = bar.clone();
            blocking("extract", move || extract(&archive, &target, &bar)).await
        };
        bar.finish_and_clear();

        Ok((archive, extraction?))
    }

    pub async fn setup_lake(&self) -> Result<Vec<(String, BucketStatus)>> {
        let buckets = [
            self.config.buckets.datalake.clone(),
            self.config.buckets.warehouse.clone(),
        ];
        ensure_buckets(self.store.as_ref(), &buckets).await
    }

    /// Upload files to the datalake bucket under `prefix`, skipping what is already there
    pub async fn upload(
        &self,
        files: &[PathBuf],
        prefix: &str,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let bar = self.progress.count(files.len() as u64, &format!("Uploading to {}", prefix));
        let report = sync_upload(
            self.store.as_ref(),
            files,
            &self.config.buckets.datalake,
            prefix,
            concurrency,
            &bar,
            cancel,
        )
        .await;
        bar.finish_and_clear();
        report
    }

    /// Upload every CSV in `folder` under the reviews prefix
    pub async fn upload_reviews(
        &self,
        folder: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let files = files_with_extension(folder, "csv")?;
        self.upload(&files, &self.config.buckets.reviews_prefix, concurrency, cancel)
            .await
    }

    /// Copy the configured games next to the notebooks
    pub fn mirror(&self, report: &SyncReport) -> Result<MirrorReport> {
        LocalMirror::new(&self.config.mirror_dir)
            .only(self.config.mirror_game_ids.iter().cloned())
            .after_sync(report)
    }

    pub async fn convert(&self, input_dir: &Path, output: &Path) -> Result<ConvertOutcome> {
        let spinner = self.progress.spinner("Converting CSV files to Parquet");
        let outcome = {
            let input_dir = input_dir.to_path_buf();
            let output = output.to_path_buf();
            let options = self.transform.clone();
            blocking("transform", move || convert_to_parquet(&input_dir, &output, &options)).await
        };
        spinner.finish_and_clear();
        outcome
    }

    pub async fn upload_parquet(&self, output: &Path, cancel: &CancellationToken) -> Result<SyncReport> {
        self.upload(
            &[output.to_path_buf()],
            &self.config.buckets.parquet_prefix,
            1,
            cancel,
        )
        .await
    }

    /// Run every stage in order
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, force_refresh: bool, cancel: &CancellationToken) -> Result<PipelineReport> {
        let (archive, extraction) = self.download(force_refresh, cancel).await?;

        checkpoint(cancel, "lake setup")?;
        let buckets = self.setup_lake().await?;

        checkpoint(cancel, "upload")?;
        let reviews_dir = match extraction.marker() {
            marker if marker.is_dir() => marker.to_path_buf(),
            _ => self.config.data_dir.clone(),
        };
        let reviews = self
            .upload_reviews(&reviews_dir, self.config.upload_concurrency, cancel)
            .await?;

        let mirror = self.mirror(&reviews)?;

        checkpoint(cancel, "transform")?;
        let output = self.config.parquet_output();
        let conversion = self.convert(&reviews_dir, &output).await?;

        checkpoint(cancel, "parquet upload")?;
        let parquet = self.upload_parquet(&output, cancel).await?;

        info!(
            uploaded = reviews.uploaded_count() + parquet.uploaded_count(),
            failed = reviews.failed_count() + parquet.failed_count(),
            "Pipeline finished"
        );

        Ok(PipelineReport {
            archive,
            extraction,
            buckets,
            reviews,
            mirror,
            conversion,
            parquet,
        })
    }
}
