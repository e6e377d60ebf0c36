//! CLI command implementations
//!
//! Each command group has its own module. Shared setup and report printing
//! live here.

pub mod data;
pub mod dremio;
pub mod lake;
pub mod run;

use crate::error::{CliError, Result};
use colored::Colorize;
use std::sync::Arc;
use steamlake_ingest::progress::{format_bytes, Progress};
use steamlake_ingest::storage::{BucketStatus, S3Store};
use steamlake_ingest::upload::SyncReport;
use steamlake_ingest::{IngestPipeline, PipelineConfig};

/// Loaded configuration plus output preferences
#[derive(Debug, Clone)]
pub struct Context {
    pub config: PipelineConfig,
    pub progress: Progress,
}

impl Context {
    /// Read `.env` and the environment
    pub fn load(show_progress: bool) -> Result<Self> {
        let config = PipelineConfig::load()?;
        Ok(Self::new(config, show_progress))
    }

    pub fn new(config: PipelineConfig, show_progress: bool) -> Self {
        Self {
            config,
            progress: Progress::new(show_progress),
        }
    }

    /// Pipeline backed by the configured S3 endpoint
    pub fn pipeline(&self) -> IngestPipeline {
        let store = Arc::new(S3Store::new(&self.config.storage));
        IngestPipeline::new(self.config.clone(), store, self.progress)
    }
}

pub(crate) fn print_buckets(buckets: &[(String, BucketStatus)]) {
    for (bucket, status) in buckets {
        match status {
            BucketStatus::Created => println!("{} Created bucket {}", "✓".green(), bucket.bold()),
            BucketStatus::Existing => println!("{} Bucket {} (exists)", "✓".green(), bucket.bold()),
        }
    }
}

pub(crate) fn print_sync_report(what: &str, report: &SyncReport) {
    if report.uploaded.is_empty() && report.failed.is_empty() && report.not_started.is_empty() {
        println!(
            "{} {}: all {} file(s) already in the bucket",
            "✓".green(),
            what,
            report.skipped_count()
        );
        return;
    }

    println!(
        "{} {}: {} uploaded ({}), {} already present",
        "↑".cyan(),
        what,
        report.uploaded_count(),
        format_bytes(report.bytes_uploaded()),
        report.skipped_count()
    );
    for failure in &report.failed {
        println!("{} {}: {}", "✗".red(), failure.key, failure.message);
    }
    if !report.not_started.is_empty() {
        println!(
            "{} {} file(s) not started",
            "!".yellow(),
            report.not_started.len()
        );
    }
}

/// Turn an incomplete sync into an error once it has been printed
pub(crate) fn ensure_complete(reports: &[&SyncReport]) -> Result<()> {
    let failed: usize = reports
        .iter()
        .map(|r| r.failed_count() + r.not_started.len())
        .sum();
    if failed == 0 {
        return Ok(());
    }

    let total = reports
        .iter()
        .map(|r| r.uploaded_count() + r.skipped_count() + r.failed_count() + r.not_started.len())
        .sum();
    Err(CliError::PartialUpload { failed, total })
}
