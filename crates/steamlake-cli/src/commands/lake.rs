//! `steamlake lake` commands

use super::{ensure_complete, print_buckets, print_sync_report, Context};
use crate::error::{CliError, Result};
use colored::Colorize;
use std::path::Path;
use steamlake_ingest::mirror::MirrorReport;
use steamlake_ingest::upload::files_with_extension;
use tokio_util::sync::CancellationToken;

pub async fn setup(ctx: &Context) -> Result<()> {
    let buckets = ctx.pipeline().setup_lake().await?;
    print_buckets(&buckets);
    Ok(())
}

/// Upload the folder's CSVs that the bucket does not have yet, then mirror
/// the selected games locally
pub async fn upload(
    ctx: &Context,
    folder: &Path,
    prefix: Option<String>,
    concurrency: Option<usize>,
    cancel: &CancellationToken,
) -> Result<()> {
    if !folder.is_dir() {
        return Err(CliError::FileNotFound(folder.display().to_string()));
    }
    let concurrency = concurrency.unwrap_or(ctx.config.upload_concurrency);
    if concurrency == 0 {
        return Err(CliError::config("--concurrency must be greater than 0"));
    }
    let prefix = prefix.unwrap_or_else(|| ctx.config.buckets.reviews_prefix.clone());

    let files = files_with_extension(folder, "csv")?;
    println!(
        "{} {} CSV file(s) in {}",
        "→".cyan(),
        files.len(),
        folder.display()
    );

    let pipeline = ctx.pipeline();
    let report = pipeline.upload(&files, &prefix, concurrency, cancel).await?;
    print_sync_report(&prefix, &report);

    let mirror = pipeline.mirror(&report)?;
    print_mirror(&mirror);

    ensure_complete(&[&report])
}

pub(crate) fn print_mirror(report: &MirrorReport) {
    for path in &report.copied {
        println!("{} Copied {}", "✓".green(), path.display());
    }
    if report.copied.is_empty() && !report.already_present.is_empty() {
        println!(
            "{} {} mirrored file(s) up to date",
            "✓".green(),
            report.already_present.len()
        );
    }
}
