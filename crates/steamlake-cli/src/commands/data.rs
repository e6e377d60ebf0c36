//! `steamlake data` commands

use super::{ensure_complete, print_buckets, print_sync_report, Context};
use crate::error::{CliError, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use steamlake_ingest::extract::ExtractOutcome;
use steamlake_ingest::steam::{fetch_app_ids, AppListOutcome};
use steamlake_ingest::transform::ConvertOutcome;
use tokio_util::sync::CancellationToken;

/// Download the archive (once) and extract it (once)
pub async fn download(ctx: &Context, force: bool, cancel: &CancellationToken) -> Result<()> {
    println!("{} Fetching {}...", "→".cyan(), ctx.config.dataset);

    let (archive, extraction) = ctx.pipeline().download(force, cancel).await?;
    println!("{} Archive at {}", "✓".green(), archive.display());
    print_extraction(&extraction);

    Ok(())
}

pub(crate) fn print_extraction(outcome: &ExtractOutcome) {
    match outcome {
        ExtractOutcome::Skipped { marker } => {
            println!("{} Already extracted ({})", "✓".green(), marker.display())
        },
        ExtractOutcome::Extracted { marker, members } => println!(
            "{} Extracted {} file(s) into {}",
            "✓".green(),
            members,
            marker.display()
        ),
    }
}

pub(crate) fn print_conversion(outcome: &ConvertOutcome) {
    match outcome {
        ConvertOutcome::Skipped { output } => {
            println!("{} Parquet file exists ({})", "✓".green(), output.display())
        },
        ConvertOutcome::Converted {
            output,
            files,
            rows_written,
            rows_dropped,
        } => {
            println!(
                "{} Wrote {} row(s) from {} file(s) to {}",
                "✓".green(),
                rows_written,
                files,
                output.display()
            );
            if *rows_dropped > 0 {
                println!(
                    "{} Dropped {} row(s) without a primary key",
                    "!".yellow(),
                    rows_dropped
                );
            }
        },
    }
}

/// Convert the CSVs into one Parquet file, then upload it unless told not to
pub async fn convert(
    ctx: &Context,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    skip_upload: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let input = input.unwrap_or_else(|| ctx.config.reviews_dir());
    let output = output.unwrap_or_else(|| ctx.config.parquet_output());

    if !input.is_dir() && !output.exists() {
        return Err(CliError::FileNotFound(input.display().to_string()));
    }

    println!("{} Converting {}...", "→".cyan(), input.display());
    let pipeline = ctx.pipeline();
    let outcome = pipeline.convert(&input, &output).await?;
    print_conversion(&outcome);

    if skip_upload {
        return Ok(());
    }

    print_buckets(&pipeline.setup_lake().await?);
    let report = pipeline.upload_parquet(outcome.output(), cancel).await?;
    print_sync_report("Parquet", &report);
    ensure_complete(&[&report])
}

/// Fetch the Steam application list unless it is already on disk
pub async fn app_ids(ctx: &Context) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(ctx.config.kaggle.timeout_secs))
        .build()?;

    let output = ctx.config.app_ids_output();
    match fetch_app_ids(&client, &ctx.config.steam_app_list_url, &output).await? {
        AppListOutcome::Skipped { output } => {
            println!("{} App list exists ({})", "✓".green(), output.display())
        },
        AppListOutcome::Fetched { output, apps } => println!(
            "{} Saved {} app(s) to {}",
            "✓".green(),
            apps,
            output.display()
        ),
    }

    Ok(())
}
