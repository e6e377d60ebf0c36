//! `steamlake run`

use super::data::{print_conversion, print_extraction};
use super::lake::print_mirror;
use super::{ensure_complete, print_buckets, print_sync_report, Context};
use crate::error::Result;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

/// Every ingestion stage in order; finished stages are skipped
pub async fn run(ctx: &Context, force: bool, cancel: &CancellationToken) -> Result<()> {
    println!("{} Ingesting {}...", "→".cyan(), ctx.config.dataset);

    let report = ctx.pipeline().run(force, cancel).await?;

    println!("{} Archive at {}", "✓".green(), report.archive.display());
    print_extraction(&report.extraction);
    print_buckets(&report.buckets);
    print_sync_report("Reviews", &report.reviews);
    print_mirror(&report.mirror);
    print_conversion(&report.conversion);
    print_sync_report("Parquet", &report.parquet);

    ensure_complete(&[&report.reviews, &report.parquet])?;
    println!("{} Done", "✓".green().bold());
    Ok(())
}
