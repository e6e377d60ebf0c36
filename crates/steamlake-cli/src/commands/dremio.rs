//! `steamlake dremio setup`

use super::Context;
use crate::error::{CliError, Result};
use colored::Colorize;
use steamlake_ingest::catalog::{DremioClient, SourceDefinition, SourceStatus};

/// Log in and register the Nessie and object store sources
pub async fn setup(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    println!("{} Logging in to Dremio at {}...", "→".cyan(), config.dremio.base_url);

    let mut client = DremioClient::new(&config.dremio)?;
    client
        .login(&config.dremio.username, &config.dremio.password)
        .await?;

    let sources = SourceDefinition::defaults(&config.dremio, &config.storage, &config.buckets);
    let outcomes = client.register_all(&sources).await;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(SourceStatus::Created) => {
                println!("{} Created source {}", "✓".green(), outcome.name.bold())
            },
            Ok(SourceStatus::AlreadyExists) => {
                println!("{} Source {} (exists)", "✓".green(), outcome.name.bold())
            },
            Err(err) => {
                failed += 1;
                println!("{} {}", "✗".red(), err);
            },
        }
    }

    if failed > 0 {
        return Err(CliError::CatalogSetup { failed });
    }
    Ok(())
}
