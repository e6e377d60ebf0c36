//! Steam application list, fetched once and kept as JSON

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamApp {
    pub appid: u64,
    pub name: String,
}

#[derive(Deserialize)]
struct AppListResponse {
    applist: AppList,
}

#[derive(Deserialize)]
struct AppList {
    apps: Vec<SteamApp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppListOutcome {
    Skipped { output: PathBuf },
    Fetched { output: PathBuf, apps: usize },
}

/// Write the `applist.apps` array from `url` to `output` unless it already exists
#[instrument(skip(client))]
pub async fn fetch_app_ids(client: &reqwest::Client, url: &str, output: &Path) -> Result<AppListOutcome> {
    if output.exists() {
        info!("App list already present");
        return Ok(AppListOutcome::Skipped {
            output: output.to_path_buf(),
        });
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| IngestError::remote_fetch(url, None, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IngestError::remote_fetch(url, Some(status.as_u16()), body.trim()));
    }

    let body: AppListResponse = response
        .json()
        .await
        .map_err(|e| IngestError::remote_fetch(url, Some(status.as_u16()), format!("unexpected body: {}", e)))?;
    let apps = body.applist.apps;

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Readers only ever see a complete file at `output`
    let partial = partial_path(output);
    if let Err(err) = tokio::fs::write(&partial, serde_json::to_vec(&apps)?).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err.into());
    }
    tokio::fs::rename(&partial, output).await?;

    info!(apps = apps.len(), "App list written to {}", output.display());
    Ok(AppListOutcome::Fetched {
        output: output.to_path_buf(),
        apps: apps.len(),
    })
}

fn partial_path(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}
