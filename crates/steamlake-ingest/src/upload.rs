//! Differential upload of local files to the object store
//!
//! The remote prefix is listed once. A local file whose stem (file name
//! without extension) matches an object directly under the prefix is
//! skipped; every other file becomes a [`SyncTask`]. Tasks run with bounded
//! concurrency and a failing upload never stops the others.
//!
//! The listing is a snapshot. Objects written by someone else after it was
//! taken are not seen, so two concurrent syncs can upload the same file twice.

use crate::error::{IngestError, Result};
use crate::idempotence::Idempotent;
use crate::storage::{content_type_for, key_stem, object_key, ObjectStore};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Stems of the objects under a bucket prefix at listing time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObjectSet {
    stems: HashSet<String>,
}

impl RemoteObjectSet {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stems: keys
                .into_iter()
                .filter_map(|key| key_stem(key.as_ref()).map(str::to_string))
                .collect(),
        }
    }

    /// Stems of the keys directly under `prefix`
    ///
    /// Keys in sibling prefixes (`extract/reviews_2023/..`) or nested below
    /// it (`extract/reviews/old/..`) are not objects of this prefix.
    pub fn from_listing<I, S>(prefix: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dir = directory_prefix(prefix);
        Self::from_keys(keys.into_iter().filter(|key| {
            let key: &str = key.as_ref();
            key.strip_prefix(dir.as_str())
                .is_some_and(|name| !name.is_empty() && !name.contains('/'))
        }))
    }

    pub async fn list(store: &dyn ObjectStore, bucket: &str, prefix: &str) -> Result<Self> {
        let keys = store.list_keys(bucket, &directory_prefix(prefix)).await?;
        Ok(Self::from_listing(prefix, keys))
    }

    pub fn contains(&self, stem: &str) -> bool {
        self.stems.contains(stem)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// `extract/reviews` -> `extract/reviews/`; the bucket root stays empty
fn directory_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    }
}

fn local_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// One local file bound for one remote key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub local_path: PathBuf,
    pub key: String,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub tasks: Vec<SyncTask>,
    /// Already present remotely
    pub skipped: Vec<PathBuf>,
}

impl SyncPlan {
    pub fn build(files: &[PathBuf], remote: &RemoteObjectSet, prefix: &str) -> Self {
        let mut plan = Self::default();

        for path in files {
            let (Some(stem), Some(name)) = (local_stem(path), path.file_name().and_then(|n| n.to_str()))
            else {
                warn!(path = %path.display(), "Skipping file without a usable name");
                continue;
            };

            if remote.contains(stem) {
                plan.skipped.push(path.clone());
            } else {
                plan.tasks.push(SyncTask {
                    local_path: path.clone(),
                    key: object_key(prefix, name),
                    content_type: content_type_for(path),
                });
            }
        }

        plan
    }
}

impl Idempotent for SyncPlan {
    fn already_done(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub key: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub path: PathBuf,
    pub key: String,
    pub message: String,
}

/// Per-file outcome of one sync run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub uploaded: Vec<UploadedFile>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedUpload>,
    /// Never submitted because the run was cancelled
    pub not_started: Vec<PathBuf>,
}

impl SyncReport {
    pub fn uploaded_count(&self) -> usize {
        self.uploaded.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded.iter().map(|u| u.bytes).sum()
    }

    /// Nothing failed and nothing was left out
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_started.is_empty()
    }

    /// Files now known to be in the bucket: uploaded or already there
    pub fn synced_files(&self) -> impl Iterator<Item = &Path> + '_ {
        self.uploaded
            .iter()
            .map(|u| u.path.as_path())
            .chain(self.skipped.iter().map(PathBuf::as_path))
    }
}

enum TaskOutcome {
    Uploaded(UploadedFile),
    Failed(FailedUpload),
    NotStarted(PathBuf),
}

/// Upload every file in `files` whose stem is not yet under `bucket/prefix`
///
/// Listing failures abort the stage. Upload failures are recorded in the
/// report. After `cancel` fires no new upload starts; those already running
/// finish.
#[instrument(skip(store, files, progress, cancel), fields(files = files.len()))]
pub async fn sync_upload(
    store: &dyn ObjectStore,
    files: &[PathBuf],
    bucket: &str,
    prefix: &str,
    concurrency: usize,
    progress: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<SyncReport> {
    let start = Instant::now();

    let remote = RemoteObjectSet::list(store, bucket, prefix).await?;
    debug!(remote = remote.len(), "Remote snapshot taken");

    let plan = SyncPlan::build(files, &remote, prefix);
    progress.set_length(files.len() as u64);
    progress.inc(plan.skipped.len() as u64);

    let mut report = SyncReport {
        skipped: plan.skipped.clone(),
        ..SyncReport::default()
    };

    if plan.already_done() {
        info!(skipped = report.skipped_count(), "All files already in s3://{}/{}", bucket, prefix);
        return Ok(report);
    }

    let concurrency = concurrency.max(1);
    info!(
        "Uploading {} files to s3://{}/{} (concurrency={})",
        plan.tasks.len(),
        bucket,
        prefix,
        concurrency
    );

    let outcomes: Vec<TaskOutcome> = stream::iter(plan.tasks)
        .map(|task| async move {
            if cancel.is_cancelled() {
                return TaskOutcome::NotStarted(task.local_path);
            }

            let result = store
                .put_file(bucket, &task.key, &task.local_path, Some(task.content_type))
                .await;
            progress.inc(1);

            match result {
                Ok(bytes) => {
                    debug!(key = %task.key, bytes, "Uploaded");
                    TaskOutcome::Uploaded(UploadedFile {
                        path: task.local_path,
                        key: task.key,
                        bytes,
                    })
                },
                Err(err) => {
                    warn!(path = %task.local_path.display(), error = %err, "Upload failed");
                    TaskOutcome::Failed(FailedUpload {
                        path: task.local_path,
                        key: task.key,
                        message: err.to_string(),
                    })
                },
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            TaskOutcome::Uploaded(file) => report.uploaded.push(file),
            TaskOutcome::Failed(failed) => report.failed.push(failed),
            TaskOutcome::NotStarted(path) => report.not_started.push(path),
        }
    }

    info!(
        uploaded = report.uploaded_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        not_started = report.not_started.len(),
        "Sync finished in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    Ok(report)
}

/// Files directly inside `dir` with the given extension, sorted by name
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::config(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remote_set_uses_stems() {
        let remote = RemoteObjectSet::from_keys([
            "extract/reviews/10.csv",
            "extract/reviews/730.csv",
            "extract/reviews/",
        ]);
        assert_eq!(remote.len(), 2);
        assert!(remote.contains("10"));
        assert!(remote.contains("730"));
        assert!(!remote.contains("578080"));
    }

    #[test]
    fn test_listing_keeps_only_direct_children() {
        let keys = [
            "extract/reviews/10.csv",
            "extract/reviews_2023/730.csv",
            "extract/reviews/nested/578080.csv",
            "extract/reviews/",
        ];
        let remote = RemoteObjectSet::from_listing("extract/reviews/", keys);
        assert_eq!(remote.len(), 1);
        assert!(remote.contains("10"));

        let root = RemoteObjectSet::from_listing("", ["10.csv", "extract/730.csv"]);
        assert!(root.contains("10"));
        assert!(!root.contains("730"));
    }

    #[test]
    fn test_plan_skips_remote_stems() {
        let remote = RemoteObjectSet::from_keys(["extract/reviews/10.csv", "extract/reviews/730.csv"]);
        let files: Vec<PathBuf> = ["10", "730", "289070", "578080"]
            .iter()
            .map(|id| PathBuf::from(format!("data/SteamReviews2024/{}.csv", id)))
            .collect();

        let plan = SyncPlan::build(&files, &remote, "extract/reviews");

        assert!(!plan.already_done());
        assert_eq!(plan.skipped.len(), 2);
        let keys: Vec<&str> = plan.tasks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["extract/reviews/289070.csv", "extract/reviews/578080.csv"]);
        assert!(plan.tasks.iter().all(|t| t.content_type == "text/csv"));
    }

    #[test]
    fn test_stem_match_ignores_extension() {
        // The parquet object satisfies a local CSV of the same stem
        let remote = RemoteObjectSet::from_keys(["extract/10.parquet"]);
        let plan = SyncPlan::build(&[PathBuf::from("10.csv")], &remote, "extract");
        assert!(plan.already_done());
    }

    #[test]
    fn test_files_with_extension() {
        let dir = TempDir::new().unwrap();
        for name in ["b.csv", "a.csv", "c.CSV", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let files = files_with_extension(dir.path(), "csv").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.CSV"]);

        assert!(files_with_extension(&dir.path().join("missing"), "csv").is_err());
    }
}
