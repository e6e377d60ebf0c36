//! Work that runs after a sync, driven by its report
//!
//! Copying selected games next to the notebooks used to be a side effect of
//! the upload command. It is an explicit hook here so the upload stage stays
//! about uploads, and callers decide whether a mirror runs at all.

use crate::error::Result;
use crate::upload::SyncReport;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub trait PostSyncHook {
    type Output;

    fn after_sync(&self, report: &SyncReport) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub copied: Vec<PathBuf>,
    pub already_present: Vec<PathBuf>,
}

/// Copies synced files into a local directory
///
/// Failed and not-started files are never mirrored.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    target_dir: PathBuf,
    only_stems: Option<HashSet<String>>,
}

impl LocalMirror {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            only_stems: None,
        }
    }

    /// Restrict mirroring to files whose stem is listed
    pub fn only<I, S>(mut self, stems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_stems = Some(stems.into_iter().map(Into::into).collect());
        self
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    fn wanted(&self, path: &Path) -> bool {
        match (&self.only_stems, path.file_stem().and_then(|s| s.to_str())) {
            (None, Some(_)) => true,
            (Some(stems), Some(stem)) => stems.contains(stem),
            (_, None) => false,
        }
    }
}

impl PostSyncHook for LocalMirror {
    type Output = MirrorReport;

    #[instrument(skip(self, report), fields(target = %self.target_dir.display()))]
    fn after_sync(&self, report: &SyncReport) -> Result<MirrorReport> {
        let mut mirror = MirrorReport::default();

        for source in report.synced_files().filter(|p| self.wanted(p)) {
            let Some(name) = source.file_name() else {
                continue;
            };
            let destination = self.target_dir.join(name);

            if destination.exists() {
                mirror.already_present.push(destination);
                continue;
            }

            std::fs::create_dir_all(&self.target_dir)?;
            std::fs::copy(source, &destination)?;
            debug!("Copied {} -> {}", source.display(), destination.display());
            mirror.copied.push(destination);
        }

        info!(
            copied = mirror.copied.len(),
            already_present = mirror.already_present.len(),
            "Mirror updated"
        );
        Ok(mirror)
    }
}
