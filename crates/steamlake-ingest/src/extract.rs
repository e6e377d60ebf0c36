//! Guarded archive extraction
//!
//! The top-level directory of the first archive member is the marker: if it
//! already exists under the target directory the whole archive is assumed to
//! be extracted. A half-finished extraction is therefore not repaired; delete
//! the marker directory to force a clean run. A plain file with the marker's
//! name does not count, and archives whose first member sits at the root
//! have no marker directory, so they are extracted on every run.
//!
//! # Supported Formats
//!
//! - **Zip** (.zip): what Kaggle serves
//! - **Tar.gz** (.tar.gz, .tgz)
//! - **Tar** (.tar)

use crate::error::{IngestError, Result};
use crate::idempotence::Idempotent;
use flate2::read::GzDecoder;
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Skipped { marker: PathBuf },
    Extracted { marker: PathBuf, members: usize },
}

impl ExtractOutcome {
    pub fn marker(&self) -> &Path {
        match self {
            ExtractOutcome::Skipped { marker } | ExtractOutcome::Extracted { marker, .. } => marker,
        }
    }
}

/// Inspection of an archive against a target directory
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    /// Resolved under the target directory
    pub marker: PathBuf,
    /// Known up front for zip only
    pub member_count: Option<usize>,
}

impl Idempotent for ExtractionPlan {
    fn already_done(&self) -> bool {
        self.marker.is_dir()
    }
}

/// First normal component of a member path
///
/// Leading `./` is ignored; absolute paths and `..` are rejected.
fn top_level_segment(member: &Path) -> Option<PathBuf> {
    for component in member.components() {
        match component {
            Component::CurDir => continue,
            Component::Normal(segment) => return Some(PathBuf::from(segment)),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    None
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| IngestError::archive(path, format!("cannot open: {}", e)))
}

fn open_zip(path: &Path) -> Result<zip::ZipArchive<BufReader<File>>> {
    zip::ZipArchive::new(BufReader::new(open(path)?)).map_err(|e| IngestError::archive(path, e))
}

fn open_tar(path: &Path, format: ArchiveFormat) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = BufReader::new(open(path)?);
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

impl ExtractionPlan {
    /// Read the first member of `archive` without extracting anything
    pub fn inspect(archive: &Path, target_dir: &Path) -> Result<Self> {
        let format = ArchiveFormat::from_path(archive)
            .ok_or_else(|| IngestError::archive(archive, "unsupported archive format"))?;

        let (first, member_count) = match format {
            ArchiveFormat::Zip => {
                let mut zip = open_zip(archive)?;
                let count = zip.len();
                if count == 0 {
                    return Err(IngestError::archive(archive, "archive is empty"));
                }
                let member = zip.by_index_raw(0).map_err(|e| IngestError::archive(archive, e))?;
                let name = member.enclosed_name().ok_or_else(|| {
                    IngestError::archive(archive, format!("unsafe member path '{}'", member.name()))
                })?;
                (name, Some(count))
            },
            ArchiveFormat::TarGz | ArchiveFormat::Tar => {
                let mut tar = open_tar(archive, format)?;
                let mut entries = tar.entries().map_err(|e| IngestError::archive(archive, e))?;
                let entry = entries
                    .next()
                    .ok_or_else(|| IngestError::archive(archive, "archive is empty"))?
                    .map_err(|e| IngestError::archive(archive, e))?;
                let path = entry
                    .path()
                    .map_err(|e| IngestError::archive(archive, e))?
                    .into_owned();
                (path, None)
            },
        };

        let segment = top_level_segment(&first).ok_or_else(|| {
            IngestError::archive(archive, format!("unsafe member path '{}'", first.display()))
        })?;

        Ok(Self {
            archive: archive.to_path_buf(),
            format,
            marker: target_dir.join(segment),
            member_count,
        })
    }
}

/// Extract `archive` into `target_dir` unless its marker is already there
#[instrument(skip(progress), fields(archive = %archive.display(), target = %target_dir.display()))]
pub fn extract(archive: &Path, target_dir: &Path, progress: &ProgressBar) -> Result<ExtractOutcome> {
    let plan = ExtractionPlan::inspect(archive, target_dir)?;

    if plan.already_done() {
        info!(marker = %plan.marker.display(), "Archive already extracted");
        return Ok(ExtractOutcome::Skipped {
            marker: plan.marker,
        });
    }

    std::fs::create_dir_all(target_dir)?;
    if let Some(count) = plan.member_count {
        progress.set_length(count as u64);
    }

    let members = match plan.format {
        ArchiveFormat::Zip => extract_zip(archive, target_dir, progress)?,
        ArchiveFormat::TarGz | ArchiveFormat::Tar => {
            extract_tar(archive, plan.format, target_dir, progress)?
        },
    };

    info!(members, marker = %plan.marker.display(), "Archive extracted");
    Ok(ExtractOutcome::Extracted {
        marker: plan.marker,
        members,
    })
}

fn extract_zip(archive: &Path, target_dir: &Path, progress: &ProgressBar) -> Result<usize> {
    let mut zip = open_zip(archive)?;

    for i in 0..zip.len() {
        let mut member = zip
            .by_index(i)
            .map_err(|e| IngestError::archive(archive, format!("member {}: {}", i, e)))?;

        let relative = member.enclosed_name().ok_or_else(|| {
            IngestError::archive(archive, format!("member '{}' escapes the target directory", member.name()))
        })?;
        let out = target_dir.join(relative);

        if member.is_dir() {
            std::fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&out)?;
            std::io::copy(&mut member, &mut file)
                .map_err(|e| IngestError::archive(archive, format!("{}: {}", member.name(), e)))?;
            debug!("Extracted {} ({} bytes)", out.display(), member.size());
        }

        progress.inc(1);
    }

    Ok(zip.len())
}

fn extract_tar(
    archive: &Path,
    format: ArchiveFormat,
    target_dir: &Path,
    progress: &ProgressBar,
) -> Result<usize> {
    let mut tar = open_tar(archive, format)?;
    let mut members = 0;

    for entry in tar.entries().map_err(|e| IngestError::archive(archive, e))? {
        let mut entry = entry.map_err(|e| IngestError::archive(archive, e))?;
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|e| IngestError::archive(archive, format!("{}: {}", name, e)))?;
        if !unpacked {
            return Err(IngestError::archive(
                archive,
                format!("member '{}' escapes the target directory", name),
            ));
        }

        members += 1;
        progress.inc(1);
    }

    if members == 0 {
        return Err(IngestError::archive(archive, "archive is empty"));
    }
    Ok(members)
}
