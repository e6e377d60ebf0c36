//! Error types for the SteamLake CLI
//!
//! Wraps library errors with a suggestion of what to do next.

use steamlake_ingest::IngestError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// A pipeline stage failed
    #[error("{0}. {hint}", hint = hint(.0))]
    Ingest(#[from] IngestError),

    /// Some files were not uploaded; the rest are in the bucket
    #[error("{failed} of {total} file(s) were not uploaded. Re-run the same command to upload only the missing files.")]
    PartialUpload { failed: usize, total: usize },

    /// Some catalog sources could not be registered
    #[error("{failed} catalog source(s) could not be registered. Check the Dremio logs and re-run 'steamlake dremio setup'.")]
    CatalogSetup { failed: usize },

    #[error("File not found: '{0}'. Verify the path exists and you have read permissions.")]
    FileNotFound(String),

    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    #[error("Network request failed: {0}. Check your internet connection.")]
    Http(#[from] reqwest::Error),
}

fn hint(err: &IngestError) -> &'static str {
    match err {
        IngestError::RemoteFetch { status: Some(404), .. } => {
            "Check the dataset identifier (STEAMLAKE_DATASET)"
        },
        IngestError::RemoteFetch { .. } => "Check your connection and re-run; the cache is left untouched",
        IngestError::Authentication { .. } => {
            "Check KAGGLE_USERNAME/KAGGLE_KEY or DREMIO_USERNAME/DREMIO_PASSWORD"
        },
        IngestError::Archive { .. } => "Re-run with --force to download a fresh copy",
        IngestError::Storage { .. } => {
            "Ensure MinIO is running (S3_ENDPOINT) and run 'steamlake lake setup'"
        },
        IngestError::CatalogRegistration { .. } => "Ensure Dremio is running (DREMIO_URL)",
        IngestError::Transform(_) => "Check that the input folder holds review CSVs",
        IngestError::InvalidDatasetId(_) => "Set STEAMLAKE_DATASET to '<owner>/<dataset>'",
        IngestError::Config(_) => "Check your environment variables or .env file",
        IngestError::Cancelled { .. } => "Re-run the same command to resume",
        IngestError::Io(_) => "Check file permissions and disk space",
        IngestError::Json(_) | IngestError::Http(_) => "Re-run the command; transient failures are retried",
    }
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// 130 for an interrupted run, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Ingest(IngestError::Cancelled { .. }) => 130,
            _ => 1,
        }
    }
}
