//! Error taxonomy for the ingestion stages
//!
//! Stage-level failures abort that stage and are surfaced to the caller.
//! Per-file upload failures are not represented here; they are collected in
//! [`crate::upload::SyncReport`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Non-2xx response or network failure while downloading
    #[error("Download from {url} failed{}: {body}", status_label(.status))]
    RemoteFetch {
        url: String,
        status: Option<u16>,
        body: String,
    },

    /// Credentials rejected by an external API
    #[error("Authentication against {service} failed: {message}")]
    Authentication { service: String, message: String },

    /// Corrupt, unreadable or unsupported archive
    #[error("Archive {} could not be extracted: {message}", .path.display())]
    Archive { path: PathBuf, message: String },

    /// Object store operation failed
    #[error("Object store {operation} failed: {message}")]
    Storage { operation: String, message: String },

    /// Catalog API rejected a source definition
    #[error("Catalog source '{source_name}' could not be registered: {message}")]
    CatalogRegistration {
        source_name: String,
        message: String,
    },

    /// CSV to Parquet conversion failed
    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Invalid dataset identifier '{0}': expected '<owner>/<dataset>'")]
    InvalidDatasetId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{stage} cancelled")]
    Cancelled { stage: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" with HTTP {}", code))
        .unwrap_or_default()
}

impl IngestError {
    pub fn remote_fetch(url: impl Into<String>, status: Option<u16>, body: impl Into<String>) -> Self {
        Self::RemoteFetch {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn authentication(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn catalog(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CatalogRegistration {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn transform(message: impl std::fmt::Display) -> Self {
        Self::Transform(message.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether retrying the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::RemoteFetch { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500 || *code == 429,
            },
            IngestError::Http(err) => err.is_timeout() || err.is_connect() || err.is_body(),
            _ => false,
        }
    }
}

impl From<arrow_schema::ArrowError> for IngestError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        IngestError::Transform(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for IngestError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        IngestError::Transform(err.to_string())
    }
}

impl From<steamlake_common::CommonError> for IngestError {
    fn from(err: steamlake_common::CommonError) -> Self {
        match err {
            steamlake_common::CommonError::Io(io) => IngestError::Io(io),
            other => IngestError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_fetch_message_includes_status_and_body() {
        let err = IngestError::remote_fetch("https://example.com/x", Some(404), "not found");
        assert_eq!(
            err.to_string(),
            "Download from https://example.com/x failed with HTTP 404: not found"
        );

        let err = IngestError::remote_fetch("https://example.com/x", None, "connection reset");
        assert_eq!(
            err.to_string(),
            "Download from https://example.com/x failed: connection reset"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(IngestError::remote_fetch("u", Some(503), "").is_transient());
        assert!(IngestError::remote_fetch("u", Some(429), "").is_transient());
        assert!(IngestError::remote_fetch("u", None, "truncated").is_transient());
        assert!(!IngestError::remote_fetch("u", Some(404), "").is_transient());
        assert!(!IngestError::authentication("kaggle", "bad key").is_transient());
        assert!(!IngestError::transform("boom").is_transient());
    }
}
