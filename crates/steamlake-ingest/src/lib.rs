//! SteamLake ingestion library
//!
//! Idempotent stages that move the Steam reviews dataset from Kaggle into a
//! MinIO-backed lakehouse:
//!
//! 1. [`fetch`]: download the archive into a local cache, once
//! 2. [`extract`]: unpack it into the data directory, once
//! 3. [`upload`]: push CSVs whose stem is not in the bucket yet
//! 4. [`mirror`]: copy selected games next to the notebooks
//! 5. [`transform`]: fold all CSVs into one Parquet file, once
//!
//! plus bucket setup ([`storage::ensure_buckets`]), Dremio source
//! registration ([`catalog`]) and the Steam app list ([`steam`]).
//!
//! Every stage builds a plan first and asks it
//! [`Idempotent::already_done`] before touching anything.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod idempotence;
pub mod mirror;
pub mod pipeline;
pub mod progress;
pub mod steam;
pub mod storage;
pub mod transform;
pub mod upload;

pub use config::PipelineConfig;
pub use error::{IngestError, Result};
pub use idempotence::Idempotent;
pub use pipeline::{IngestPipeline, PipelineReport};
