//! SteamLake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the SteamLake workspace.
//!
//! # Overview
//!
//! - **Logging**: one place to configure `tracing` for every binary
//! - **Checksums**: streaming SHA-256 of cached downloads
//! - **Errors**: the small error type those helpers return
//!
//! # Example
//!
//! ```no_run
//! use steamlake_common::checksum::sha256_file;
//!
//! fn main() -> steamlake_common::Result<()> {
//!     let digest = sha256_file("data/archive.zip")?;
//!     println!("sha256: {}", digest);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
