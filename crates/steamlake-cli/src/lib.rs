//! SteamLake CLI Library
//!
//! Command-line interface for the Steam reviews lakehouse pipeline.
//!
//! # Overview
//!
//! - **Dataset**: Download and extract the Kaggle archive (`steamlake data download`)
//! - **Conversion**: Fold the review CSVs into one Parquet file (`steamlake data convert`)
//! - **Lake**: Create buckets and upload folders (`steamlake lake setup/upload`)
//! - **Catalog**: Register Dremio sources (`steamlake dremio setup`)
//! - **Everything**: Run the full ingestion (`steamlake run`)
//!
//! Every command is safe to re-run: work that is already done is skipped.

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SteamLake - Steam reviews into a MinIO/Nessie/Dremio lakehouse
#[derive(Parser, Debug)]
#[command(name = "steamlake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress bars
    #[arg(long, env = "STEAMLAKE_NO_PROGRESS", global = true)]
    pub no_progress: bool,

    /// Print the full command reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Work with the local copy of the dataset
    Data {
        #[command(subcommand)]
        command: DataCommand,
    },

    /// Manage the object store
    Lake {
        #[command(subcommand)]
        command: LakeCommand,
    },

    /// Configure the Dremio query engine
    Dremio {
        #[command(subcommand)]
        command: DremioCommand,
    },

    /// Run the whole ingestion: download, extract, upload, mirror, convert
    Run {
        /// Download the archive again even if it is cached
        #[arg(short, long)]
        force: bool,
    },
}

/// Dataset subcommands
#[derive(Subcommand, Debug)]
pub enum DataCommand {
    /// Download the dataset archive and extract it into the data directory
    Download {
        /// Download again even if the archive is cached
        #[arg(short, long)]
        force: bool,
    },

    /// Convert the review CSVs into a single Parquet file
    Convert {
        /// Directory holding the review CSVs (defaults to the extracted dataset)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Parquet file to write
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not upload the Parquet file to the datalake bucket
        #[arg(long)]
        skip_upload: bool,
    },

    /// Fetch the Steam application list as JSON
    AppIds,
}

/// Object store subcommands
#[derive(Subcommand, Debug)]
pub enum LakeCommand {
    /// Create the datalake and warehouse buckets
    Setup,

    /// Upload the CSV files of a folder, skipping those already in the bucket
    Upload {
        /// Folder to upload
        folder: PathBuf,

        /// Key prefix in the datalake bucket (defaults to the reviews prefix)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Maximum number of uploads in flight
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

/// Dremio subcommands
#[derive(Subcommand, Debug)]
pub enum DremioCommand {
    /// Log in and register the Nessie and object store sources
    Setup,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_lake_upload() {
        let cli = Cli::try_parse_from([
            "steamlake",
            "lake",
            "upload",
            "data/SteamReviews2024",
            "--prefix",
            "extract/reviews",
            "-c",
            "8",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Lake {
                command:
                    LakeCommand::Upload {
                        folder,
                        prefix,
                        concurrency,
                    },
            }) => {
                assert_eq!(folder, PathBuf::from("data/SteamReviews2024"));
                assert_eq!(prefix.as_deref(), Some("extract/reviews"));
                assert_eq!(concurrency, Some(8));
            },
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["steamlake", "run", "--force", "--verbose", "--no-progress"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.no_progress);
        assert!(matches!(cli.command, Some(Commands::Run { force: true })));
    }

    #[test]
    fn test_convert_defaults() {
        let cli = Cli::try_parse_from(["steamlake", "data", "convert"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Data {
                command: DataCommand::Convert {
                    input: None,
                    output: None,
                    skip_upload: false
                }
            })
        ));
    }
}
