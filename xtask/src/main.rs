//! Build automation tasks for SteamLake
//!
//! Currently generates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for SteamLake", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference as markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<steamlake_cli::Cli>();

    let content = format!(
        r#"# SteamLake CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Start MinIO, Nessie and Dremio, then:
steamlake lake setup
steamlake run
steamlake dremio setup
```

Every command can be re-run safely. Archives already in the cache are not
downloaded again, files already in the bucket are not uploaded again and an
existing Parquet file is not rebuilt.

## Environment Variables

- `STEAMLAKE_DATASET` - Kaggle dataset (default: `artermiloff/steam-games-reviews-2024`)
- `STEAMLAKE_DATA_DIR`, `STEAMLAKE_CACHE_DIR`, `STEAMLAKE_MIRROR_DIR`, `STEAMLAKE_PARQUET_DIR` - local directories
- `KAGGLE_USERNAME`, `KAGGLE_KEY` - Kaggle API credentials
- `S3_ENDPOINT`, `S3_REGION`, `S3_ACCESS_KEY`, `S3_SECRET_KEY` - object store
- `DREMIO_URL`, `DREMIO_USERNAME`, `DREMIO_PASSWORD` - Dremio REST API
- `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT` - logging (e.g. `debug`, `json`, `both`)

Values are also read from a `.env` file in the working directory.

{}

---

*To update, run `cargo run -p xtask -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
