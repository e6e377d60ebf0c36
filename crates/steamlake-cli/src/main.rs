//! SteamLake CLI - Main entry point

use clap::Parser;
use std::process;
use steamlake_cli::commands::{self, Context};
use steamlake_cli::{Cli, Commands, DataCommand, DremioCommand, LakeCommand};
use steamlake_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    // Picks up LOG_* from .env as well
    dotenvy::dotenv().ok();

    // Verbose: debug to console. Otherwise only warnings and errors.
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("steamlake")
        .build();

    // Environment variables take precedence
    let log_config = log_config
        .clone()
        .merge_env(|key| std::env::var(key).ok())
        .unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    if let Err(e) = execute_command(command, !cli.no_progress, &cancel).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

/// Execute the CLI command
async fn execute_command(
    command: Commands,
    show_progress: bool,
    cancel: &CancellationToken,
) -> steamlake_cli::Result<()> {
    let ctx = Context::load(show_progress)?;

    match command {
        Commands::Data { command } => match command {
            DataCommand::Download { force } => commands::data::download(&ctx, force, cancel).await,
            DataCommand::Convert {
                input,
                output,
                skip_upload,
            } => commands::data::convert(&ctx, input, output, skip_upload, cancel).await,
            DataCommand::AppIds => commands::data::app_ids(&ctx).await,
        },

        Commands::Lake { command } => match command {
            LakeCommand::Setup => commands::lake::setup(&ctx).await,
            LakeCommand::Upload {
                folder,
                prefix,
                concurrency,
            } => commands::lake::upload(&ctx, &folder, prefix, concurrency, cancel).await,
        },

        Commands::Dremio { command } => match command {
            DremioCommand::Setup => commands::dremio::setup(&ctx).await,
        },

        Commands::Run { force } => commands::run::run(&ctx, force, cancel).await,
    }
}
