///
/// This module implements the CLI interface for notion-sync: command parsing,
/// argument validation and the async entrypoint shared by `main` and the tests.
///
/// All export logic (Notion reading, Markdown translation, GitHub writes) lives in the
/// [`notion-sync-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - `notion-sync sync --config notion-sync.yaml` runs one export and prints the summary.
/// - `notion-sync sync --config notion-sync.yaml --dry-run` lists the files that would be written.
/// - `notion-sync serve --config notion-sync.yaml` exposes the HTTP trigger.
///
/// [`notion-sync-core`]: ../../notion-sync-core/
use crate::load_config::load_config;
use crate::server;
use anyhow::Result;
use clap::{Parser, Subcommand};
use notion_sync_core::synchronise::Synchroniser;
use std::path::PathBuf;

/// CLI for notion-sync: export Notion pages as Markdown into a GitHub repository.
#[derive(Parser)]
#[clap(
    name = "notion-sync",
    version,
    about = "Export a Notion page or database tree as Markdown files into a GitHub repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one export cycle now
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only list the files that would be written
        #[clap(long)]
        dry_run: bool,
    },
    /// Serve the HTTP sync trigger
    Serve {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Port to listen on (overrides `server.port` from the config file)
        #[clap(long)]
        port: Option<u16>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, dry_run } => {
            let config = load_config(config)?;
            let synchroniser = Synchroniser::from_config(&config.sync)?;

            if dry_run {
                tracing::info!(command = "sync", "Dry run: reading Notion only");
                let documents = synchroniser.preview().await?;
                for document in &documents {
                    println!("{} ({} bytes)", document.path, document.markdown.len());
                }
                println!("Would sync {} file(s)", documents.len());
                return Ok(());
            }

            tracing::info!(command = "sync", "Starting synchronisation process");
            match synchroniser.sync().await {
                Ok(report) => {
                    tracing::info!(command = "sync", written = report.written.len(), "Synchronisation complete");
                    for failure in &report.failed {
                        eprintln!("[WARN] {failure}");
                    }
                    println!("{}", report.summary());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Serve { config, port } => {
            let config = load_config(config)?;
            let synchroniser = Synchroniser::from_config(&config.sync)?;
            server::serve(synchroniser, port.unwrap_or(config.port)).await
        }
    }
}
