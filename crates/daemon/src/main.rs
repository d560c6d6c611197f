// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! keel broker daemon (keeld)
//!
//! Hosts partition replicas, or restores a broker's data directory from
//! backups.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keel_adapters::{FsBackupStore, TracedBackupStore};
use keel_broker::{lifecycle, server, LifecycleError};
use keel_core::{BrokerConfig, CheckpointId, NodeId};
use keel_engine::RestoreManager;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "keeld", version, about = "keel broker daemon")]
struct Cli {
    /// Broker configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker
    Run,
    /// Restore an empty data directory from backups
    Restore {
        /// Checkpoint whose backups are restored
        #[arg(long)]
        checkpoint_id: u64,
        /// Brokers whose backups are searched, in order (default: all members)
        #[arg(long, value_delimiter = ',')]
        brokers: Vec<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Restore {
            checkpoint_id,
            brokers,
        } => {
            let brokers: Vec<NodeId> = brokers.into_iter().map(NodeId).collect();
            restore(config, CheckpointId(checkpoint_id), &brokers).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BrokerConfig> {
    match path {
        Some(path) => BrokerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(BrokerConfig::default()),
    }
}

async fn run(config: BrokerConfig) -> Result<()> {
    // Write startup marker to log (before tracing setup)
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!(node = %config.node_id, data_dir = %config.data_dir.display(), "Starting keeld");

    let mut broker = match lifecycle::startup(&config).await {
        Ok(b) => b,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("Failed to start broker: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Broker ready, listening on {}", broker.local_addr()?);

    // Signal ready for the parent process
    println!("READY");

    loop {
        tokio::select! {
            result = broker.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let handler = broker.handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(&handler, stream).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            (partition, result) = broker.tasks.next_exit() => {
                let e = match result {
                    Ok(()) => anyhow::anyhow!("partition {} stopped unexpectedly", partition),
                    Err(e) => anyhow::Error::new(e).context(format!("partition {} failed", partition)),
                };
                error!("{:#}", e);
                broker.shutdown().await?;
                return Err(e);
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                broker.shutdown().await?;
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                broker.shutdown().await?;
                break;
            }
        }
    }

    info!("Broker stopped");
    Ok(())
}

/// Restore the data directory; logs go to stderr, not into the data directory
async fn restore(config: BrokerConfig, checkpoint: CheckpointId, brokers: &[NodeId]) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = TracedBackupStore::new(FsBackupStore::new(config.backup.store_dir.clone()));
    let manager = RestoreManager::new(config, store);
    let restored = manager
        .restore(checkpoint, brokers)
        .await
        .with_context(|| format!("restore of checkpoint {} failed", checkpoint))?;

    for partition in restored {
        println!(
            "partition {}: restored backup of broker {} at position {} (index {})",
            partition.partition,
            partition.backup.node,
            partition.checkpoint_position,
            partition.last_index
        );
    }
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- keeld: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- keeld: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &BrokerConfig) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &BrokerConfig, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start broker: {}", error);
}

fn setup_logging(config: &BrokerConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let directory = match config.log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = config
        .log_path
        .file_name()
        .with_context(|| format!("log path {} has no file name", config.log_path.display()))?;
    std::fs::create_dir_all(&directory)?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
