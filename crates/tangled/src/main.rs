//! `tangled`: the tangle node daemon.
//!
//! Opens the ledger store, runs the confirmation engine and serves the INX
//! gateway to node extensions.
//!
//! # Usage
//!
//! ```text
//! tangled start                              # start the node
//! tangled start -c tangle.toml               # start with a config file
//! tangled start -d ./node2 -l 127.0.0.1:9030 # second instance
//! tangled start --memory                     # no disk persistence
//! tangled status                             # sync status of a running node
//! tangled milestone 42                       # fetch a confirmed milestone
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tangle_engine::Tangle;
use tangle_inx::{InxClient, InxServer};
use tangle_store::{FjallStore, MemoryStore, TangleStore};
use tangle_types::MilestoneIndex;
use tokio::net::TcpListener;
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "tangled", version, about = "Tangle ledger node daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node.
    Start {
        /// Override data directory (useful for running multiple instances).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Override INX listen address (e.g. "127.0.0.1:9030").
        #[arg(short = 'l', long)]
        inx_listen_addr: Option<String>,

        /// Run fully in-memory (no disk persistence).
        #[arg(short, long)]
        memory: bool,
    },

    /// Show the sync status of a running node.
    Status {
        /// INX address of the node (defaults to the configured listen address).
        #[arg(short, long, env = "TANGLE_INX_ADDR")]
        addr: Option<String>,
    },

    /// Fetch one confirmed milestone from a running node.
    Milestone {
        /// Milestone index.
        index: u32,

        /// INX address of the node (defaults to the configured listen address).
        #[arg(short, long, env = "TANGLE_INX_ADDR")]
        addr: Option<String>,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start {
            data_dir,
            inx_listen_addr,
            memory,
        } => {
            // CLI args override config file values.
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            if let Some(addr) = inx_listen_addr {
                config.node.inx_listen_addr = addr;
            }
            if memory {
                config.storage.backend = "memory".to_string();
            }
            cmd_start(config).await
        }
        Commands::Status { addr } => {
            cmd_status(addr.as_deref().unwrap_or(&config.node.inx_listen_addr)).await
        }
        Commands::Milestone { index, addr } => {
            cmd_milestone(
                addr.as_deref().unwrap_or(&config.node.inx_listen_addr),
                MilestoneIndex(index),
            )
            .await
        }
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// tangled start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    info!("starting tangled");
    info!(
        data_dir = %config.node.data_dir.display(),
        inx_addr = %config.node.inx_listen_addr,
        backend = %config.storage.backend,
        "node configuration"
    );

    let store = open_store(&config)?;
    let tangle = Arc::new(
        Tangle::new(store, config.tangle_config()).context("failed to initialise tangle")?,
    );
    let status = tangle.sync_status();
    info!(
        synced = status.is_synced,
        confirmed = %status.confirmed_milestone_index,
        "ledger loaded"
    );

    let listener = TcpListener::bind(&config.node.inx_listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.node.inx_listen_addr))?;
    let server = InxServer::new(Arc::clone(&tangle));
    let server_task = tokio::spawn(server.serve(listener));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    tangle.shutdown();

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "INX server stopped with error"),
        Err(e) => warn!(error = %e, "INX server task failed"),
    }
    info!("tangled stopped");
    Ok(())
}

/// Open the configured store and bootstrap it from the snapshot section
/// if it has never confirmed a milestone.
fn open_store(config: &CliConfig) -> Result<Arc<dyn TangleStore>> {
    let store: Arc<dyn TangleStore> = if config.is_memory() {
        info!("using in-memory ledger store");
        Arc::new(MemoryStore::new())
    } else {
        std::fs::create_dir_all(&config.node.data_dir)
            .context("failed to create data directory")?;
        let path = config.node.data_dir.join("ledger");
        info!(path = %path.display(), "using fjall ledger store");
        Arc::new(FjallStore::open(&path).context("failed to open ledger store")?)
    };

    if let Some(snapshot) = config.snapshot()? {
        let ledger_index = store.ledger_index()?;
        if ledger_index == MilestoneIndex(0) {
            store
                .load_snapshot(&snapshot)
                .context("failed to load snapshot")?;
            info!(
                ledger_index = %snapshot.ledger_index,
                outputs = snapshot.outputs.len(),
                entry_points = snapshot.solid_entry_points.len(),
                "snapshot loaded"
            );
        } else {
            info!(%ledger_index, "store already initialised, snapshot ignored");
        }
    }

    Ok(store)
}

// -----------------------------------------------------------------------
// tangled status / tangled milestone
// -----------------------------------------------------------------------

async fn cmd_status(addr: &str) -> Result<()> {
    let mut client = InxClient::connect(addr)
        .await
        .with_context(|| format!("cannot reach node at {addr}. Is it running?"))?;
    let status = client.read_node_status().await?;

    println!("Synced:              {}", status.is_synced);
    println!("Latest milestone:    {}", status.latest_milestone_index);
    println!("Confirmed milestone: {}", status.confirmed_milestone_index);
    Ok(())
}

async fn cmd_milestone(addr: &str, index: MilestoneIndex) -> Result<()> {
    let mut client = InxClient::connect(addr)
        .await
        .with_context(|| format!("cannot reach node at {addr}. Is it running?"))?;
    let milestone = client
        .read_milestone(index)
        .await
        .with_context(|| format!("failed to read milestone {index}"))?;

    let info = milestone.milestone_info;
    println!("Index:     {}", info.milestone_index);
    println!("Id:        {}", info.milestone_id);
    println!("Timestamp: {}", info.milestone_timestamp);
    println!("Payload:   {}", hex::encode(&milestone.raw));
    Ok(())
}
