//! TOML configuration for the tangle daemon.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tangle_engine::TangleConfig;
use tangle_store::{Snapshot, StorageConfig};
use tangle_types::{MessageId, MilestoneIndex, Output, OutputId};

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node directories and addresses.
    pub node: NodeSection,
    /// Ledger storage backend and cache sizing.
    pub storage: StorageSection,
    /// Gateway settings.
    pub inx: InxSection,
    /// Initial ledger state for a fresh store.
    pub snapshot: SnapshotSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory for persistent data.
    pub data_dir: PathBuf,
    /// Address the INX gateway listens on.
    pub inx_listen_addr: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".tangle"))
            .unwrap_or_else(|| PathBuf::from(".tangle"));
        Self {
            data_dir,
            inx_listen_addr: "127.0.0.1:9029".to_string(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
    /// Unreferenced milestones kept in the object cache.
    pub milestone_cache_size: Option<usize>,
    /// Unreferenced messages kept in the object cache.
    pub message_cache_size: Option<usize>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            milestone_cache_size: None,
            message_cache_size: None,
        }
    }
}

/// `[inx]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InxSection {
    /// Events buffered per stream subscriber before new ones are dropped.
    pub subscriber_queue_capacity: Option<usize>,
}

/// `[snapshot]` section.
///
/// Loaded only into a store that has never confirmed a milestone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    /// Confirmed milestone index the snapshot was taken at.
    pub ledger_index: u32,
    /// Hex-encoded message ids treated as solid and confirmed.
    pub solid_entry_points: Vec<String>,
    /// Unspent outputs at `ledger_index`.
    pub outputs: Vec<SnapshotOutput>,
}

/// One `[[snapshot.outputs]]` entry.
#[derive(Debug, Deserialize)]
pub struct SnapshotOutput {
    /// Hex-encoded id of the creating message.
    pub message_id: String,
    /// Output position within the creating transaction.
    pub index: u16,
    /// Hex-encoded 32-byte owner address.
    pub address: String,
    /// Token amount.
    pub amount: u64,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Whether the ledger lives in memory only.
    pub fn is_memory(&self) -> bool {
        self.storage.backend == "memory"
    }

    /// Engine configuration with unset fields at their defaults.
    pub fn tangle_config(&self) -> TangleConfig {
        let defaults = TangleConfig::default();
        TangleConfig {
            storage: StorageConfig {
                milestone_cache_size: self
                    .storage
                    .milestone_cache_size
                    .unwrap_or(defaults.storage.milestone_cache_size),
                message_cache_size: self
                    .storage
                    .message_cache_size
                    .unwrap_or(defaults.storage.message_cache_size),
            },
            subscriber_queue_capacity: self
                .inx
                .subscriber_queue_capacity
                .unwrap_or(defaults.subscriber_queue_capacity),
        }
    }

    /// The configured snapshot, or `None` if the section is empty.
    pub fn snapshot(&self) -> anyhow::Result<Option<Snapshot>> {
        let section = &self.snapshot;
        if section.ledger_index == 0
            && section.solid_entry_points.is_empty()
            && section.outputs.is_empty()
        {
            return Ok(None);
        }

        let solid_entry_points = section
            .solid_entry_points
            .iter()
            .map(|s| {
                s.parse::<MessageId>()
                    .with_context(|| format!("invalid solid entry point {s:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut outputs = Vec::with_capacity(section.outputs.len());
        for out in &section.outputs {
            let message_id: MessageId = out
                .message_id
                .parse()
                .with_context(|| format!("invalid output message id {:?}", out.message_id))?;
            let mut address = [0u8; 32];
            hex::decode_to_slice(out.address.trim_start_matches("0x"), &mut address)
                .with_context(|| format!("invalid output address {:?}", out.address))?;
            outputs.push((
                OutputId::new(message_id, out.index),
                Output {
                    address,
                    amount: out.amount,
                },
            ));
        }

        Ok(Some(Snapshot {
            ledger_index: MilestoneIndex(section.ledger_index),
            solid_entry_points,
            outputs,
        }))
    }
}
