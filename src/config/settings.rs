//! Configuration settings for fsdispatch
//!
//! Defines runtime tunables, their defaults, and the CLI arguments of the
//! diagnostic binary.

use crate::error::{FsDispatchError, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bytes per in-kernel transfer call when the copy can be cancelled
pub const CANCELLABLE_CHUNK: usize = 1024 * 1024;

/// Largest count `sendfile` accepts in one call
pub const MAX_TRANSFER_CHUNK: usize = 0x7fff_f000;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Mount table settings
    pub mounts: MountConfig,
    /// Bulk copy settings
    pub transfer: TransferConfig,
}

impl DispatchConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FsDispatchError::config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable
    pub fn validate(&self) -> Result<()> {
        self.transfer.validate()
    }
}

/// Mount table settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Table read by `MountTable::system`
    pub table_path: PathBuf,
    /// Scratch buffer for one table line
    pub line_buffer_size: usize,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("/proc/mounts"),
            line_buffer_size: crate::fs::mount::DEFAULT_LINE_BUFFER,
        }
    }
}

/// Bulk copy chunk sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Per-call byte count when a cancellation flag is supplied
    pub cancellable_chunk: usize,
    /// Per-call byte count otherwise
    pub max_chunk: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            cancellable_chunk: CANCELLABLE_CHUNK,
            max_chunk: MAX_TRANSFER_CHUNK,
        }
    }
}

impl TransferConfig {
    /// Chunk size for a copy with or without a cancellation flag
    pub fn chunk_size(&self, cancellable: bool) -> usize {
        if cancellable {
            self.cancellable_chunk
        } else {
            self.max_chunk
        }
    }

    /// Both sizes must be nonzero and within what `sendfile` accepts
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("cancellable_chunk", self.cancellable_chunk),
            ("max_chunk", self.max_chunk),
        ] {
            if value == 0 || value > MAX_TRANSFER_CHUNK {
                return Err(FsDispatchError::config(format!(
                    "{} must be between 1 and {} bytes, got {}",
                    name, MAX_TRANSFER_CHUNK, value
                )));
            }
        }
        Ok(())
    }
}

/// fsdispatch - inspect kernel file metadata, mounts and in-kernel copy
#[derive(Parser, Debug, Clone)]
#[command(name = "fsdispatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kernel file metadata, mount table and zero-copy diagnostics")]
pub struct CliArgs {
    /// JSON configuration file
    #[arg(short, long, global = true, env = "FSDISPATCH_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show which optional kernel facilities were found
    #[command(name = "probe")]
    Probe,

    /// Print file metadata
    #[command(name = "stat")]
    Stat {
        /// File to inspect
        path: PathBuf,
        /// Report on a symlink itself rather than its target
        #[arg(long)]
        no_follow: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List mounted filesystems
    #[command(name = "mounts")]
    Mounts {
        /// Mount table to read instead of the configured one
        #[arg(long, value_name = "PATH")]
        table: Option<PathBuf>,
    },

    /// Copy a file with the in-kernel copy engine
    #[command(name = "copy")]
    Copy {
        /// Source file
        source: PathBuf,
        /// Destination file (created or truncated)
        destination: PathBuf,
        /// Copy in cancellable chunks and stop cleanly on Ctrl-C
        #[arg(long)]
        cancellable: bool,
    },
}
