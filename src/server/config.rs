//! Configuration for the booklog HTTP server.

use std::path::PathBuf;

use clap::Parser;

use crate::runtime::handle::RuntimeConfig;

/// CLI arguments for the booklog server.
#[derive(Debug, Parser)]
#[command(name = "booklog")]
#[command(about = "Library book tracking HTTP server")]
pub struct CliArgs {
    /// HTTP server port.
    #[arg(long, default_value = "3000")]
    pub port: u16,

    /// SQLite journal path.
    #[arg(long, default_value = "booklog.db")]
    pub db_path: PathBuf,

    /// Keep everything in memory (for testing).
    #[arg(long, default_value = "false")]
    pub in_memory: bool,

    /// Write a snapshot every N write operations (0 disables).
    #[arg(long, default_value = "2000")]
    pub snapshot_every: usize,

    /// Drop journal rows already covered by a snapshot.
    #[arg(long, default_value = "false")]
    pub compact: bool,

    /// Maximum ops per journal batch.
    #[arg(long, default_value = "32")]
    pub batch_max_ops: usize,

    /// Maximum time an op waits in a journal batch.
    #[arg(long, default_value = "75")]
    pub batch_max_latency_ms: u64,
}

impl CliArgs {
    /// Convert CLI args to runtime configuration.
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            batch_max_ops: self.batch_max_ops.max(1),
            batch_max_latency_ms: self.batch_max_latency_ms,
            snapshot_every_ops: self.snapshot_every,
            compact_after_snapshot: self.compact,
            ..RuntimeConfig::default()
        }
    }
}

/// Configuration for the booklog HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port.
    pub port: u16,
}

impl From<&CliArgs> for ServerConfig {
    fn from(args: &CliArgs) -> Self {
        Self { port: args.port }
    }
}
