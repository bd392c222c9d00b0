//! Environment-driven configuration shared by every role.
//!
//! Every knob has a default that works for a local three-worker cluster;
//! deployments override via `DFS_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DfsConfig {
    /// Fixed chunk size the coordinator plans with. Authoritative for clients.
    pub chunk_size: u64,
    /// Target copies per committed chunk.
    pub replication_factor: usize,
    /// Worker heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// A worker missing heartbeats for longer than this is inactive.
    pub dead_threshold: Duration,
    /// Repair loop cadence.
    pub repair_period: Duration,
    /// Concurrent cross-worker copies the repair loop allows.
    pub max_concurrent_repairs: usize,
    /// Move placements off over-full workers; off by default.
    pub rebalance: bool,
    /// GC sweep cadence.
    pub gc_period: Duration,
    /// How long a soft-deleted file survives before physical removal.
    pub gc_grace: Duration,
    /// Upload sessions older than this are abandoned.
    pub session_timeout: Duration,
    /// Workers below this free-space ratio are skipped by placement.
    pub min_free_ratio: f64,
    /// Coordinator WAL compacts into a snapshot past this many records.
    pub wal_compact_threshold: usize,
    /// Where the coordinator keeps its journal and snapshot.
    pub metadata_path: PathBuf,
    /// Coordinator base URL, as seen by workers and clients.
    pub metadata_url: String,
    /// Where a worker keeps its chunk files.
    pub storage_path: PathBuf,
    /// Largest request body either server accepts.
    pub max_body_bytes: usize,
}

impl DfsConfig {
    pub fn from_env() -> Self {
        Self {
            chunk_size: env_parse("DFS_CHUNK_SIZE", 64 * 1024 * 1024),
            replication_factor: env_parse("DFS_REPLICATION_FACTOR", 3),
            heartbeat_interval: Duration::from_secs(env_parse("DFS_HEARTBEAT_INTERVAL", 10)),
            dead_threshold: Duration::from_secs(env_parse("DFS_DEAD_THRESHOLD", 30)),
            repair_period: Duration::from_secs(env_parse("DFS_REPAIR_PERIOD", 60)),
            max_concurrent_repairs: env_parse("DFS_MAX_CONCURRENT_REPAIRS", 10),
            rebalance: env_parse("DFS_REBALANCE", false),
            gc_period: Duration::from_secs(env_parse("DFS_GC_PERIOD", 24 * 60 * 60)),
            gc_grace: Duration::from_secs(env_parse("DFS_GC_GRACE", 7 * 24 * 60 * 60)),
            session_timeout: Duration::from_secs(env_parse("DFS_SESSION_TIMEOUT", 60 * 60)),
            min_free_ratio: env_parse("DFS_MIN_FREE_RATIO", 0.10),
            wal_compact_threshold: env_parse("DFS_WAL_COMPACT_THRESHOLD", 10_000),
            metadata_path: PathBuf::from(
                std::env::var("DFS_METADATA_PATH").unwrap_or_else(|_| "/tmp/dfs-metadata".into()),
            ),
            metadata_url: std::env::var("DFS_METADATA_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".into()),
            storage_path: PathBuf::from(
                std::env::var("DFS_STORAGE_PATH").unwrap_or_else(|_| "/tmp/dfs-data".into()),
            ),
            max_body_bytes: env_parse("DFS_MAX_BODY_BYTES", 128 * 1024 * 1024),
        }
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}
