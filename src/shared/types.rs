use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Lifecycle state of a storage worker as seen by the coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Heartbeating within the dead threshold; eligible for placement.
    Active,
    /// Missed the dead threshold; placements on it do not count toward R.
    /// Returns to `Active` on the next heartbeat.
    Inactive,
    /// Removed by explicit admin action. Never selected again.
    Decommissioned,
}

/// State of a single replica of a chunk on a specific worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    /// Scheduled or written but not yet confirmed by a heartbeat.
    Pending,
    /// Confirmed present by the owning worker's inventory report.
    Committed,
    /// A read detected a digest mismatch on this copy.
    Corrupted,
    /// Scheduled for physical removal.
    Deleted,
}

/// The assertion that one worker holds one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplicaPlacement {
    pub node_id: String,
    /// Base URL the chunk can be fetched from (`http://host:port`).
    pub url: String,
    pub state: ChunkState,
    /// When the owning worker last reported this chunk, epoch millis.
    pub last_confirmed_ms: Option<u64>,
    /// The worker itself has vouched for the stored digest: set once the
    /// chunk shows up in a heartbeat inventory, which only lists copies
    /// that passed the worker's write-time hash or scrub. False while the
    /// coordinator has nothing beyond the client's reported checksum.
    pub checksum_verified: bool,
}

/// One chunk of a file: the unit of placement, replication and retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: Uuid,
    /// 0-based position within the file. Chunks appear with no gaps.
    pub seq_index: u32,
    /// Bytes in this chunk; only the last chunk of a file may be short.
    pub size: u64,
    /// Lowercase hex SHA-256, set at commit and immutable afterwards.
    pub checksum: Option<String>,
    pub replicas: Vec<ReplicaPlacement>,
}

/// Metadata for one logical path in the namespace.
///
/// Created provisionally at upload-init (hidden from listings), published at
/// commit, soft-deleted on delete and physically purged by the GC sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub path: String,
    pub size: u64,
    pub created_at_ms: u64,
    pub modified_at_ms: u64,
    pub chunks: Vec<ChunkRecord>,
    /// False while the upload session is still open; such records are
    /// invisible to list/get and cannot be deleted by clients.
    pub published: bool,
    pub is_deleted: bool,
    pub deleted_at_ms: Option<u64>,
    /// Client-supplied, opaque to the core.
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub original_size: Option<u64>,
}

impl FileRecord {
    /// A record that participates in the namespace uniqueness invariant.
    pub fn is_live(&self) -> bool {
        self.published && !self.is_deleted
    }
}

/// A registered storage worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRecord {
    /// Stable opaque id, by convention `node-<host>-<port>`.
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub rack: Option<String>,
    pub free_space: u64,
    pub total_space: u64,
    pub chunk_count: u64,
    pub last_heartbeat_ms: u64,
    pub state: NodeState,
}

impl WorkerRecord {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Fraction of the mount still free, 0.0 when total is unknown.
    pub fn free_ratio(&self) -> f64 {
        if self.total_space == 0 {
            return 0.0;
        }
        self.free_space as f64 / self.total_space as f64
    }
}

/// One chunk of an open upload session: identity plus the chosen target set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionChunk {
    pub chunk_id: Uuid,
    pub seq_index: u32,
    pub size: u64,
    /// Worker ids in placement order; the first is the fan-out primary.
    pub target_nodes: Vec<String>,
}

/// Transient coordinator state between upload-init and commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSession {
    pub file_id: Uuid,
    pub path: String,
    pub size: u64,
    pub chunk_size: u64,
    pub chunks: Vec<SessionChunk>,
    pub created_at_ms: u64,
    pub overwrite: bool,
}

impl UploadSession {
    pub fn expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > timeout_ms
    }
}

/// Exclusive hold on a path while a write or delete is in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lease {
    pub lease_id: Uuid,
    pub path: String,
    pub client_id: Option<String>,
    pub expires_at_ms: u64,
}

/// Current wall clock as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Number of chunks a file of `size` bytes splits into at `chunk_size`.
/// Zero-byte files have zero chunks; an exact multiple has no empty tail.
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Size of chunk `index` for a file of `size` bytes.
pub fn chunk_len(size: u64, chunk_size: u64, index: u64) -> u64 {
    let start = index * chunk_size;
    chunk_size.min(size.saturating_sub(start))
}
