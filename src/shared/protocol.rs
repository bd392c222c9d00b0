//! DFS Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) for both HTTP
//! surfaces: the coordinator's metadata API and the worker's chunk API.
//!
//! These structures are serialized as JSON (chunk bodies are raw
//! `application/octet-stream`) and validated at the boundary; nothing past
//! the handlers touches untyped values.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Coordinator API ---

/// Prefix for every coordinator route.
pub const API_PREFIX: &str = "/api/v1";
/// Starts an upload session and returns the chunk plan.
pub const ENDPOINT_UPLOAD_INIT: &str = "/files/upload-init";
/// Publishes a provisional file once its chunks are stored.
pub const ENDPOINT_COMMIT: &str = "/files/commit";
/// Listing, metadata lookup and delete live under this root.
pub const ENDPOINT_FILES: &str = "/files";
/// Worker inventory reports.
pub const ENDPOINT_HEARTBEAT: &str = "/nodes/heartbeat";
/// Read-only worker views and admin decommission.
pub const ENDPOINT_NODES: &str = "/nodes";
/// Liveness summary.
pub const ENDPOINT_HEALTH: &str = "/health";
/// Cluster-wide totals.
pub const ENDPOINT_STATS: &str = "/stats";
/// Path lease acquire/release.
pub const ENDPOINT_LEASES: &str = "/leases";
/// Coordinator-hosted chunk pass-through for clients behind NAT.
pub const ENDPOINT_PROXY_CHUNKS: &str = "/proxy/chunks";

// --- Worker API ---

/// Chunk storage routes on a worker.
pub const ENDPOINT_CHUNKS: &str = "/chunks";
/// Worker liveness ping.
pub const ENDPOINT_WORKER_HEALTH: &str = "/health";

/// Response header carrying the stored digest on chunk GET.
pub const HEADER_CHECKSUM: &str = "X-Checksum";

// --- Coordinator DTOs ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInitRequest {
    pub path: String,
    pub size: u64,
    /// Replace an existing live file at this path instead of failing.
    #[serde(default)]
    pub overwrite: bool,
    /// Opaque to the core; stored and echoed back on get/list.
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub original_size: Option<u64>,
}

/// Where one chunk should be written: URLs in placement order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTarget {
    pub chunk_id: Uuid,
    pub size: u64,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInitResponse {
    pub file_id: Uuid,
    /// Authoritative: the client MUST slice with this value.
    pub chunk_size: u64,
    pub chunks: Vec<ChunkTarget>,
}

/// What the client learned about one chunk while uploading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCommitInfo {
    pub chunk_id: Uuid,
    /// Lowercase hex SHA-256 of the chunk bytes.
    pub checksum: String,
    /// Worker ids that acknowledged the write. Must be non-empty.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub file_id: Uuid,
    pub chunks: Vec<ChunkCommitInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub status: String,
    pub file_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListFilesQuery {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeleteFileQuery {
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub status: String,
    pub path: String,
    pub permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub rack: Option<String>,
    pub free_space: u64,
    pub total_space: u64,
    /// The worker's full inventory. Authoritative: placements previously
    /// recorded for this worker but absent here are dropped.
    pub chunk_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub replication_factor: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp_ms: u64,
    pub details: HealthDetails,
}

/// Cluster-wide totals for dashboards and capacity planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_files: usize,
    pub total_chunks: usize,
    pub total_size: u64,
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub total_space: u64,
    pub free_space: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub path: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseGrant {
    pub lease_id: Uuid,
    pub path: String,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseReleaseResponse {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyPutQuery {
    /// Comma-separated worker ids the chunk should land on.
    pub target_nodes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyGetQuery {
    /// Path of the owning file, used to resolve replicas.
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyPutResponse {
    pub status: String,
    pub chunk_id: Uuid,
    pub size: u64,
    /// Worker ids that acknowledged the write.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecommissionResponse {
    pub status: String,
    pub node_id: String,
}

// --- Worker DTOs ---

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WorkerPutQuery {
    /// Pipe-separated peer base URLs to fan the body out to.
    #[serde(default)]
    pub replicate_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPutResponse {
    pub status: String,
    pub chunk_id: Uuid,
    pub size: u64,
    pub checksum: String,
    /// Worker ids holding the chunk after fan-out (self plus acked peers).
    pub nodes: Vec<String>,
    /// Peer URLs that did not acknowledge; the repair loop heals these.
    #[serde(default)]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDeleteResponse {
    pub status: String,
    pub chunk_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateChunkRequest {
    /// Base URL of the worker to copy the chunk to.
    pub destination_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateChunkResponse {
    pub status: String,
    pub chunk_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealthResponse {
    pub status: String,
    pub node_id: String,
    pub free_space: u64,
    pub total_space: u64,
    pub chunk_count: usize,
}

// --- Errors ---

/// Uniform error payload for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable kind, e.g. `path-conflict`.
    pub error: String,
    pub detail: String,
}
