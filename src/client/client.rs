//! DFS Client
//!
//! Drives the three-phase upload (init, parallel chunk PUTs with retries,
//! commit) and parallel verified downloads. Transfers go through the
//! coordinator's chunk proxy by default; server-side callers that can reach
//! workers directly can switch to direct mode and skip the extra hop.

use bytes::Bytes;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::shared::checksum::sha256_hex;
use crate::shared::error::DfsError;
use crate::shared::protocol::{
    ChunkCommitInfo, ChunkTarget, CommitRequest, CommitResponse, DeleteFileResponse,
    ErrorResponse, HealthResponse, ProxyPutResponse, UploadInitRequest, UploadInitResponse,
    WorkerPutResponse, API_PREFIX, ENDPOINT_COMMIT, ENDPOINT_FILES, ENDPOINT_HEALTH,
    ENDPOINT_NODES, ENDPOINT_PROXY_CHUNKS, ENDPOINT_UPLOAD_INIT,
};
use crate::shared::retry::{retry_async, RetryPolicy};
use crate::shared::types::{FileRecord, WorkerRecord};

/// How chunk bytes travel between this client and the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Everything through the coordinator's proxy endpoints. Works from
    /// behind NAT; the coordinator carries the bytes.
    Proxy,
    /// Straight to the workers named by the chunk plan. For server-side
    /// callers on the cluster network.
    Direct,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub metadata_url: String,
    pub mode: TransferMode,
    pub upload_concurrency: usize,
    pub download_concurrency: usize,
    /// Files at or above this size download with reduced concurrency to
    /// cap memory and leave room for progressive consumption.
    pub large_file_threshold: u64,
    pub large_file_concurrency: usize,
    pub chunk_timeout: Duration,
}

impl ClientConfig {
    pub fn new(metadata_url: &str) -> Self {
        Self {
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            mode: TransferMode::Proxy,
            upload_concurrency: 4,
            download_concurrency: 8,
            large_file_threshold: 256 * 1024 * 1024,
            large_file_concurrency: 3,
            chunk_timeout: Duration::from_secs(120),
        }
    }
}

pub struct DfsClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl DfsClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn api(&self, suffix: &str) -> String {
        format!("{}{}{}", self.config.metadata_url, API_PREFIX, suffix)
    }

    // ============================================================
    // UPLOAD
    // ============================================================

    /// Uploads a local file to `remote_path`. Durable once this returns.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        overwrite: bool,
    ) -> Result<Uuid, DfsError> {
        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| DfsError::Invalid(format!("{}: {}", local_path.display(), e)))?
            .len();

        let plan = self.upload_init(remote_path, size, overwrite).await?;
        tracing::info!(
            "uploading {} -> {} ({} bytes, {} chunks)",
            local_path.display(),
            remote_path,
            size,
            plan.chunks.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.upload_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        for (index, target) in plan.chunks.iter().enumerate() {
            let semaphore = semaphore.clone();
            let target = target.clone();
            let local_path = local_path.to_path_buf();
            let offset = index as u64 * plan.chunk_size;
            let http = self.http.clone();
            let config = self.config.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| DfsError::Internal(e.into()))?;
                let slice = read_slice(&local_path, offset, target.size).await?;
                // One digest per chunk, outside the retry loop.
                let checksum = sha256_hex(&slice);
                let nodes =
                    put_chunk(&http, &config, &target, Bytes::from(slice), &checksum).await?;
                Ok::<ChunkCommitInfo, DfsError>(ChunkCommitInfo {
                    chunk_id: target.chunk_id,
                    checksum,
                    nodes,
                })
            });
        }

        let mut commits = Vec::with_capacity(plan.chunks.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(commit)) => commits.push(commit),
                Ok(Err(e)) => {
                    // Abandon: the coordinator times the session out.
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(DfsError::Internal(e.into()));
                }
            }
        }

        let committed = self.commit(plan.file_id, commits).await?;
        tracing::info!("upload of {} committed", remote_path);
        Ok(committed.file_id)
    }

    async fn upload_init(
        &self,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<UploadInitResponse, DfsError> {
        let response = self
            .http
            .post(self.api(ENDPOINT_UPLOAD_INIT))
            .json(&UploadInitRequest {
                path: path.to_string(),
                size,
                overwrite,
                compressed: false,
                original_size: None,
            })
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(unreachable_err)?;
        parse_json(response).await
    }

    async fn commit(
        &self,
        file_id: Uuid,
        chunks: Vec<ChunkCommitInfo>,
    ) -> Result<CommitResponse, DfsError> {
        let response = self
            .http
            .post(self.api(ENDPOINT_COMMIT))
            .json(&CommitRequest { file_id, chunks })
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(unreachable_err)?;
        parse_json(response).await
    }

    // ============================================================
    // DOWNLOAD
    // ============================================================

    /// Downloads `remote_path` into a local file, verifying every chunk
    /// digest end-to-end. Returns the byte count written.
    pub async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, DfsError> {
        let file = self.stat(remote_path).await?;
        tracing::info!(
            "downloading {} ({} bytes, {} chunks)",
            remote_path,
            file.size,
            file.chunks.len()
        );

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DfsError::Internal(e.into()))?;
        }
        let mut output = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(local_path)
            .await
            .map_err(|e| DfsError::Internal(e.into()))?;
        output
            .set_len(file.size)
            .await
            .map_err(|e| DfsError::Internal(e.into()))?;

        let mut join_set = self.spawn_chunk_fetches(&file, remote_path);
        let chunk_size = chunk_size_of(&file);
        let mut written = 0u64;
        while let Some(joined) = join_set.join_next().await {
            let (seq_index, bytes) = match joined {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(DfsError::Internal(e.into()));
                }
            };
            output
                .seek(SeekFrom::Start(seq_index as u64 * chunk_size))
                .await
                .map_err(|e| DfsError::Internal(e.into()))?;
            output
                .write_all(&bytes)
                .await
                .map_err(|e| DfsError::Internal(e.into()))?;
            written += bytes.len() as u64;
        }
        output
            .flush()
            .await
            .map_err(|e| DfsError::Internal(e.into()))?;

        tracing::info!("downloaded {} bytes to {}", written, local_path.display());
        Ok(written)
    }

    /// In-memory download, reassembled in sequence order.
    pub async fn download_bytes(&self, remote_path: &str) -> Result<Vec<u8>, DfsError> {
        let file = self.stat(remote_path).await?;

        let mut join_set = self.spawn_chunk_fetches(&file, remote_path);
        let mut parts: Vec<(u32, Bytes)> = Vec::with_capacity(file.chunks.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(pair)) => parts.push(pair),
                Ok(Err(e)) => {
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(DfsError::Internal(e.into()));
                }
            }
        }
        parts.sort_by_key(|(seq, _)| *seq);

        let mut assembled = Vec::with_capacity(file.size as usize);
        for (_, bytes) in parts {
            assembled.extend_from_slice(&bytes);
        }
        Ok(assembled)
    }

    fn spawn_chunk_fetches(
        &self,
        file: &FileRecord,
        remote_path: &str,
    ) -> JoinSet<Result<(u32, Bytes), DfsError>> {
        let concurrency = if file.size >= self.config.large_file_threshold {
            self.config.large_file_concurrency
        } else {
            self.config.download_concurrency
        };
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        // Replicas that failed twice are skipped for the rest of this
        // download, shared across all chunk tasks.
        let failures: Arc<DashMap<String, u32>> = Arc::new(DashMap::new());

        let mut join_set = JoinSet::new();
        for chunk in &file.chunks {
            let semaphore = semaphore.clone();
            let failures = failures.clone();
            let chunk = chunk.clone();
            let http = self.http.clone();
            let config = self.config.clone();
            let remote_path = remote_path.to_string();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| DfsError::Internal(e.into()))?;
                let bytes = fetch_chunk(&http, &config, &remote_path, &chunk, &failures).await?;
                Ok((chunk.seq_index, bytes))
            });
        }
        join_set
    }

    // ============================================================
    // METADATA OPERATIONS
    // ============================================================

    pub async fn stat(&self, remote_path: &str) -> Result<FileRecord, DfsError> {
        let response = self
            .http
            .get(format!(
                "{}/{}",
                self.api(ENDPOINT_FILES),
                encoded_path_segment(remote_path)
            ))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(unreachable_err)?;
        parse_json(response).await
    }

    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<FileRecord>, DfsError> {
        let mut request = self
            .http
            .get(self.api(ENDPOINT_FILES))
            .timeout(Duration::from_secs(10));
        if let Some(prefix) = prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        let response = request.send().await.map_err(unreachable_err)?;
        parse_json(response).await
    }

    pub async fn delete(
        &self,
        remote_path: &str,
        permanent: bool,
    ) -> Result<DeleteFileResponse, DfsError> {
        let response = self
            .http
            .delete(format!(
                "{}/{}",
                self.api(ENDPOINT_FILES),
                encoded_path_segment(remote_path)
            ))
            .query(&[("permanent", permanent)])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(unreachable_err)?;
        parse_json(response).await
    }

    pub async fn nodes(&self) -> Result<Vec<WorkerRecord>, DfsError> {
        let response = self
            .http
            .get(self.api(ENDPOINT_NODES))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(unreachable_err)?;
        parse_json(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse, DfsError> {
        let response = self
            .http
            .get(self.api(ENDPOINT_HEALTH))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(unreachable_err)?;
        parse_json(response).await
    }
}

// ============================================================
// TRANSFER HELPERS
// ============================================================

async fn read_slice(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, DfsError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DfsError::Internal(e.into()))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| DfsError::Internal(e.into()))?;
    let mut slice = vec![0u8; len as usize];
    file.read_exact(&mut slice)
        .await
        .map_err(|e| DfsError::Internal(e.into()))?;
    Ok(slice)
}

/// PUTs one chunk, retrying transient failures with fresh state each
/// attempt. Returns the worker ids that acknowledged the write.
async fn put_chunk(
    http: &reqwest::Client,
    config: &ClientConfig,
    target: &ChunkTarget,
    body: Bytes,
    checksum: &str,
) -> Result<Vec<String>, DfsError> {
    if target.targets.is_empty() {
        return Err(DfsError::Invalid(format!(
            "chunk {} has no targets",
            target.chunk_id
        )));
    }

    retry_async(
        &RetryPolicy::transfer(),
        |e: &DfsError| e.is_retriable(),
        || {
            let http = http.clone();
            let body = body.clone();
            let checksum = checksum.to_string();
            let target = target.clone();
            let config = config.clone();
            async move {
                let nodes = match config.mode {
                    TransferMode::Direct => {
                        let mut request = http
                            .put(format!("{}/chunks/{}", target.targets[0], target.chunk_id))
                            .timeout(config.chunk_timeout);
                        if target.targets.len() > 1 {
                            request =
                                request.query(&[("replicate_to", target.targets[1..].join("|"))]);
                        }
                        let response = request.body(body).send().await.map_err(unreachable_err)?;
                        let stored: WorkerPutResponse = parse_json(response).await?;
                        if stored.checksum != checksum {
                            return Err(DfsError::Corrupted(target.chunk_id));
                        }
                        stored.nodes
                    }
                    TransferMode::Proxy => {
                        let node_ids: Vec<String> = target
                            .targets
                            .iter()
                            .map(|url| node_id_from_url(url))
                            .collect();
                        let response = http
                            .put(format!(
                                "{}{}{}/{}",
                                config.metadata_url,
                                API_PREFIX,
                                ENDPOINT_PROXY_CHUNKS,
                                target.chunk_id
                            ))
                            .query(&[("target_nodes", node_ids.join(","))])
                            .timeout(config.chunk_timeout)
                            .body(body)
                            .send()
                            .await
                            .map_err(unreachable_err)?;
                        let stored: ProxyPutResponse = parse_json(response).await?;
                        stored.nodes
                    }
                };
                if nodes.is_empty() {
                    return Err(DfsError::Unreachable(format!(
                        "no worker acknowledged chunk {}",
                        target.chunk_id
                    )));
                }
                Ok(nodes)
            }
        },
    )
    .await
}

/// Fetches one chunk, trying replicas until one yields bytes matching the
/// recorded digest. A replica failing twice is skipped thereafter.
async fn fetch_chunk(
    http: &reqwest::Client,
    config: &ClientConfig,
    remote_path: &str,
    chunk: &crate::shared::types::ChunkRecord,
    failures: &DashMap<String, u32>,
) -> Result<Bytes, DfsError> {
    let Some(expected) = chunk.checksum.as_deref() else {
        return Err(DfsError::Invalid(format!(
            "chunk {} has no recorded checksum",
            chunk.chunk_id
        )));
    };

    if config.mode == TransferMode::Proxy {
        return retry_async(
            &RetryPolicy::transfer(),
            |e: &DfsError| e.is_retriable(),
            || {
                let http = http.clone();
                let config = config.clone();
                let remote_path = remote_path.to_string();
                let expected = expected.to_string();
                let chunk_id = chunk.chunk_id;
                async move {
                    let response = http
                        .get(format!(
                            "{}{}{}/{}",
                            config.metadata_url, API_PREFIX, ENDPOINT_PROXY_CHUNKS, chunk_id
                        ))
                        .query(&[("file_path", remote_path.as_str())])
                        .timeout(config.chunk_timeout)
                        .send()
                        .await
                        .map_err(unreachable_err)?;
                    if !response.status().is_success() {
                        return Err(error_from_response(response).await);
                    }
                    let bytes = response.bytes().await.map_err(unreachable_err)?;
                    if sha256_hex(&bytes) != expected {
                        return Err(DfsError::Corrupted(chunk_id));
                    }
                    Ok(bytes)
                }
            },
        )
        .await;
    }

    if chunk.replicas.is_empty() {
        return Err(DfsError::NotFound(format!(
            "no live replicas for chunk {}",
            chunk.chunk_id
        )));
    }

    // Direct mode: walk replicas one at a time, rotated by sequence index
    // so parallel chunk fetches spread across the replica set.
    let n = chunk.replicas.len();
    let start = chunk.seq_index as usize % n;
    let mut saw_mismatch = false;
    for attempt_round in 0..2 {
        for offset in 0..n {
            let replica = &chunk.replicas[(start + offset) % n];
            if failures.get(&replica.url).map_or(false, |f| *f >= 2) {
                continue;
            }
            // Second round retries replicas that failed only once.
            if attempt_round == 1 && !failures.contains_key(&replica.url) {
                continue;
            }

            let url = format!("{}/chunks/{}", replica.url, chunk.chunk_id);
            let result = http
                .get(&url)
                .timeout(config.chunk_timeout)
                .send()
                .await;
            let response = match result {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::warn!("replica {} returned {}", replica.node_id, r.status());
                    *failures.entry(replica.url.clone()).or_insert(0) += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("replica {} unreachable: {}", replica.node_id, e);
                    *failures.entry(replica.url.clone()).or_insert(0) += 1;
                    continue;
                }
            };
            let bytes = match response.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!("read from {} failed: {}", replica.node_id, e);
                    *failures.entry(replica.url.clone()).or_insert(0) += 1;
                    continue;
                }
            };
            if sha256_hex(&bytes) != expected {
                tracing::warn!(
                    "replica {} served corrupt bytes for chunk {}",
                    replica.node_id,
                    chunk.chunk_id
                );
                saw_mismatch = true;
                *failures.entry(replica.url.clone()).or_insert(0) += 1;
                continue;
            }
            return Ok(bytes);
        }
    }

    if saw_mismatch {
        Err(DfsError::Corrupted(chunk.chunk_id))
    } else {
        Err(DfsError::Unreachable(format!(
            "all replicas of chunk {} failed",
            chunk.chunk_id
        )))
    }
}

// ============================================================
// WIRE PLUMBING
// ============================================================

fn unreachable_err(e: reqwest::Error) -> DfsError {
    DfsError::Unreachable(e.to_string())
}

/// The whole remote path percent-encoded as one URL segment, the wire
/// shape the coordinator's file routes expect (`/a` -> `%2Fa`). Reserved
/// characters in path names would otherwise be parsed as URL structure.
pub fn encoded_path_segment(path: &str) -> String {
    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    urlencoding::encode(&normalized).into_owned()
}

/// The cluster's worker id convention, recovered from a worker URL.
pub fn node_id_from_url(url: &str) -> String {
    let stripped = url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/');
    match stripped.rsplit_once(':') {
        Some((host, port)) => format!("node-{}-{}", host, port),
        None => format!("node-{}", stripped),
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, DfsError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| DfsError::Internal(e.into()))
}

/// Reconstructs a typed error from a coordinator/worker error payload, so
/// the retry loop reacts to the kind, not the status text.
async fn error_from_response(response: reqwest::Response) -> DfsError {
    let status = response.status();
    let payload = response.json::<ErrorResponse>().await.ok();
    error_from_payload(status.as_u16(), payload)
}

pub fn error_from_payload(status: u16, payload: Option<ErrorResponse>) -> DfsError {
    let detail = payload
        .as_ref()
        .map(|p| p.detail.clone())
        .unwrap_or_else(|| format!("http status {}", status));
    match payload.map(|p| p.error).as_deref() {
        Some("path-conflict") => DfsError::PathConflict(detail),
        Some("session-expired") => DfsError::SessionExpired(Uuid::nil()),
        Some("not-found") => DfsError::NotFound(detail),
        Some("lease-held") => DfsError::LeaseHeld(detail),
        Some("corrupted") => DfsError::Corrupted(Uuid::nil()),
        Some("invalid") => DfsError::Invalid(detail),
        // no-capacity, no-space, unreachable and internal are all worth
        // another attempt after backoff.
        _ => DfsError::Internal(anyhow::anyhow!(detail)),
    }
}

fn chunk_size_of(file: &FileRecord) -> u64 {
    file.chunks.first().map(|c| c.size).unwrap_or(0)
}
