//! Worker API Handlers
//!
//! The chunk transfer surface: PUT with optional fan-out to peers, GET with
//! digest verification, idempotent DELETE, the pull-based replicate
//! endpoint used by the coordinator's repair loop, and the health ping.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::shared::error::DfsError;
use crate::shared::protocol::{
    ReplicateChunkRequest, ReplicateChunkResponse, WorkerDeleteResponse, WorkerHealthResponse,
    WorkerPutQuery, WorkerPutResponse, HEADER_CHECKSUM,
};
use crate::shared::retry::{retry_async, RetryPolicy};

use super::chunkstore::ChunkStore;
use super::heartbeat::disk_usage;

pub async fn handle_put_chunk(
    Extension(store): Extension<Arc<ChunkStore>>,
    Extension(client): Extension<reqwest::Client>,
    Path(chunk_id): Path<Uuid>,
    Query(query): Query<WorkerPutQuery>,
    body: Bytes,
) -> Result<Json<WorkerPutResponse>, DfsError> {
    let stored = store.put(chunk_id, body.clone()).await?;

    let mut nodes = vec![store.node_id().to_string()];
    let mut failures = Vec::new();

    // Parallel fan-out: peers that fail are reported, not fatal; the
    // repair loop rebuilds whatever is missing.
    let peers: Vec<String> = query
        .replicate_to
        .as_deref()
        .unwrap_or_default()
        .split('|')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !peers.is_empty() {
        let (acked, failed) = fan_out(&client, chunk_id, &body, peers).await;
        nodes.extend(acked);
        failures = failed;
    }

    Ok(Json(WorkerPutResponse {
        status: "stored".to_string(),
        chunk_id,
        size: stored.size,
        checksum: stored.checksum,
        nodes,
        failures,
    }))
}

/// PUTs the body to every peer concurrently. Returns the worker ids that
/// acknowledged and the URLs that failed.
async fn fan_out(
    client: &reqwest::Client,
    chunk_id: Uuid,
    body: &Bytes,
    peers: Vec<String>,
) -> (Vec<String>, Vec<String>) {
    let mut join_set = JoinSet::new();
    for peer in peers {
        let client = client.clone();
        let body = body.clone();
        join_set.spawn(async move {
            let result = retry_async(
                &RetryPolicy::internal(),
                |_: &anyhow::Error| true,
                || {
                    let client = client.clone();
                    let body = body.clone();
                    let url = format!("{}/chunks/{}", peer, chunk_id);
                    async move {
                        let response = client
                            .put(url)
                            .body(body)
                            .timeout(std::time::Duration::from_secs(120))
                            .send()
                            .await?;
                        if !response.status().is_success() {
                            anyhow::bail!("peer returned {}", response.status());
                        }
                        let ack: WorkerPutResponse = response.json().await?;
                        Ok::<_, anyhow::Error>(ack.nodes)
                    }
                },
            )
            .await;
            (peer, result)
        });
    }

    let mut acked = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Ok(peer_nodes))) => acked.extend(peer_nodes),
            Ok((peer, Err(e))) => {
                tracing::warn!("fan-out of chunk {} to {} failed: {}", chunk_id, peer, e);
                failed.push(peer);
            }
            Err(e) => tracing::error!("fan-out task panicked: {}", e),
        }
    }
    (acked, failed)
}

pub async fn handle_get_chunk(
    Extension(store): Extension<Arc<ChunkStore>>,
    Path(chunk_id): Path<Uuid>,
) -> Result<Response, DfsError> {
    let (bytes, checksum) = store.get(chunk_id).await?;
    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(HEADER_CHECKSUM, checksum)
        .body(axum::body::Body::from(bytes))
        .map_err(|e| DfsError::Internal(e.into()))
}

pub async fn handle_delete_chunk(
    Extension(store): Extension<Arc<ChunkStore>>,
    Path(chunk_id): Path<Uuid>,
) -> Result<Json<WorkerDeleteResponse>, DfsError> {
    store.delete(chunk_id).await?;
    Ok(Json(WorkerDeleteResponse {
        status: "deleted".to_string(),
        chunk_id,
    }))
}

/// Repair entry point: this worker acts as the client, pushing its local
/// copy to the destination worker.
pub async fn handle_replicate_chunk(
    Extension(store): Extension<Arc<ChunkStore>>,
    Extension(client): Extension<reqwest::Client>,
    Path(chunk_id): Path<Uuid>,
    Json(req): Json<ReplicateChunkRequest>,
) -> Result<Json<ReplicateChunkResponse>, DfsError> {
    let (bytes, _) = store.get(chunk_id).await?;

    let destination = req.destination_url.trim_end_matches('/').to_string();
    retry_async(
        &RetryPolicy::internal(),
        |_: &anyhow::Error| true,
        || {
            let client = client.clone();
            let bytes = bytes.clone();
            let url = format!("{}/chunks/{}", destination, chunk_id);
            async move {
                let response = client
                    .put(url)
                    .body(bytes)
                    .timeout(std::time::Duration::from_secs(120))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    anyhow::bail!("destination returned {}", response.status());
                }
                Ok::<_, anyhow::Error>(())
            }
        },
    )
    .await
    .map_err(|e| DfsError::Unreachable(format!("{}: {}", destination, e)))?;

    tracing::info!("replicated chunk {} to {}", chunk_id, destination);
    Ok(Json(ReplicateChunkResponse {
        status: "replicated".to_string(),
        chunk_id,
    }))
}

pub async fn handle_worker_health(
    Extension(store): Extension<Arc<ChunkStore>>,
) -> Json<WorkerHealthResponse> {
    let (free_space, total_space) = disk_usage(store.root());
    Json(WorkerHealthResponse {
        status: "ok".to_string(),
        node_id: store.node_id().to_string(),
        free_space,
        total_space,
        chunk_count: store.chunk_count(),
    })
}
