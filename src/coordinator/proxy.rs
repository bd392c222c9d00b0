//! Chunk Proxy
//!
//! Coordinator-hosted pass-through for clients that cannot reach workers
//! directly (NAT, browser contexts). PUT forwards the body to the first
//! target worker with a fan-out chain for the rest; GET walks live replicas
//! round-robin and streams the first success back.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::DfsError;
use crate::shared::protocol::{
    ProxyGetQuery, ProxyPutQuery, ProxyPutResponse, WorkerPutResponse, HEADER_CHECKSUM,
};

use super::store::MetadataStore;

/// Round-robin cursor for replica selection on proxied reads.
#[derive(Default)]
pub struct ProxyState {
    read_cursor: AtomicUsize,
}

impl ProxyState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_start(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.read_cursor.fetch_add(1, Ordering::Relaxed) % len
    }
}

pub async fn handle_proxy_put(
    Extension(store): Extension<Arc<MetadataStore>>,
    Extension(client): Extension<reqwest::Client>,
    Path(chunk_id): Path<Uuid>,
    Query(query): Query<ProxyPutQuery>,
    body: Bytes,
) -> Result<Json<ProxyPutResponse>, DfsError> {
    let node_ids: Vec<String> = query
        .target_nodes
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if node_ids.is_empty() {
        return Err(DfsError::Invalid("target_nodes is empty".to_string()));
    }

    let mut urls = Vec::with_capacity(node_ids.len());
    for node_id in &node_ids {
        match store.get_node(node_id).await {
            Ok(node) => urls.push(node.url()),
            Err(_) => tracing::warn!("proxy put: unknown target worker {}", node_id),
        }
    }
    if urls.is_empty() {
        return Err(DfsError::NotFound("no reachable target workers".to_string()));
    }

    let primary = &urls[0];
    let mut request = client
        .put(format!("{}/chunks/{}", primary, chunk_id))
        .timeout(std::time::Duration::from_secs(120));
    if urls.len() > 1 {
        request = request.query(&[("replicate_to", urls[1..].join("|"))]);
    }

    let size = body.len() as u64;
    let response = request
        .body(body)
        .send()
        .await
        .map_err(|e| DfsError::Unreachable(format!("{}: {}", primary, e)))?;
    if !response.status().is_success() {
        return Err(DfsError::Unreachable(format!(
            "worker {} returned {}",
            primary,
            response.status()
        )));
    }

    let stored: WorkerPutResponse = response
        .json()
        .await
        .map_err(|e| DfsError::Internal(e.into()))?;
    tracing::info!(
        "proxied chunk {} to {} worker(s)",
        chunk_id,
        stored.nodes.len()
    );

    Ok(Json(ProxyPutResponse {
        status: "stored".to_string(),
        chunk_id,
        size,
        nodes: stored.nodes,
    }))
}

pub async fn handle_proxy_get(
    Extension(store): Extension<Arc<MetadataStore>>,
    Extension(client): Extension<reqwest::Client>,
    Extension(proxy): Extension<Arc<ProxyState>>,
    Path(chunk_id): Path<Uuid>,
    Query(query): Query<ProxyGetQuery>,
) -> Result<Response, DfsError> {
    let file = store.get_file(&query.file_path).await?;
    let Some(chunk) = file.chunks.iter().find(|c| c.chunk_id == chunk_id) else {
        return Err(DfsError::NotFound(format!(
            "chunk {} not in {}",
            chunk_id, query.file_path
        )));
    };
    if chunk.replicas.is_empty() {
        return Err(DfsError::NotFound(format!(
            "no live replicas for chunk {}",
            chunk_id
        )));
    }

    let start = proxy.next_start(chunk.replicas.len());
    for offset in 0..chunk.replicas.len() {
        let replica = &chunk.replicas[(start + offset) % chunk.replicas.len()];
        let url = format!("{}/chunks/{}", replica.url, chunk_id);
        let response = match client
            .get(&url)
            .timeout(std::time::Duration::from_secs(120))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!("proxy get: {} returned {}", replica.node_id, r.status());
                continue;
            }
            Err(e) => {
                tracing::warn!("proxy get: {} unreachable: {}", replica.node_id, e);
                continue;
            }
        };

        let checksum = response
            .headers()
            .get(HEADER_CHECKSUM)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("proxy get: read from {} failed: {}", replica.node_id, e);
                continue;
            }
        };

        let mut builder = Response::builder()
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, bytes.len());
        if let Some(checksum) = checksum {
            builder = builder.header(HEADER_CHECKSUM, checksum);
        }
        return builder
            .body(axum::body::Body::from(bytes))
            .map_err(|e| DfsError::Internal(e.into()));
    }

    Err(DfsError::Unreachable(format!(
        "all replicas of chunk {} failed",
        chunk_id
    )))
}
