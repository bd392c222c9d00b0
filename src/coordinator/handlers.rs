//! Coordinator API Handlers
//!
//! HTTP endpoints exposing the metadata store to clients and workers.
//! Handlers validate at the boundary and delegate to `MetadataStore`;
//! error kinds map to status codes in one place (`shared::error`).

use axum::extract::{Extension, Path, Query};
use axum::Json;
use std::sync::Arc;

use crate::shared::error::DfsError;
use crate::shared::protocol::{
    CommitRequest, CommitResponse, DecommissionResponse, DeleteFileQuery, DeleteFileResponse,
    HealthResponse, HeartbeatRequest, HeartbeatResponse, LeaseGrant, LeaseReleaseResponse,
    LeaseRequest, ListFilesQuery, StatsResponse, UploadInitRequest, UploadInitResponse,
};
use crate::shared::types::{now_ms, FileRecord, WorkerRecord};

use super::gc::delete_chunks_on_workers;
use super::store::MetadataStore;

const DEFAULT_LIST_LIMIT: usize = 1000;
const DEFAULT_LEASE_TTL_MS: u64 = 300_000;

pub async fn handle_upload_init(
    Extension(store): Extension<Arc<MetadataStore>>,
    Json(req): Json<UploadInitRequest>,
) -> Result<Json<UploadInitResponse>, DfsError> {
    let response = store.upload_init(req).await?;
    Ok(Json(response))
}

pub async fn handle_commit(
    Extension(store): Extension<Arc<MetadataStore>>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, DfsError> {
    let response = store.commit(req).await?;
    Ok(Json(response))
}

pub async fn handle_list_files(
    Extension(store): Extension<Arc<MetadataStore>>,
    Query(query): Query<ListFilesQuery>,
) -> Json<Vec<FileRecord>> {
    let files = store
        .list_files(
            query.prefix.as_deref(),
            query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await;
    Json(files)
}

pub async fn handle_get_file(
    Extension(store): Extension<Arc<MetadataStore>>,
    Path(path): Path<String>,
) -> Result<Json<FileRecord>, DfsError> {
    let file = store.get_file(&path).await?;
    Ok(Json(file))
}

pub async fn handle_delete_file(
    Extension(store): Extension<Arc<MetadataStore>>,
    Extension(client): Extension<reqwest::Client>,
    Path(path): Path<String>,
    Query(query): Query<DeleteFileQuery>,
) -> Result<Json<DeleteFileResponse>, DfsError> {
    let outcome = store.delete_file(&path, query.permanent).await?;

    // Physical removal is fire-and-forget; workers delete idempotently and
    // the GC pass retries anything that slips through.
    if !outcome.removals.is_empty() {
        let removals = outcome.removals.clone();
        tokio::spawn(async move {
            delete_chunks_on_workers(&client, &removals).await;
        });
    }

    Ok(Json(DeleteFileResponse {
        status: "deleted".to_string(),
        path: outcome.path,
        permanent: outcome.permanent,
    }))
}

pub async fn handle_heartbeat(
    Extension(store): Extension<Arc<MetadataStore>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, DfsError> {
    tracing::debug!(
        "heartbeat from {} ({} chunks)",
        req.node_id,
        req.chunk_ids.len()
    );
    store.heartbeat(req).await?;
    Ok(Json(HeartbeatResponse {
        status: "ok".to_string(),
    }))
}

pub async fn handle_list_nodes(
    Extension(store): Extension<Arc<MetadataStore>>,
) -> Json<Vec<WorkerRecord>> {
    Json(store.list_nodes().await)
}

pub async fn handle_get_node(
    Extension(store): Extension<Arc<MetadataStore>>,
    Path(node_id): Path<String>,
) -> Result<Json<WorkerRecord>, DfsError> {
    let node = store.get_node(&node_id).await?;
    Ok(Json(node))
}

pub async fn handle_decommission_node(
    Extension(store): Extension<Arc<MetadataStore>>,
    Path(node_id): Path<String>,
) -> Result<Json<DecommissionResponse>, DfsError> {
    store.decommission_node(&node_id).await?;
    Ok(Json(DecommissionResponse {
        status: "decommissioned".to_string(),
        node_id,
    }))
}

pub async fn handle_health(
    Extension(store): Extension<Arc<MetadataStore>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp_ms: now_ms(),
        details: store.health_details().await,
    })
}

pub async fn handle_stats(
    Extension(store): Extension<Arc<MetadataStore>>,
) -> Json<StatsResponse> {
    Json(store.stats().await)
}

pub async fn handle_acquire_lease(
    Extension(store): Extension<Arc<MetadataStore>>,
    Json(req): Json<LeaseRequest>,
) -> Result<Json<LeaseGrant>, DfsError> {
    let ttl_ms = req
        .ttl_seconds
        .map(|s| s * 1000)
        .unwrap_or(DEFAULT_LEASE_TTL_MS);
    let grant = store.acquire_lease(&req.path, req.client_id, ttl_ms).await?;
    Ok(Json(grant))
}

pub async fn handle_release_lease(
    Extension(store): Extension<Arc<MetadataStore>>,
    Path(lease_id): Path<uuid::Uuid>,
) -> Result<Json<LeaseReleaseResponse>, DfsError> {
    store.release_lease(lease_id).await?;
    Ok(Json(LeaseReleaseResponse {
        status: "released".to_string(),
    }))
}
