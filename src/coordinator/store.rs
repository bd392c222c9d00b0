//! Metadata Store
//!
//! The single source of truth for the namespace, placement and worker
//! liveness. All mutations run under one writer lock and are journaled to
//! the WAL before the caller sees an acknowledgement; reads clone a
//! consistent snapshot. Nothing outside this module mutates metadata.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DfsConfig;
use crate::shared::error::DfsError;
use crate::shared::protocol::{
    ChunkCommitInfo, ChunkTarget, CommitRequest, CommitResponse, HealthDetails, HeartbeatRequest,
    LeaseGrant, StatsResponse, UploadInitRequest, UploadInitResponse,
};
use crate::shared::types::{
    chunk_count, chunk_len, now_ms, ChunkRecord, ChunkState, FileRecord, Lease, NodeState,
    ReplicaPlacement, SessionChunk, UploadSession, WorkerRecord,
};

use super::placement::PlacementPolicy;
use super::wal::{JournalRecord, State, Wal};

pub struct MetadataStore {
    inner: RwLock<Inner>,
    policy: PlacementPolicy,
    config: DfsConfig,
}

struct Inner {
    state: State,
    /// chunk id -> owning file id. Rebuilt on load, never persisted.
    chunk_index: HashMap<Uuid, Uuid>,
    wal: Wal,
}

impl Inner {
    /// Journal first, then apply: replay is guaranteed to reproduce exactly
    /// what the live mutation did.
    fn commit_record(&mut self, record: JournalRecord) -> Result<()> {
        self.wal.append(&record)?;
        record.apply(&mut self.state);
        Ok(())
    }

    fn maybe_compact(&mut self, threshold: usize) {
        if self.wal.should_compact(threshold) {
            if let Err(e) = self.wal.compact(&self.state) {
                tracing::error!("journal compaction failed: {}", e);
            }
        }
    }

    fn index_file_chunks(&mut self, file: &FileRecord) {
        for chunk in &file.chunks {
            self.chunk_index.insert(chunk.chunk_id, file.file_id);
        }
    }

    fn drop_file_chunks(&mut self, file: &FileRecord) {
        for chunk in &file.chunks {
            self.chunk_index.remove(&chunk.chunk_id);
        }
    }

    fn live_file_by_path(&self, path: &str) -> Option<&FileRecord> {
        self.state
            .files
            .values()
            .find(|f| f.is_live() && f.path == path)
    }

    fn lease_on(&self, path: &str, now: u64) -> Option<&Lease> {
        self.state
            .leases
            .values()
            .find(|l| l.path == path && l.expires_at_ms > now)
    }

    fn url_for(&self, node_id: &str) -> String {
        if let Some(node) = self.state.nodes.get(node_id) {
            return node.url();
        }
        // Fall back to the `node-<host>-<port>` naming convention for
        // workers the coordinator has not heard from yet.
        if let Some(rest) = node_id.strip_prefix("node-") {
            if let Some((host, port)) = rest.rsplit_once('-') {
                if port.parse::<u16>().is_ok() {
                    return format!("http://{}:{}", host, port);
                }
            }
        }
        format!("http://{}", node_id)
    }
}

/// Chunk removals a delete or GC pass should fire at workers:
/// (chunk id, worker base URLs holding it).
pub type ChunkRemovals = Vec<(Uuid, Vec<String>)>;

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub path: String,
    pub permanent: bool,
    pub removals: ChunkRemovals,
}

impl MetadataStore {
    pub fn open(dir: &Path, config: DfsConfig) -> Result<Self> {
        let (wal, state) = Wal::open(dir)?;
        let mut inner = Inner {
            state,
            chunk_index: HashMap::new(),
            wal,
        };
        let files: Vec<FileRecord> = inner.state.files.values().cloned().collect();
        for file in &files {
            inner.index_file_chunks(file);
        }
        let policy = PlacementPolicy::new(config.replication_factor, config.min_free_ratio);
        Ok(Self {
            inner: RwLock::new(inner),
            policy,
            config,
        })
    }

    pub fn config(&self) -> &DfsConfig {
        &self.config
    }

    // ============================================================
    // UPLOADS
    // ============================================================

    pub async fn upload_init(
        &self,
        req: UploadInitRequest,
    ) -> Result<UploadInitResponse, DfsError> {
        let path = normalize_path(&req.path)?;
        let mut inner = self.inner.write().await;
        let now = now_ms();

        if inner.lease_on(&path, now).is_some() {
            return Err(DfsError::LeaseHeld(path));
        }

        let session_timeout = self.config.session_timeout.as_millis() as u64;
        let live_conflict = inner.live_file_by_path(&path).is_some();
        let writer_in_flight = inner
            .state
            .sessions
            .values()
            .any(|s| s.path == path && !s.expired(now, session_timeout));
        if (live_conflict || writer_in_flight) && !req.overwrite {
            return Err(DfsError::PathConflict(path));
        }

        let workers: Vec<WorkerRecord> = inner.state.nodes.values().cloned().collect();
        let active = workers
            .iter()
            .filter(|w| w.state == NodeState::Active)
            .count();
        if active < self.config.replication_factor {
            return Err(DfsError::NoCapacity {
                active,
                required: self.config.replication_factor,
            });
        }

        let chunk_size = self.config.chunk_size;
        let count = chunk_count(req.size, chunk_size);

        let mut session_chunks = Vec::with_capacity(count as usize);
        let mut plan = Vec::with_capacity(count as usize);
        let mut chunk_records = Vec::with_capacity(count as usize);
        for i in 0..count {
            let len = chunk_len(req.size, chunk_size, i);
            let targets = self.policy.select_targets(&workers, i, len)?;
            let chunk_id = Uuid::new_v4();

            plan.push(ChunkTarget {
                chunk_id,
                size: len,
                targets: targets.iter().map(|w| w.url()).collect(),
            });
            session_chunks.push(SessionChunk {
                chunk_id,
                seq_index: i as u32,
                size: len,
                target_nodes: targets.iter().map(|w| w.node_id.clone()).collect(),
            });
            chunk_records.push(ChunkRecord {
                chunk_id,
                seq_index: i as u32,
                size: len,
                checksum: None,
                replicas: Vec::new(),
            });
        }

        let file_id = Uuid::new_v4();
        let file = FileRecord {
            file_id,
            path: path.clone(),
            size: req.size,
            created_at_ms: now,
            modified_at_ms: now,
            chunks: chunk_records,
            published: false,
            is_deleted: false,
            deleted_at_ms: None,
            compressed: req.compressed,
            original_size: req.original_size,
        };
        let session = UploadSession {
            file_id,
            path,
            size: req.size,
            chunk_size,
            chunks: session_chunks,
            created_at_ms: now,
            overwrite: req.overwrite,
        };

        inner.commit_record(JournalRecord::PutFile { file: file.clone() })?;
        inner.commit_record(JournalRecord::PutSession { session })?;
        inner.index_file_chunks(&file);
        inner.maybe_compact(self.config.wal_compact_threshold);

        tracing::info!(
            "upload session opened: {} ({} bytes, {} chunks)",
            file.path,
            req.size,
            count
        );

        Ok(UploadInitResponse {
            file_id,
            chunk_size,
            chunks: plan,
        })
    }

    pub async fn commit(&self, req: CommitRequest) -> Result<CommitResponse, DfsError> {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        let session_timeout = self.config.session_timeout.as_millis() as u64;

        let Some(session) = inner.state.sessions.get(&req.file_id).cloned() else {
            return Err(DfsError::SessionExpired(req.file_id));
        };
        if session.expired(now, session_timeout) {
            self.abandon_session_locked(&mut inner, &session)?;
            return Err(DfsError::SessionExpired(req.file_id));
        }

        let mut by_id: HashMap<Uuid, &ChunkCommitInfo> = HashMap::new();
        for info in &req.chunks {
            if by_id.insert(info.chunk_id, info).is_some() {
                return Err(DfsError::Invalid(format!(
                    "chunk {} reported twice in commit",
                    info.chunk_id
                )));
            }
        }
        if by_id.len() != session.chunks.len() {
            return Err(DfsError::Invalid(format!(
                "commit covers {} chunks, session planned {}",
                by_id.len(),
                session.chunks.len()
            )));
        }
        for planned in &session.chunks {
            let Some(info) = by_id.get(&planned.chunk_id) else {
                return Err(DfsError::Invalid(format!(
                    "planned chunk {} missing from commit",
                    planned.chunk_id
                )));
            };
            if info.nodes.is_empty() {
                return Err(DfsError::Invalid(format!(
                    "chunk {} has no reporting workers",
                    planned.chunk_id
                )));
            }
        }

        let Some(mut file) = inner.state.files.get(&req.file_id).cloned() else {
            return Err(DfsError::SessionExpired(req.file_id));
        };

        // Fill checksums and make sure every reporting worker has a
        // placement; placements already attached by heartbeats are kept.
        for chunk in &mut file.chunks {
            let info = by_id[&chunk.chunk_id];
            chunk.checksum = Some(info.checksum.to_lowercase());
            for node_id in &info.nodes {
                if !chunk.replicas.iter().any(|r| &r.node_id == node_id) {
                    let url = inner.url_for(node_id);
                    // Only the client's word so far; the worker's next
                    // inventory report confirms bytes and digest.
                    chunk.replicas.push(ReplicaPlacement {
                        node_id: node_id.clone(),
                        url,
                        state: ChunkState::Pending,
                        last_confirmed_ms: None,
                        checksum_verified: false,
                    });
                }
            }
        }

        // Overwrite publishes the new record and soft-deletes the old one
        // in the same journal batch.
        if let Some(old) = inner.live_file_by_path(&session.path).cloned() {
            if !session.overwrite {
                return Err(DfsError::PathConflict(session.path));
            }
            let mut old = old;
            old.is_deleted = true;
            old.deleted_at_ms = Some(now);
            inner.commit_record(JournalRecord::PutFile { file: old })?;
        }

        file.published = true;
        file.modified_at_ms = now;
        inner.commit_record(JournalRecord::PutFile { file: file.clone() })?;
        inner.commit_record(JournalRecord::RemoveSession {
            file_id: req.file_id,
        })?;
        inner.maybe_compact(self.config.wal_compact_threshold);

        tracing::info!(
            "committed {} ({} chunks, {} bytes)",
            file.path,
            file.chunks.len(),
            file.size
        );

        Ok(CommitResponse {
            status: "committed".to_string(),
            file_id: req.file_id,
        })
    }

    fn abandon_session_locked(
        &self,
        inner: &mut Inner,
        session: &UploadSession,
    ) -> Result<(), DfsError> {
        if let Some(file) = inner.state.files.get(&session.file_id).cloned() {
            if !file.published {
                inner.drop_file_chunks(&file);
                inner.commit_record(JournalRecord::RemoveFile {
                    file_id: file.file_id,
                })?;
            }
        }
        inner.commit_record(JournalRecord::RemoveSession {
            file_id: session.file_id,
        })?;
        tracing::info!("abandoned upload session for {}", session.path);
        Ok(())
    }

    // ============================================================
    // NAMESPACE READS
    // ============================================================

    pub async fn list_files(
        &self,
        prefix: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<FileRecord> {
        let inner = self.inner.read().await;
        let mut files: Vec<FileRecord> = inner
            .state
            .files
            .values()
            .filter(|f| f.is_live())
            .filter(|f| prefix.map_or(true, |p| f.path.starts_with(p)))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.into_iter().skip(offset).take(limit).collect()
    }

    /// Full metadata for a live path, with placements restricted to
    /// active workers and non-corrupted copies.
    pub async fn get_file(&self, path: &str) -> Result<FileRecord, DfsError> {
        let path = normalize_path(path)?;
        let inner = self.inner.read().await;
        let Some(file) = inner.live_file_by_path(&path) else {
            return Err(DfsError::NotFound(path));
        };
        let mut file = file.clone();
        for chunk in &mut file.chunks {
            chunk.replicas.retain(|r| {
                matches!(r.state, ChunkState::Pending | ChunkState::Committed)
                    && inner
                        .state
                        .nodes
                        .get(&r.node_id)
                        .is_some_and(|n| n.state == NodeState::Active)
            });
        }
        Ok(file)
    }

    // ============================================================
    // DELETE & GC
    // ============================================================

    pub async fn delete_file(
        &self,
        path: &str,
        permanent: bool,
    ) -> Result<DeleteOutcome, DfsError> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().await;
        let now = now_ms();

        if let Some(lease) = inner.lease_on(&path, now) {
            tracing::warn!("delete of {} blocked by lease {}", path, lease.lease_id);
            return Err(DfsError::LeaseHeld(path));
        }

        // Prefer the live record; a permanent delete may also target a
        // record that was only soft-deleted so far.
        let target = inner
            .live_file_by_path(&path)
            .cloned()
            .or_else(|| {
                if !permanent {
                    return None;
                }
                inner
                    .state
                    .files
                    .values()
                    .find(|f| f.published && f.is_deleted && f.path == path)
                    .cloned()
            });

        let Some(mut file) = target else {
            // A soft-deleted record still present makes a repeat delete a
            // success without any state change.
            let already_gone = inner
                .state
                .files
                .values()
                .any(|f| f.published && f.path == path);
            if already_gone {
                return Ok(DeleteOutcome {
                    path,
                    permanent,
                    removals: Vec::new(),
                });
            }
            return Err(DfsError::NotFound(path));
        };

        let removals = if permanent {
            let removals = placements_of(&file);
            inner.drop_file_chunks(&file);
            inner.commit_record(JournalRecord::RemoveFile {
                file_id: file.file_id,
            })?;
            removals
        } else {
            file.is_deleted = true;
            file.deleted_at_ms = Some(now);
            inner.commit_record(JournalRecord::PutFile { file })?;
            Vec::new()
        };
        inner.maybe_compact(self.config.wal_compact_threshold);

        tracing::info!("deleted {} (permanent={})", path, permanent);
        Ok(DeleteOutcome {
            path,
            permanent,
            removals,
        })
    }

    /// Soft-deleted files past the grace period, ready for physical removal.
    pub async fn gc_candidates(&self) -> Vec<FileRecord> {
        let inner = self.inner.read().await;
        let now = now_ms();
        let grace = self.config.gc_grace.as_millis() as u64;
        inner
            .state
            .files
            .values()
            .filter(|f| f.is_deleted)
            .filter(|f| {
                f.deleted_at_ms
                    .map_or(true, |t| now.saturating_sub(t) > grace)
            })
            .cloned()
            .collect()
    }

    pub async fn purge_file(&self, file_id: Uuid) -> Result<ChunkRemovals, DfsError> {
        let mut inner = self.inner.write().await;
        let Some(file) = inner.state.files.get(&file_id).cloned() else {
            return Ok(Vec::new());
        };
        let removals = placements_of(&file);
        inner.drop_file_chunks(&file);
        inner.commit_record(JournalRecord::RemoveFile { file_id })?;
        inner.maybe_compact(self.config.wal_compact_threshold);
        tracing::info!("purged {}", file.path);
        Ok(removals)
    }

    // ============================================================
    // WORKERS & HEARTBEATS
    // ============================================================

    pub async fn heartbeat(&self, req: HeartbeatRequest) -> Result<(), DfsError> {
        let mut inner = self.inner.write().await;
        let now = now_ms();

        let previous = inner.state.nodes.get(&req.node_id).cloned();
        let state = match previous.as_ref().map(|n| n.state) {
            // Only an admin brings a decommissioned worker back.
            Some(NodeState::Decommissioned) => NodeState::Decommissioned,
            _ => NodeState::Active,
        };
        let node = WorkerRecord {
            node_id: req.node_id.clone(),
            host: req.host,
            port: req.port,
            rack: req.rack.or(previous.and_then(|n| n.rack)),
            free_space: req.free_space,
            total_space: req.total_space,
            chunk_count: req.chunk_ids.len() as u64,
            last_heartbeat_ms: now,
            state,
        };
        let node_url = node.url();
        inner.commit_record(JournalRecord::PutNode { node })?;

        // The report is the truth for this worker's placements: promote
        // what it holds, drop what it no longer reports.
        let reported: HashSet<Uuid> = req.chunk_ids.iter().copied().collect();
        let mut orphans = 0usize;
        for chunk_id in &reported {
            if !inner.chunk_index.contains_key(chunk_id) {
                orphans += 1;
            }
        }
        if orphans > 0 {
            tracing::debug!("{} reports {} unknown chunk ids", req.node_id, orphans);
        }

        let file_ids: Vec<Uuid> = inner.state.files.keys().copied().collect();
        for file_id in file_ids {
            let Some(file) = inner.state.files.get(&file_id) else {
                continue;
            };
            let mut file = file.clone();
            let mut changed = false;

            for chunk in &mut file.chunks {
                let held = chunk.replicas.iter().position(|r| r.node_id == req.node_id);
                let in_report = reported.contains(&chunk.chunk_id);
                match (held, in_report) {
                    (Some(i), true) => {
                        // Inventory only lists chunks whose digest the
                        // worker has checked, so a report doubles as
                        // checksum confirmation.
                        let replica = &mut chunk.replicas[i];
                        if replica.state != ChunkState::Committed || !replica.checksum_verified {
                            replica.state = ChunkState::Committed;
                            replica.checksum_verified = true;
                            changed = true;
                        }
                        replica.last_confirmed_ms = Some(now);
                    }
                    (Some(i), false) => {
                        chunk.replicas.remove(i);
                        changed = true;
                    }
                    (None, true) => {
                        chunk.replicas.push(ReplicaPlacement {
                            node_id: req.node_id.clone(),
                            url: node_url.clone(),
                            state: ChunkState::Committed,
                            last_confirmed_ms: Some(now),
                            checksum_verified: true,
                        });
                        changed = true;
                    }
                    (None, false) => {}
                }
            }

            if changed {
                inner.commit_record(JournalRecord::PutFile { file })?;
            }
        }
        inner.maybe_compact(self.config.wal_compact_threshold);

        Ok(())
    }

    pub async fn list_nodes(&self) -> Vec<WorkerRecord> {
        let inner = self.inner.read().await;
        let mut nodes: Vec<WorkerRecord> = inner.state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    pub async fn get_node(&self, node_id: &str) -> Result<WorkerRecord, DfsError> {
        let inner = self.inner.read().await;
        inner
            .state
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| DfsError::NotFound(node_id.to_string()))
    }

    pub async fn decommission_node(&self, node_id: &str) -> Result<(), DfsError> {
        let mut inner = self.inner.write().await;
        let Some(mut node) = inner.state.nodes.get(node_id).cloned() else {
            return Err(DfsError::NotFound(node_id.to_string()));
        };
        node.state = NodeState::Decommissioned;
        inner.commit_record(JournalRecord::PutNode { node })?;
        tracing::info!("worker {} decommissioned", node_id);
        Ok(())
    }

    /// Flips workers past the dead threshold to inactive. Cheap; runs from
    /// the liveness sweep.
    pub async fn mark_dead_workers(&self) -> Result<usize, DfsError> {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        let threshold = self.config.dead_threshold.as_millis() as u64;

        let stale: Vec<WorkerRecord> = inner
            .state
            .nodes
            .values()
            .filter(|n| {
                n.state == NodeState::Active
                    && now.saturating_sub(n.last_heartbeat_ms) > threshold
            })
            .cloned()
            .collect();
        let count = stale.len();
        for mut node in stale {
            tracing::warn!(
                "worker {} missed heartbeats for {} ms, marking inactive",
                node.node_id,
                now.saturating_sub(node.last_heartbeat_ms)
            );
            node.state = NodeState::Inactive;
            inner.commit_record(JournalRecord::PutNode { node })?;
        }
        Ok(count)
    }

    pub async fn expire_sessions(&self) -> Result<usize, DfsError> {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        let timeout = self.config.session_timeout.as_millis() as u64;

        let expired: Vec<UploadSession> = inner
            .state
            .sessions
            .values()
            .filter(|s| s.expired(now, timeout))
            .cloned()
            .collect();
        let count = expired.len();
        for session in expired {
            self.abandon_session_locked(&mut inner, &session)?;
        }
        Ok(count)
    }

    pub async fn expire_leases(&self) -> Result<usize, DfsError> {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        let expired: Vec<Uuid> = inner
            .state
            .leases
            .values()
            .filter(|l| l.expires_at_ms <= now)
            .map(|l| l.lease_id)
            .collect();
        let count = expired.len();
        for lease_id in expired {
            inner.commit_record(JournalRecord::RemoveLease { lease_id })?;
        }
        Ok(count)
    }

    // ============================================================
    // LEASES
    // ============================================================

    pub async fn acquire_lease(
        &self,
        path: &str,
        client_id: Option<String>,
        ttl_ms: u64,
    ) -> Result<LeaseGrant, DfsError> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().await;
        let now = now_ms();

        if inner.lease_on(&path, now).is_some() {
            return Err(DfsError::LeaseHeld(path));
        }

        let lease = Lease {
            lease_id: Uuid::new_v4(),
            path: path.clone(),
            client_id,
            expires_at_ms: now + ttl_ms,
        };
        let grant = LeaseGrant {
            lease_id: lease.lease_id,
            path,
            expires_at_ms: lease.expires_at_ms,
        };
        inner.commit_record(JournalRecord::PutLease { lease })?;
        Ok(grant)
    }

    pub async fn release_lease(&self, lease_id: Uuid) -> Result<(), DfsError> {
        let mut inner = self.inner.write().await;
        if inner.state.leases.contains_key(&lease_id) {
            inner.commit_record(JournalRecord::RemoveLease { lease_id })?;
        }
        Ok(())
    }

    // ============================================================
    // REPAIR SUPPORT & SUMMARIES
    // ============================================================

    /// Snapshot of every published, non-deleted file.
    pub async fn published_files(&self) -> Vec<FileRecord> {
        let inner = self.inner.read().await;
        inner
            .state
            .files
            .values()
            .filter(|f| f.is_live())
            .cloned()
            .collect()
    }

    pub async fn workers(&self) -> Vec<WorkerRecord> {
        let inner = self.inner.read().await;
        inner.state.nodes.values().cloned().collect()
    }

    /// Records the copy the repair loop just scheduled; the next heartbeat
    /// from the destination promotes it to committed.
    pub async fn add_pending_placement(
        &self,
        file_id: Uuid,
        chunk_id: Uuid,
        node: &WorkerRecord,
    ) -> Result<(), DfsError> {
        let mut inner = self.inner.write().await;
        let Some(mut file) = inner.state.files.get(&file_id).cloned() else {
            return Ok(());
        };
        let Some(chunk) = file.chunks.iter_mut().find(|c| c.chunk_id == chunk_id) else {
            return Ok(());
        };
        if chunk.replicas.iter().any(|r| r.node_id == node.node_id) {
            return Ok(());
        }
        chunk.replicas.push(ReplicaPlacement {
            node_id: node.node_id.clone(),
            url: node.url(),
            state: ChunkState::Pending,
            last_confirmed_ms: None,
            checksum_verified: false,
        });
        inner.commit_record(JournalRecord::PutFile { file })?;
        Ok(())
    }

    /// Drops one placement and returns the worker URL that held it, for the
    /// rebalance path that deletes the source copy after the move confirmed.
    pub async fn remove_placement(
        &self,
        file_id: Uuid,
        chunk_id: Uuid,
        node_id: &str,
    ) -> Result<Option<String>, DfsError> {
        let mut inner = self.inner.write().await;
        let Some(mut file) = inner.state.files.get(&file_id).cloned() else {
            return Ok(None);
        };
        let Some(chunk) = file.chunks.iter_mut().find(|c| c.chunk_id == chunk_id) else {
            return Ok(None);
        };
        let Some(pos) = chunk.replicas.iter().position(|r| r.node_id == node_id) else {
            return Ok(None);
        };
        let url = chunk.replicas.remove(pos).url;
        inner.commit_record(JournalRecord::PutFile { file })?;
        Ok(Some(url))
    }

    pub async fn health_details(&self) -> HealthDetails {
        let inner = self.inner.read().await;
        let total_nodes = inner.state.nodes.len();
        let active_nodes = inner
            .state
            .nodes
            .values()
            .filter(|n| n.state == NodeState::Active)
            .count();
        HealthDetails {
            total_nodes,
            active_nodes,
            replication_factor: self.config.replication_factor,
        }
    }

    pub async fn stats(&self) -> StatsResponse {
        let inner = self.inner.read().await;
        let live: Vec<&FileRecord> = inner
            .state
            .files
            .values()
            .filter(|f| f.is_live())
            .collect();
        let active: Vec<&WorkerRecord> = inner
            .state
            .nodes
            .values()
            .filter(|n| n.state == NodeState::Active)
            .collect();
        StatsResponse {
            total_files: live.len(),
            total_chunks: live.iter().map(|f| f.chunks.len()).sum(),
            total_size: live.iter().map(|f| f.size).sum(),
            total_nodes: inner.state.nodes.len(),
            active_nodes: active.len(),
            total_space: active.iter().map(|n| n.total_space).sum(),
            free_space: active.iter().map(|n| n.free_space).sum(),
        }
    }

    pub fn placement_policy(&self) -> &PlacementPolicy {
        &self.policy
    }
}

fn placements_of(file: &FileRecord) -> ChunkRemovals {
    file.chunks
        .iter()
        .map(|c| {
            (
                c.chunk_id,
                c.replicas.iter().map(|r| r.url.clone()).collect(),
            )
        })
        .collect()
}

fn normalize_path(raw: &str) -> Result<String, DfsError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return Err(DfsError::Invalid("empty path".to_string()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}
