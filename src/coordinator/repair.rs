//! Replica Repair Loop
//!
//! Background reconciliation of the replication factor. Each cycle scans
//! every committed chunk, counts placements on currently-active workers,
//! and schedules copies for the ones below R, most-degraded first. Copies
//! run through the source worker's replicate endpoint, bounded by a
//! semaphore so repair never saturates the cluster's network.
//!
//! With rebalance enabled, a second pass moves placements off workers above
//! average utilization: copy first, and only delete the source copy once a
//! later cycle sees the new placement confirmed by a heartbeat.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::shared::protocol::ReplicateChunkRequest;
use crate::shared::types::{ChunkState, FileRecord, NodeState, WorkerRecord};

use super::store::MetadataStore;

/// One under-replicated chunk, with everything needed to schedule a copy.
#[derive(Debug, Clone)]
pub struct RepairTask {
    pub file_id: Uuid,
    pub chunk_id: Uuid,
    pub size: u64,
    /// How many replicas are missing; higher repairs first.
    pub missing: usize,
    /// URLs of committed copies usable as a source.
    pub source_urls: Vec<String>,
    /// Workers already holding any placement, excluded as destinations.
    pub holders: HashSet<String>,
}

/// Scans the snapshot for chunks whose placement count on active workers
/// is below R. Pending placements count toward the trigger (a scheduled
/// copy is on its way), but only committed ones can serve as a source.
pub fn find_under_replicated(
    files: &[FileRecord],
    workers: &[WorkerRecord],
    replication_factor: usize,
) -> Vec<RepairTask> {
    let active: HashSet<String> = workers
        .iter()
        .filter(|w| w.state == NodeState::Active)
        .map(|w| w.node_id.clone())
        .collect();

    let mut tasks = Vec::new();
    for file in files {
        for chunk in &file.chunks {
            let live = chunk
                .replicas
                .iter()
                .filter(|r| {
                    matches!(r.state, ChunkState::Pending | ChunkState::Committed)
                        && active.contains(&r.node_id)
                })
                .count();
            if live >= replication_factor {
                continue;
            }

            let source_urls: Vec<String> = chunk
                .replicas
                .iter()
                .filter(|r| r.state == ChunkState::Committed && active.contains(&r.node_id))
                .map(|r| r.url.clone())
                .collect();
            tasks.push(RepairTask {
                file_id: file.file_id,
                chunk_id: chunk.chunk_id,
                size: chunk.size,
                missing: replication_factor - live,
                source_urls,
                holders: chunk.replicas.iter().map(|r| r.node_id.clone()).collect(),
            });
        }
    }

    // Chunks one failure away from loss go first.
    tasks.sort_by(|a, b| b.missing.cmp(&a.missing));
    tasks
}

pub async fn run_repair_loop(
    store: Arc<MetadataStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = store.config().repair_period;
    let semaphore = Arc::new(Semaphore::new(store.config().max_concurrent_repairs));
    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_repair_cycle(&store, &client, semaphore.clone()).await;
                if store.config().rebalance {
                    run_rebalance_cycle(&store, &client, semaphore.clone()).await;
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("repair loop shutting down");
                break;
            }
        }
    }
}

pub async fn run_repair_cycle(
    store: &Arc<MetadataStore>,
    client: &reqwest::Client,
    semaphore: Arc<Semaphore>,
) -> usize {
    let files = store.published_files().await;
    let workers = store.workers().await;
    let tasks = find_under_replicated(&files, &workers, store.config().replication_factor);
    if tasks.is_empty() {
        return 0;
    }
    tracing::info!("{} under-replicated chunks found", tasks.len());

    // One copy per chunk per cycle keeps pressure bounded; a chunk missing
    // two replicas gets the second on the next round.
    let mut join_set = JoinSet::new();
    for task in tasks {
        let Some(destination) = store.placement_policy().select_repair_destination(
            &workers,
            &task.holders,
            task.size,
        ) else {
            tracing::debug!(
                "no eligible destination for chunk {}, retrying next cycle",
                task.chunk_id
            );
            continue;
        };
        let Some(source_url) = task.source_urls.first().cloned() else {
            tracing::warn!(
                "chunk {} has no committed replica to copy from",
                task.chunk_id
            );
            continue;
        };

        let store = store.clone();
        let client = client.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            match replicate_chunk(&client, &source_url, task.chunk_id, &destination.url()).await {
                Ok(()) => {
                    if let Err(e) = store
                        .add_pending_placement(task.file_id, task.chunk_id, &destination)
                        .await
                    {
                        tracing::error!("recording repaired placement failed: {}", e);
                        return None;
                    }
                    tracing::info!(
                        "chunk {} re-replicated to {}",
                        task.chunk_id,
                        destination.node_id
                    );
                    Some(())
                }
                Err(e) => {
                    tracing::warn!(
                        "repair copy of chunk {} to {} failed: {}",
                        task.chunk_id,
                        destination.node_id,
                        e
                    );
                    None
                }
            }
        });
    }

    let mut repaired = 0;
    while let Some(result) = join_set.join_next().await {
        if matches!(result, Ok(Some(()))) {
            repaired += 1;
        }
    }
    repaired
}

async fn replicate_chunk(
    client: &reqwest::Client,
    source_url: &str,
    chunk_id: Uuid,
    destination_url: &str,
) -> anyhow::Result<()> {
    let url = format!("{}/chunks/{}/replicate", source_url, chunk_id);
    let response = client
        .post(url)
        .json(&ReplicateChunkRequest {
            destination_url: destination_url.to_string(),
        })
        .timeout(std::time::Duration::from_secs(120))
        .send()
        .await?;
    if !response.status().is_success() {
        anyhow::bail!("replicate returned {}", response.status());
    }
    Ok(())
}

/// Moves data from over-full to under-full workers while preserving R:
/// schedule a copy toward the emptiest eligible worker, then on a later
/// cycle (once the chunk shows more than R committed copies) drop the
/// placement on the fullest holder.
async fn run_rebalance_cycle(
    store: &Arc<MetadataStore>,
    client: &reqwest::Client,
    semaphore: Arc<Semaphore>,
) {
    let files = store.published_files().await;
    let workers = store.workers().await;
    let r = store.config().replication_factor;

    let active: Vec<&WorkerRecord> = workers
        .iter()
        .filter(|w| w.state == NodeState::Active && w.total_space > 0)
        .collect();
    if active.len() <= r {
        return;
    }
    let avg_used: f64 = active
        .iter()
        .map(|w| 1.0 - w.free_ratio())
        .sum::<f64>()
        / active.len() as f64;
    let overloaded: HashSet<String> = active
        .iter()
        .filter(|w| (1.0 - w.free_ratio()) > avg_used + 0.10)
        .map(|w| w.node_id.clone())
        .collect();
    if overloaded.is_empty() {
        return;
    }

    for file in &files {
        for chunk in &file.chunks {
            let committed: Vec<_> = chunk
                .replicas
                .iter()
                .filter(|p| p.state == ChunkState::Committed)
                .collect();

            // Excess copy from an earlier move confirmed: trim the source.
            if committed.len() > r {
                if let Some(victim) = committed
                    .iter()
                    .find(|p| overloaded.contains(&p.node_id))
                    .map(|p| p.node_id.clone())
                {
                    match store
                        .remove_placement(file.file_id, chunk.chunk_id, &victim)
                        .await
                    {
                        Ok(Some(url)) => {
                            let _ = client
                                .delete(format!("{}/chunks/{}", url, chunk.chunk_id))
                                .send()
                                .await;
                            tracing::info!(
                                "rebalance trimmed chunk {} off {}",
                                chunk.chunk_id,
                                victim
                            );
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("rebalance trim failed: {}", e),
                    }
                }
                continue;
            }

            // Exactly R copies with one on an overloaded worker: copy away.
            if committed.len() == r
                && committed.iter().any(|p| overloaded.contains(&p.node_id))
            {
                let holders: HashSet<String> =
                    chunk.replicas.iter().map(|p| p.node_id.clone()).collect();
                let Some(destination) = store.placement_policy().select_repair_destination(
                    &workers,
                    &holders,
                    chunk.size,
                ) else {
                    continue;
                };
                let Some(source) = committed
                    .iter()
                    .find(|p| !overloaded.contains(&p.node_id))
                    .or(committed.first())
                else {
                    continue;
                };

                let _permit = match semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                match replicate_chunk(client, &source.url, chunk.chunk_id, &destination.url())
                    .await
                {
                    Ok(()) => {
                        if let Err(e) = store
                            .add_pending_placement(file.file_id, chunk.chunk_id, &destination)
                            .await
                        {
                            tracing::error!("recording rebalance placement failed: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::debug!("rebalance copy failed: {}", e);
                    }
                }
                // One move per cycle per file is plenty.
                break;
            }
        }
    }
}
