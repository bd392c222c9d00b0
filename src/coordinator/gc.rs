//! Garbage Collection
//!
//! Physically removes what soft-delete left behind. Once per period the
//! sweep picks every soft-deleted file older than the grace window, sends a
//! best-effort delete to each worker holding one of its chunks, and drops
//! the records. Worker failures are tolerated; whatever survives is caught
//! by the next pass (and stray bytes on a worker stop being reported once
//! deleted there, so heartbeats converge the placement map anyway).

use std::sync::Arc;
use tokio::sync::watch;

use super::store::{ChunkRemovals, MetadataStore};

pub async fn run_gc_loop(store: Arc<MetadataStore>, mut shutdown: watch::Receiver<bool>) {
    let period = store.config().gc_period;
    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; skip it so a restart doesn't purge
    // before workers have re-registered.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_gc_cycle(&store, &client).await;
            }
            _ = shutdown.changed() => {
                tracing::info!("gc loop shutting down");
                break;
            }
        }
    }
}

pub async fn run_gc_cycle(store: &Arc<MetadataStore>, client: &reqwest::Client) -> usize {
    let candidates = store.gc_candidates().await;
    if candidates.is_empty() {
        return 0;
    }
    tracing::info!("gc: {} soft-deleted files past grace", candidates.len());

    let mut purged = 0;
    for file in candidates {
        match store.purge_file(file.file_id).await {
            Ok(removals) => {
                delete_chunks_on_workers(client, &removals).await;
                purged += 1;
            }
            Err(e) => {
                tracing::warn!("gc purge of {} failed: {}", file.path, e);
            }
        }
    }
    purged
}

/// Fire-and-forget chunk deletes. Idempotent on the worker side, so
/// repeating after a partial failure is safe.
pub async fn delete_chunks_on_workers(client: &reqwest::Client, removals: &ChunkRemovals) {
    for (chunk_id, urls) in removals {
        for url in urls {
            let target = format!("{}/chunks/{}", url, chunk_id);
            match client
                .delete(&target)
                .timeout(std::time::Duration::from_secs(10))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::debug!("chunk delete {} returned {}", target, response.status());
                }
                Err(e) => {
                    tracing::debug!("chunk delete {} failed: {}", target, e);
                }
            }
        }
    }
}
