//! Heartbeat Emitter
//!
//! Posts this worker's identity, disk stats and full chunk inventory to the
//! coordinator every interval. A failed post never crashes the worker: the
//! delay backs off exponentially (capped at a minute) until the coordinator
//! answers again, then snaps back to the configured cadence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::Disks;
use tokio::sync::watch;

use crate::shared::protocol::{HeartbeatRequest, API_PREFIX, ENDPOINT_HEARTBEAT};

use super::chunkstore::ChunkStore;

pub struct HeartbeatEmitter {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub rack: Option<String>,
    pub metadata_url: String,
    pub interval: Duration,
}

impl HeartbeatEmitter {
    pub async fn run(
        self,
        store: Arc<ChunkStore>,
        client: reqwest::Client,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let url = format!(
            "{}{}{}",
            self.metadata_url.trim_end_matches('/'),
            API_PREFIX,
            ENDPOINT_HEARTBEAT
        );
        tracing::info!(
            "heartbeat emitter for {} -> {} every {:?}",
            self.node_id,
            url,
            self.interval
        );

        let mut delay = self.interval;
        let mut consecutive_failures = 0u32;

        // First report goes out immediately so the coordinator can place
        // chunks on a fresh worker without waiting a full interval.
        loop {
            if self.send_heartbeat(&store, &client, &url).await {
                consecutive_failures = 0;
                delay = self.interval;
            } else {
                consecutive_failures += 1;
                delay = (delay * 2).min(Duration::from_secs(60));
                if consecutive_failures >= 3 {
                    tracing::error!(
                        "{} consecutive heartbeat failures, retrying every {:?}",
                        consecutive_failures,
                        delay
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    tracing::info!("heartbeat emitter shutting down");
                    break;
                }
            }
        }
    }

    async fn send_heartbeat(
        &self,
        store: &Arc<ChunkStore>,
        client: &reqwest::Client,
        url: &str,
    ) -> bool {
        let (free_space, total_space) = disk_usage(store.root());
        let chunk_ids = store.chunk_ids();
        tracing::debug!("reporting {} chunks in heartbeat", chunk_ids.len());

        let payload = HeartbeatRequest {
            node_id: self.node_id.clone(),
            host: self.host.clone(),
            port: self.port,
            rack: self.rack.clone(),
            free_space,
            total_space,
            chunk_ids,
        };

        match client
            .post(url)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("heartbeat rejected with {}", response.status());
                false
            }
            Err(e) => {
                tracing::warn!("heartbeat to {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Free and total bytes of the mount holding `path`. Longest matching
/// mount point wins; unknown mounts report zero rather than guessing.
pub fn disk_usage(path: &Path) -> (u64, u64) {
    let disks = Disks::new_with_refreshed_list();
    let mut best: Option<(usize, u64, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let depth = mount.components().count();
            if best.map_or(true, |(d, _, _)| depth > d) {
                best = Some((depth, disk.available_space(), disk.total_space()));
            }
        }
    }
    match best {
        Some((_, free, total)) => (free, total),
        None => (0, 0),
    }
}

/// Hourly full-directory scrub: re-verifies every digest, quarantines rot,
/// and reconciles the inventory cache with out-of-band changes.
pub async fn run_scrub_loop(store: Arc<ChunkStore>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
    // Skip the immediate tick; open() already scanned.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let count = store.clone().scan().await;
                tracing::info!("scrub complete, {} chunks healthy", count);
            }
            _ = shutdown.changed() => {
                tracing::info!("scrub loop shutting down");
                break;
            }
        }
    }
}
