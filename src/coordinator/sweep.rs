//! Liveness Sweep
//!
//! The cheap housekeeping tick: flips workers past the dead threshold to
//! inactive, abandons timed-out upload sessions (purging their provisional
//! records), and drops expired leases. No I/O beyond the journal.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::store::MetadataStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run_sweep_loop(store: Arc<MetadataStore>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = store.mark_dead_workers().await {
                    tracing::error!("liveness scan failed: {}", e);
                }
                match store.expire_sessions().await {
                    Ok(n) if n > 0 => tracing::info!("abandoned {} upload sessions", n),
                    Ok(_) => {}
                    Err(e) => tracing::error!("session sweep failed: {}", e),
                }
                if let Err(e) = store.expire_leases().await {
                    tracing::error!("lease sweep failed: {}", e);
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("liveness sweep shutting down");
                break;
            }
        }
    }
}
