//! Metadata Coordinator Module
//!
//! The single source of truth for the namespace, chunk placement and worker
//! liveness. All metadata mutations are serialized through one writer lock
//! and journaled before acknowledgement, so a restart replays back to the
//! exact pre-crash state.
//!
//! ## Core Mechanisms
//! - **Upload sessions**: init plans chunks and targets, commit publishes;
//!   a session that never commits times out and its provisional record is
//!   purged, leaving only orphan bytes that heartbeats never legitimize.
//! - **Heartbeat registry**: each worker's report is authoritative for its
//!   placements; the newest report always wins.
//! - **Repair**: a background loop counts live replicas per chunk and
//!   copies the most-degraded ones first until R is restored.
//!
//! ## Submodules
//! - **`store`**: The in-memory metadata store behind the writer lock.
//! - **`wal`**: Write-ahead journal, snapshots and replay.
//! - **`placement`**: Deterministic capacity-aware replica selection.
//! - **`repair`**: Under-replication scan and bounded copy scheduling.
//! - **`gc`**: Physical removal of soft-deleted files past grace.
//! - **`sweep`**: Liveness scan, session timeout and lease expiry.
//! - **`handlers`** / **`proxy`**: The HTTP surface.

pub mod gc;
pub mod handlers;
pub mod placement;
pub mod proxy;
pub mod repair;
pub mod store;
pub mod sweep;
pub mod wal;

#[cfg(test)]
mod tests;
