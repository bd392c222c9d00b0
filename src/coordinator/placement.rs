//! Placement Policy
//!
//! Decides which workers receive each chunk. The policy is deterministic
//! given the same snapshot of active workers: workers are sorted by their
//! stable id and walked as a ring starting at `chunk_index mod n`, so
//! consecutive chunks of a file spread across the cluster without any
//! shared state between decisions.

use std::collections::HashSet;

use crate::shared::error::DfsError;
use crate::shared::types::{NodeState, WorkerRecord};

#[derive(Debug, Clone)]
pub struct PlacementPolicy {
    pub replication_factor: usize,
    /// Workers below this free-space ratio are never selected.
    pub min_free_ratio: f64,
}

impl PlacementPolicy {
    pub fn new(replication_factor: usize, min_free_ratio: f64) -> Self {
        Self {
            replication_factor,
            min_free_ratio,
        }
    }

    fn can_host(&self, worker: &WorkerRecord, chunk_size: u64) -> bool {
        worker.state == NodeState::Active
            && worker.free_ratio() >= self.min_free_ratio
            && worker.free_space >= chunk_size
    }

    /// Selects the replica set for chunk `chunk_index` of some file.
    ///
    /// Walks the id-sorted ring of eligible workers starting at
    /// `chunk_index mod n` and takes the first R. If every pick landed on
    /// one rack while another rack is available, the last pick is swapped
    /// for the first worker on a different rack, so at least one replica
    /// survives a rack loss. Workers without rack labels impose nothing.
    pub fn select_targets(
        &self,
        workers: &[WorkerRecord],
        chunk_index: u64,
        chunk_size: u64,
    ) -> Result<Vec<WorkerRecord>, DfsError> {
        let mut eligible: Vec<&WorkerRecord> = workers
            .iter()
            .filter(|w| self.can_host(w, chunk_size))
            .collect();
        eligible.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        if eligible.len() < self.replication_factor {
            return Err(DfsError::NoCapacity {
                active: eligible.len(),
                required: self.replication_factor,
            });
        }

        let n = eligible.len();
        let start = (chunk_index % n as u64) as usize;
        let mut picked: Vec<&WorkerRecord> = (0..self.replication_factor)
            .map(|k| eligible[(start + k) % n])
            .collect();

        if let Some(better) = self.rack_alternative(&picked, &eligible, start) {
            let last = picked.len() - 1;
            picked[last] = better;
        }

        Ok(picked.into_iter().cloned().collect())
    }

    /// A replacement for the last pick on a different rack, if every pick
    /// shares one rack label and the ring holds an alternative.
    fn rack_alternative<'a>(
        &self,
        picked: &[&'a WorkerRecord],
        eligible: &[&'a WorkerRecord],
        start: usize,
    ) -> Option<&'a WorkerRecord> {
        if picked.len() < 2 {
            return None;
        }
        let first_rack = picked[0].rack.as_deref()?;
        if !picked.iter().all(|w| w.rack.as_deref() == Some(first_rack)) {
            return None;
        }

        let n = eligible.len();
        let picked_ids: HashSet<&str> = picked.iter().map(|w| w.node_id.as_str()).collect();
        (0..n)
            .map(|k| eligible[(start + k) % n])
            .find(|w| !picked_ids.contains(w.node_id.as_str()) && w.rack.as_deref() != Some(first_rack))
    }

    /// Destination for a repair copy: an eligible worker that does not
    /// already hold the chunk, preferring the most free bytes.
    pub fn select_repair_destination(
        &self,
        workers: &[WorkerRecord],
        holders: &HashSet<String>,
        chunk_size: u64,
    ) -> Option<WorkerRecord> {
        let mut candidates: Vec<&WorkerRecord> = workers
            .iter()
            .filter(|w| self.can_host(w, chunk_size) && !holders.contains(&w.node_id))
            .collect();
        candidates.sort_by(|a, b| {
            b.free_space
                .cmp(&a.free_space)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        candidates.first().map(|w| (*w).clone())
    }
}
