//! Write-Ahead Journal
//!
//! Every metadata mutation is appended here and flushed to disk before the
//! coordinator acknowledges it. On restart the in-memory state is rebuilt
//! by loading the last snapshot and replaying the journal tail. When the
//! journal grows past a threshold it is compacted: the full state is
//! written to a fresh snapshot (temp file then rename, so a crash mid-write
//! leaves the old snapshot intact) and the journal is truncated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::shared::types::{FileRecord, Lease, UploadSession, WorkerRecord};

const SNAPSHOT_FILE: &str = "snapshot.json";
const JOURNAL_FILE: &str = "wal.log";

/// The coordinator's full durable state. Derived indexes are rebuilt on
/// load and never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    pub files: HashMap<Uuid, FileRecord>,
    pub sessions: HashMap<Uuid, UploadSession>,
    pub nodes: HashMap<String, WorkerRecord>,
    pub leases: HashMap<Uuid, Lease>,
}

/// One journaled mutation. Records carry whole values so replay is a plain
/// map insert or remove, independent of the logic that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalRecord {
    PutFile { file: FileRecord },
    RemoveFile { file_id: Uuid },
    PutSession { session: UploadSession },
    RemoveSession { file_id: Uuid },
    PutNode { node: WorkerRecord },
    RemoveNode { node_id: String },
    PutLease { lease: Lease },
    RemoveLease { lease_id: Uuid },
}

impl JournalRecord {
    pub fn apply(self, state: &mut State) {
        match self {
            Self::PutFile { file } => {
                state.files.insert(file.file_id, file);
            }
            Self::RemoveFile { file_id } => {
                state.files.remove(&file_id);
            }
            Self::PutSession { session } => {
                state.sessions.insert(session.file_id, session);
            }
            Self::RemoveSession { file_id } => {
                state.sessions.remove(&file_id);
            }
            Self::PutNode { node } => {
                state.nodes.insert(node.node_id.clone(), node);
            }
            Self::RemoveNode { node_id } => {
                state.nodes.remove(&node_id);
            }
            Self::PutLease { lease } => {
                state.leases.insert(lease.lease_id, lease);
            }
            Self::RemoveLease { lease_id } => {
                state.leases.remove(&lease_id);
            }
        }
    }
}

pub struct Wal {
    dir: PathBuf,
    journal: File,
    records_since_snapshot: usize,
}

impl Wal {
    /// Opens (creating if needed) the journal under `dir` and returns the
    /// reconstructed state: snapshot, then journal replay.
    pub fn open(dir: &Path) -> Result<(Self, State)> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating metadata dir {}", dir.display()))?;

        let mut state = State::default();

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            let file = File::open(&snapshot_path)?;
            state = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("reading snapshot {}", snapshot_path.display()))?;
        }

        let journal_path = dir.join(JOURNAL_FILE);
        let mut replayed = 0usize;
        if journal_path.exists() {
            let raw = std::fs::read_to_string(&journal_path)?;
            let mut good_prefix = 0usize;
            for line in raw.lines() {
                if line.is_empty() {
                    good_prefix += 1;
                    continue;
                }
                match serde_json::from_str::<JournalRecord>(line) {
                    Ok(record) => {
                        record.apply(&mut state);
                        replayed += 1;
                        good_prefix += line.len() + 1;
                    }
                    Err(e) => {
                        // A torn tail write from a crash. Drop it and
                        // everything after it, then keep appending from the
                        // last good record.
                        tracing::warn!("truncating journal at malformed record: {}", e);
                        let file = OpenOptions::new().write(true).open(&journal_path)?;
                        file.set_len(good_prefix as u64)?;
                        file.sync_data()?;
                        break;
                    }
                }
            }
        }

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)?;

        tracing::info!(
            "metadata store loaded: {} files, {} nodes, {} journal records replayed",
            state.files.len(),
            state.nodes.len(),
            replayed
        );

        Ok((
            Self {
                dir: dir.to_path_buf(),
                journal,
                records_since_snapshot: replayed,
            },
            state,
        ))
    }

    /// Appends one record and flushes it to disk before returning.
    pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.journal.write_all(line.as_bytes())?;
        self.journal.write_all(b"\n")?;
        self.journal.flush()?;
        self.journal.sync_data()?;
        self.records_since_snapshot += 1;
        Ok(())
    }

    pub fn should_compact(&self, threshold: usize) -> bool {
        self.records_since_snapshot >= threshold.max(1)
    }

    /// Writes the full state as a new snapshot and truncates the journal.
    pub fn compact(&mut self, state: &State) -> Result<()> {
        let snapshot_path = self.dir.join(SNAPSHOT_FILE);
        let tmp_path = self.dir.join(format!("{}.tmp", SNAPSHOT_FILE));

        let mut tmp = File::create(&tmp_path)?;
        serde_json::to_writer(&mut tmp, state)?;
        tmp.flush()?;
        tmp.sync_data()?;
        std::fs::rename(&tmp_path, &snapshot_path)?;

        let journal_path = self.dir.join(JOURNAL_FILE);
        self.journal = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&journal_path)?;
        self.records_since_snapshot = 0;

        tracing::info!("journal compacted into {}", snapshot_path.display());
        Ok(())
    }
}
