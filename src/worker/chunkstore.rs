//! Local Chunk Store
//!
//! Content-addressed blob storage on one worker's disk. Each chunk is two
//! files: `<uuid>.chunk` with the raw bytes and `<uuid>.sha256` with the
//! lowercase hex digest. Both are written temp-file-then-rename and the
//! body lands before its sidecar, so a crash at any point leaves either a
//! complete pair or a body without a sidecar, which inventory ignores.
//!
//! An in-memory inventory cache backs heartbeats and idempotency checks;
//! it is updated on every mutation and reconciled against the directory by
//! the scrub scan at startup and hourly, which also re-verifies digests and
//! quarantines bit-rotted chunks with a `.bad` suffix.

use bytes::Bytes;
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::shared::checksum::sha256_hex;
use crate::shared::error::DfsError;

const CHUNK_EXT: &str = "chunk";
const DIGEST_EXT: &str = "sha256";
const QUARANTINE_SUFFIX: &str = "bad";

#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk_id: Uuid,
    pub size: u64,
    pub checksum: String,
    /// False when the chunk was already present and the write was a no-op.
    pub newly_written: bool,
}

pub struct ChunkStore {
    root: PathBuf,
    node_id: String,
    inventory: DashMap<Uuid, ChunkMeta>,
}

impl ChunkStore {
    pub fn open(root: &Path, node_id: &str) -> anyhow::Result<Arc<Self>> {
        fs::create_dir_all(root)?;
        let store = Arc::new(Self {
            root: root.to_path_buf(),
            node_id: node_id.to_string(),
            inventory: DashMap::new(),
        });
        let scanned = store.scan_blocking();
        tracing::info!("chunk store at {}: {} chunks", root.display(), scanned);
        Ok(store)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(&self, chunk_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.{}", chunk_id, CHUNK_EXT))
    }

    fn digest_path(&self, chunk_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.{}", chunk_id, DIGEST_EXT))
    }

    // ============================================================
    // INVENTORY
    // ============================================================

    pub fn chunk_ids(&self) -> Vec<Uuid> {
        self.inventory.iter().map(|e| *e.key()).collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.inventory.len()
    }

    pub fn contains(&self, chunk_id: Uuid) -> bool {
        self.inventory.contains_key(&chunk_id)
    }

    // ============================================================
    // CHUNK I/O
    // ============================================================

    pub async fn put(&self, chunk_id: Uuid, body: Bytes) -> Result<StoredChunk, DfsError> {
        // Chunks are immutable: a repeat PUT (same id, any bytes) keeps the
        // existing bytes and digest, so retries after timeouts are safe.
        if let Some(existing) = self.inventory.get(&chunk_id) {
            return Ok(StoredChunk {
                chunk_id,
                size: existing.size,
                checksum: existing.checksum.clone(),
                newly_written: false,
            });
        }

        let checksum = sha256_hex(&body);

        let tmp_body = self.root.join(format!(".{}.{}.tmp", chunk_id, CHUNK_EXT));
        if let Err(e) = write_file_durably(&tmp_body, &body).await {
            let _ = fs::remove_file(&tmp_body);
            return Err(map_io_error(chunk_id, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_body, self.chunk_path(chunk_id)).await {
            let _ = fs::remove_file(&tmp_body);
            return Err(map_io_error(chunk_id, e));
        }

        let tmp_digest = self.root.join(format!(".{}.{}.tmp", chunk_id, DIGEST_EXT));
        let digest_write = async {
            write_file_durably(&tmp_digest, checksum.as_bytes()).await?;
            tokio::fs::rename(&tmp_digest, self.digest_path(chunk_id)).await
        };
        if let Err(e) = digest_write.await {
            let _ = fs::remove_file(&tmp_digest);
            let _ = fs::remove_file(self.chunk_path(chunk_id));
            return Err(map_io_error(chunk_id, e));
        }

        let size = body.len() as u64;
        self.inventory.insert(
            chunk_id,
            ChunkMeta {
                size,
                checksum: checksum.clone(),
            },
        );
        tracing::info!("stored chunk {} ({} bytes)", chunk_id, size);

        Ok(StoredChunk {
            chunk_id,
            size,
            checksum,
            newly_written: true,
        })
    }

    pub async fn get(&self, chunk_id: Uuid) -> Result<(Bytes, String), DfsError> {
        let chunk_path = self.chunk_path(chunk_id);
        let stored_digest = match tokio::fs::read_to_string(self.digest_path(chunk_id)).await {
            Ok(s) => s.trim().to_string(),
            Err(_) => return Err(DfsError::NotFound(chunk_id.to_string())),
        };
        let body = match tokio::fs::read(&chunk_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DfsError::NotFound(chunk_id.to_string()))
            }
            Err(e) => return Err(map_io_error(chunk_id, e)),
        };

        let computed = sha256_hex(&body);
        if computed != stored_digest {
            tracing::error!(
                "chunk {} digest mismatch (stored {}, computed {}), quarantining",
                chunk_id,
                stored_digest,
                computed
            );
            self.quarantine(chunk_id);
            return Err(DfsError::Corrupted(chunk_id));
        }

        Ok((Bytes::from(body), computed))
    }

    pub async fn delete(&self, chunk_id: Uuid) -> Result<bool, DfsError> {
        self.inventory.remove(&chunk_id);
        let existed = tokio::fs::remove_file(self.chunk_path(chunk_id)).await.is_ok();
        let _ = tokio::fs::remove_file(self.digest_path(chunk_id)).await;
        if existed {
            tracing::info!("deleted chunk {}", chunk_id);
        }
        Ok(existed)
    }

    /// Scrub entry point: the full-directory verification runs on the
    /// blocking pool since it reads every chunk back.
    pub async fn scan(self: Arc<Self>) -> usize {
        tokio::task::spawn_blocking(move || self.scan_blocking())
            .await
            .unwrap_or(0)
    }

    /// Rebuilds the inventory from disk, verifying every digest. Chunks
    /// missing their sidecar are skipped; mismatches are quarantined.
    /// Leftover temp files from interrupted writes are swept away.
    pub fn scan_blocking(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("inventory scan of {} failed: {}", self.root.display(), e);
                return self.inventory.len();
            }
        };

        let mut seen = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };

            if name.ends_with(".tmp") {
                let _ = fs::remove_file(&path);
                continue;
            }
            let Some(stem) = name.strip_suffix(&format!(".{}", CHUNK_EXT)) else {
                continue;
            };
            let Ok(chunk_id) = stem.parse::<Uuid>() else {
                tracing::warn!("ignoring oddly named file {}", name);
                continue;
            };

            let digest_path = self.digest_path(chunk_id);
            if !digest_path.exists() {
                tracing::warn!("chunk {} has no digest sidecar, ignoring", chunk_id);
                continue;
            }
            let Ok(stored_digest) = fs::read_to_string(&digest_path) else {
                continue;
            };
            let stored_digest = stored_digest.trim().to_string();

            let Ok(body) = fs::read(&path) else {
                continue;
            };
            if sha256_hex(&body) != stored_digest {
                tracing::error!("scrub found chunk {} corrupted, quarantining", chunk_id);
                self.quarantine(chunk_id);
                continue;
            }

            self.inventory.insert(
                chunk_id,
                ChunkMeta {
                    size: body.len() as u64,
                    checksum: stored_digest,
                },
            );
            seen.push(chunk_id);
        }

        // Entries whose files vanished out-of-band stop being reported.
        let on_disk: std::collections::HashSet<Uuid> = seen.iter().copied().collect();
        self.inventory.retain(|id, _| on_disk.contains(id));

        self.inventory.len()
    }

    fn quarantine(&self, chunk_id: Uuid) {
        self.inventory.remove(&chunk_id);
        for path in [self.chunk_path(chunk_id), self.digest_path(chunk_id)] {
            if path.exists() {
                let mut bad = path.clone().into_os_string();
                bad.push(format!(".{}", QUARANTINE_SUFFIX));
                if let Err(e) = fs::rename(&path, &bad) {
                    tracing::error!("quarantine rename of {} failed: {}", path.display(), e);
                }
            }
        }
    }
}

async fn write_file_durably(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await
}

fn map_io_error(chunk_id: Uuid, e: std::io::Error) -> DfsError {
    if e.raw_os_error() == Some(28) {
        // ENOSPC: the next heartbeat's free-space report takes this worker
        // out of the placement pool.
        return DfsError::NoSpace(chunk_id);
    }
    DfsError::Internal(anyhow::Error::new(e).context(format!("chunk {} io", chunk_id)))
}
