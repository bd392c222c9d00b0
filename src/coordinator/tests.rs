#[cfg(test)]
mod tests {
    use crate::config::DfsConfig;
    use crate::coordinator::placement::PlacementPolicy;
    use crate::coordinator::repair::find_under_replicated;
    use crate::coordinator::store::MetadataStore;
    use crate::shared::checksum::sha256_hex;
    use crate::shared::error::DfsError;
    use crate::shared::protocol::{
        ChunkCommitInfo, CommitRequest, HeartbeatRequest, UploadInitRequest, UploadInitResponse,
    };
    use crate::shared::types::{
        now_ms, ChunkRecord, ChunkState, FileRecord, NodeState, ReplicaPlacement, WorkerRecord,
    };
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_config(dir: &Path) -> DfsConfig {
        DfsConfig {
            chunk_size: 64,
            replication_factor: 3,
            heartbeat_interval: Duration::from_secs(10),
            dead_threshold: Duration::from_secs(30),
            repair_period: Duration::from_secs(60),
            max_concurrent_repairs: 10,
            rebalance: false,
            gc_period: Duration::from_secs(24 * 60 * 60),
            gc_grace: Duration::from_secs(7 * 24 * 60 * 60),
            session_timeout: Duration::from_secs(3600),
            min_free_ratio: 0.10,
            wal_compact_threshold: 10_000,
            metadata_path: dir.to_path_buf(),
            metadata_url: "http://127.0.0.1:8000".to_string(),
            storage_path: dir.join("data"),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }

    fn open_store(dir: &Path) -> MetadataStore {
        MetadataStore::open(dir, test_config(dir)).unwrap()
    }

    async fn register_worker(store: &MetadataStore, id: &str, port: u16, chunks: Vec<Uuid>) {
        store
            .heartbeat(HeartbeatRequest {
                node_id: id.to_string(),
                host: "127.0.0.1".to_string(),
                port,
                rack: None,
                free_space: 500_000,
                total_space: 1_000_000,
                chunk_ids: chunks,
            })
            .await
            .unwrap();
    }

    async fn three_workers(store: &MetadataStore) {
        register_worker(store, "w1", 9001, vec![]).await;
        register_worker(store, "w2", 9002, vec![]).await;
        register_worker(store, "w3", 9003, vec![]).await;
    }

    fn commit_request_for(plan: &UploadInitResponse, nodes: &[&str]) -> CommitRequest {
        CommitRequest {
            file_id: plan.file_id,
            chunks: plan
                .chunks
                .iter()
                .map(|c| ChunkCommitInfo {
                    chunk_id: c.chunk_id,
                    checksum: sha256_hex(b"test bytes"),
                    nodes: nodes.iter().map(|n| n.to_string()).collect(),
                })
                .collect(),
        }
    }

    async fn upload_committed(store: &MetadataStore, path: &str, size: u64) -> UploadInitResponse {
        let plan = store
            .upload_init(UploadInitRequest {
                path: path.to_string(),
                size,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();
        store
            .commit(commit_request_for(&plan, &["w1", "w2", "w3"]))
            .await
            .unwrap();
        plan
    }

    // ============================================================
    // UPLOAD SESSIONS
    // ============================================================

    #[tokio::test]
    async fn test_upload_init_plans_chunks_with_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let plan = store
            .upload_init(UploadInitRequest {
                path: "/a".to_string(),
                size: 130,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();

        assert_eq!(plan.chunk_size, 64);
        assert_eq!(plan.chunks.len(), 3);
        assert_eq!(plan.chunks[0].size, 64);
        assert_eq!(plan.chunks[1].size, 64);
        assert_eq!(plan.chunks[2].size, 2);
        for chunk in &plan.chunks {
            assert_eq!(chunk.targets.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_upload_init_empty_file_has_zero_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let plan = store
            .upload_init(UploadInitRequest {
                path: "/empty".to_string(),
                size: 0,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();
        assert!(plan.chunks.is_empty());

        store
            .commit(CommitRequest {
                file_id: plan.file_id,
                chunks: vec![],
            })
            .await
            .unwrap();

        let file = store.get_file("/empty").await.unwrap();
        assert_eq!(file.size, 0);
        assert!(file.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_upload_init_fails_without_enough_workers() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        register_worker(&store, "w1", 9001, vec![]).await;
        register_worker(&store, "w2", 9002, vec![]).await;

        let err = store
            .upload_init(UploadInitRequest {
                path: "/a".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::NoCapacity { active: 2, required: 3 }));
    }

    #[tokio::test]
    async fn test_provisional_file_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let plan = store
            .upload_init(UploadInitRequest {
                path: "/pending".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();

        assert!(store.list_files(None, 100, 0).await.is_empty());
        assert!(matches!(
            store.get_file("/pending").await,
            Err(DfsError::NotFound(_))
        ));

        store
            .commit(commit_request_for(&plan, &["w1"]))
            .await
            .unwrap();
        assert_eq!(store.list_files(None, 100, 0).await.len(), 1);
        assert!(store.get_file("/pending").await.is_ok());
    }

    #[tokio::test]
    async fn test_path_conflict_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let first = upload_committed(&store, "/c", 10).await;

        let err = store
            .upload_init(UploadInitRequest {
                path: "/c".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::PathConflict(_)));

        let replacement = store
            .upload_init(UploadInitRequest {
                path: "/c".to_string(),
                size: 20,
                overwrite: true,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();
        store
            .commit(commit_request_for(&replacement, &["w1", "w2", "w3"]))
            .await
            .unwrap();

        // The old record is soft-deleted atomically with the publish.
        let listed = store.list_files(None, 100, 0).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "/c");
        assert_eq!(listed[0].size, 20);
        assert_ne!(listed[0].file_id, first.file_id);
    }

    #[tokio::test]
    async fn test_commit_rejects_chunk_with_no_reporting_workers() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let plan = store
            .upload_init(UploadInitRequest {
                path: "/a".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();

        let err = store
            .commit(commit_request_for(&plan, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::Invalid(_)));

        // The session stays open, so a corrected commit still succeeds.
        store
            .commit(commit_request_for(&plan, &["w1"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_commit_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let err = store
            .commit(CommitRequest {
                file_id: Uuid::new_v4(),
                chunks: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn test_commit_after_session_timeout_fails_and_purges() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.session_timeout = Duration::from_millis(1);
        let store = MetadataStore::open(dir.path(), config).unwrap();
        three_workers(&store).await;

        let plan = store
            .upload_init(UploadInitRequest {
                path: "/d".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = store
            .commit(commit_request_for(&plan, &["w1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::SessionExpired(_)));

        // No provisional state survives.
        assert!(store.list_files(None, 100, 0).await.is_empty());
        assert!(matches!(
            store.get_file("/d").await,
            Err(DfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_sweep_abandons_expired_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.session_timeout = Duration::from_millis(1);
        let store = MetadataStore::open(dir.path(), config).unwrap();
        three_workers(&store).await;

        store
            .upload_init(UploadInitRequest {
                path: "/ghost".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let swept = store.expire_sessions().await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.list_files(None, 100, 0).await.is_empty());
    }

    // ============================================================
    // HEARTBEATS
    // ============================================================

    #[tokio::test]
    async fn test_heartbeat_inventory_is_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        // Three chunks X, Y, Z all recorded on w1.
        let plan = upload_committed(&store, "/hb", 130).await;
        let x = plan.chunks[0].chunk_id;
        let y = plan.chunks[1].chunk_id;
        let z = plan.chunks[2].chunk_id;

        // w1 reports only X and Y: Z must drop off w1's placements.
        register_worker(&store, "w1", 9001, vec![x, y]).await;

        let file = store.get_file("/hb").await.unwrap();
        let on_w1 = |chunk_id: Uuid| {
            file.chunks
                .iter()
                .find(|c| c.chunk_id == chunk_id)
                .unwrap()
                .replicas
                .iter()
                .any(|r| r.node_id == "w1")
        };
        assert!(on_w1(x));
        assert!(on_w1(y));
        assert!(!on_w1(z));
    }

    #[tokio::test]
    async fn test_heartbeat_promotes_pending_placements() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let plan = upload_committed(&store, "/p", 10).await;
        let chunk_id = plan.chunks[0].chunk_id;

        let file = store.get_file("/p").await.unwrap();
        let replica = &file.chunks[0].replicas[0];
        assert_eq!(replica.state, ChunkState::Pending);
        // Nothing but the client's word yet.
        assert!(!replica.checksum_verified);

        register_worker(&store, "w1", 9001, vec![chunk_id]).await;

        let file = store.get_file("/p").await.unwrap();
        let replica = file.chunks[0]
            .replicas
            .iter()
            .find(|r| r.node_id == "w1")
            .unwrap();
        assert_eq!(replica.state, ChunkState::Committed);
        assert!(replica.checksum_verified);
        assert!(replica.last_confirmed_ms.is_some());
    }

    #[tokio::test]
    async fn test_dead_workers_marked_inactive_and_revived() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.dead_threshold = Duration::from_millis(1);
        let store = MetadataStore::open(dir.path(), config).unwrap();

        register_worker(&store, "w1", 9001, vec![]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let flipped = store.mark_dead_workers().await.unwrap();
        assert_eq!(flipped, 1);
        assert_eq!(
            store.get_node("w1").await.unwrap().state,
            NodeState::Inactive
        );

        // Back to active on the next heartbeat.
        register_worker(&store, "w1", 9001, vec![]).await;
        assert_eq!(store.get_node("w1").await.unwrap().state, NodeState::Active);
    }

    #[tokio::test]
    async fn test_get_file_excludes_placements_on_inactive_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.dead_threshold = Duration::from_millis(1);
        let store = MetadataStore::open(dir.path(), config).unwrap();
        three_workers(&store).await;

        let plan = upload_committed(&store, "/live", 10).await;
        let chunk_id = plan.chunks[0].chunk_id;
        register_worker(&store, "w1", 9001, vec![chunk_id]).await;
        register_worker(&store, "w2", 9002, vec![chunk_id]).await;
        register_worker(&store, "w3", 9003, vec![chunk_id]).await;

        let file = store.get_file("/live").await.unwrap();
        assert_eq!(file.chunks[0].replicas.len(), 3);

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.mark_dead_workers().await.unwrap();
        // Revive two of the three.
        register_worker(&store, "w1", 9001, vec![chunk_id]).await;
        register_worker(&store, "w2", 9002, vec![chunk_id]).await;

        let file = store.get_file("/live").await.unwrap();
        assert_eq!(file.chunks[0].replicas.len(), 2);
        assert!(file.chunks[0].replicas.iter().all(|r| r.node_id != "w3"));
    }

    #[tokio::test]
    async fn test_decommissioned_worker_stays_down_across_heartbeats() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        register_worker(&store, "w1", 9001, vec![]).await;

        store.decommission_node("w1").await.unwrap();
        register_worker(&store, "w1", 9001, vec![]).await;

        assert_eq!(
            store.get_node("w1").await.unwrap().state,
            NodeState::Decommissioned
        );
    }

    // ============================================================
    // DELETE & GC
    // ============================================================

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;
        upload_committed(&store, "/del", 10).await;

        store.delete_file("/del", false).await.unwrap();
        assert!(store.list_files(None, 100, 0).await.is_empty());

        // Second delete of the same path succeeds with no state change.
        let outcome = store.delete_file("/del", false).await.unwrap();
        assert!(outcome.removals.is_empty());

        let err = store.delete_file("/never-existed", false).await.unwrap_err();
        assert!(matches!(err, DfsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_permanent_delete_schedules_chunk_removal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;
        let plan = upload_committed(&store, "/purge", 130).await;

        let outcome = store.delete_file("/purge", true).await.unwrap();
        assert_eq!(outcome.removals.len(), plan.chunks.len());
        for (_, urls) in &outcome.removals {
            assert_eq!(urls.len(), 3);
        }
        assert!(matches!(
            store.get_file("/purge").await,
            Err(DfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gc_respects_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.gc_grace = Duration::from_secs(3600);
        let store = MetadataStore::open(dir.path(), config).unwrap();
        three_workers(&store).await;
        upload_committed(&store, "/g", 10).await;

        store.delete_file("/g", false).await.unwrap();
        // Freshly soft-deleted: still inside grace.
        assert!(store.gc_candidates().await.is_empty());
    }

    #[tokio::test]
    async fn test_gc_purges_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.gc_grace = Duration::from_millis(1);
        let store = MetadataStore::open(dir.path(), config).unwrap();
        three_workers(&store).await;
        upload_committed(&store, "/g", 10).await;

        store.delete_file("/g", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let candidates = store.gc_candidates().await;
        assert_eq!(candidates.len(), 1);
        store.purge_file(candidates[0].file_id).await.unwrap();
        assert!(store.gc_candidates().await.is_empty());
    }

    // ============================================================
    // LEASES
    // ============================================================

    #[tokio::test]
    async fn test_lease_mutual_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        three_workers(&store).await;

        let grant = store
            .acquire_lease("/locked", Some("client-a".into()), 60_000)
            .await
            .unwrap();

        let err = store
            .acquire_lease("/locked", Some("client-b".into()), 60_000)
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::LeaseHeld(_)));

        // Writes under a foreign lease are refused too.
        let err = store
            .upload_init(UploadInitRequest {
                path: "/locked".to_string(),
                size: 10,
                overwrite: false,
                compressed: false,
                original_size: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::LeaseHeld(_)));

        store.release_lease(grant.lease_id).await.unwrap();
        // Release is idempotent.
        store.release_lease(grant.lease_id).await.unwrap();
        store
            .acquire_lease("/locked", Some("client-b".into()), 60_000)
            .await
            .unwrap();
    }

    // ============================================================
    // WAL REPLAY
    // ============================================================

    #[tokio::test]
    async fn test_restart_replays_journal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path());
            three_workers(&store).await;
            upload_committed(&store, "/durable", 130).await;
            store.delete_file("/durable", false).await.unwrap();
            upload_committed(&store, "/kept", 10).await;
        }

        let store = open_store(dir.path());
        let files = store.list_files(None, 100, 0).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/kept");
        assert_eq!(store.list_nodes().await.len(), 3);
        // The soft-deleted record survived the restart for GC to find.
        assert!(matches!(
            store.get_file("/durable").await,
            Err(DfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_after_compaction() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut config = test_config(dir.path());
            config.wal_compact_threshold = 1;
            let store = MetadataStore::open(dir.path(), config).unwrap();
            three_workers(&store).await;
            upload_committed(&store, "/snap", 10).await;
        }

        let store = open_store(dir.path());
        assert!(store.get_file("/snap").await.is_ok());
    }

    // ============================================================
    // PLACEMENT POLICY
    // ============================================================

    fn worker(id: &str, free: u64, total: u64, rack: Option<&str>) -> WorkerRecord {
        WorkerRecord {
            node_id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            rack: rack.map(|r| r.to_string()),
            free_space: free,
            total_space: total,
            chunk_count: 0,
            last_heartbeat_ms: now_ms(),
            state: NodeState::Active,
        }
    }

    #[test]
    fn test_placement_is_deterministic_and_spreads() {
        let policy = PlacementPolicy::new(2, 0.10);
        let workers = vec![
            worker("a", 500, 1000, None),
            worker("b", 500, 1000, None),
            worker("c", 500, 1000, None),
        ];

        let first = policy.select_targets(&workers, 0, 10).unwrap();
        let again = policy.select_targets(&workers, 0, 10).unwrap();
        assert_eq!(first, again);

        // Consecutive chunks start at consecutive ring positions.
        let second = policy.select_targets(&workers, 1, 10).unwrap();
        assert_ne!(
            first[0].node_id, second[0].node_id,
            "chunk 1 should lead with a different primary than chunk 0"
        );
    }

    #[test]
    fn test_placement_skips_full_workers() {
        let policy = PlacementPolicy::new(2, 0.10);
        let workers = vec![
            worker("a", 500, 1000, None),
            worker("b", 5, 1000, None), // below the 10% free floor
            worker("c", 500, 1000, None),
        ];

        let picked = policy.select_targets(&workers, 0, 10).unwrap();
        assert!(picked.iter().all(|w| w.node_id != "b"));
    }

    #[test]
    fn test_placement_requires_enough_eligible_workers() {
        let policy = PlacementPolicy::new(3, 0.10);
        let workers = vec![
            worker("a", 500, 1000, None),
            worker("b", 5, 1000, None),
            worker("c", 500, 1000, None),
        ];

        let err = policy.select_targets(&workers, 0, 10).unwrap_err();
        assert!(matches!(err, DfsError::NoCapacity { active: 2, required: 3 }));
    }

    #[test]
    fn test_placement_spreads_across_racks_when_labeled() {
        let policy = PlacementPolicy::new(2, 0.10);
        let workers = vec![
            worker("a", 500, 1000, Some("r1")),
            worker("b", 500, 1000, Some("r1")),
            worker("c", 500, 1000, Some("r2")),
        ];

        for chunk_index in 0..6 {
            let picked = policy.select_targets(&workers, chunk_index, 10).unwrap();
            let racks: HashSet<_> = picked.iter().map(|w| w.rack.clone()).collect();
            assert!(racks.len() > 1, "picks {:?} all share a rack", picked);
        }
    }

    #[test]
    fn test_repair_destination_excludes_holders() {
        let policy = PlacementPolicy::new(3, 0.10);
        let workers = vec![
            worker("a", 300, 1000, None),
            worker("b", 900, 1000, None),
            worker("c", 600, 1000, None),
        ];
        let holders: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();

        let picked = policy
            .select_repair_destination(&workers, &holders, 10)
            .unwrap();
        assert_eq!(picked.node_id, "c");

        let all: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert!(policy.select_repair_destination(&workers, &all, 10).is_none());
    }

    // ============================================================
    // REPAIR SCAN
    // ============================================================

    fn replica(node_id: &str, state: ChunkState) -> ReplicaPlacement {
        ReplicaPlacement {
            node_id: node_id.to_string(),
            url: format!("http://{}:9000", node_id),
            state,
            last_confirmed_ms: Some(now_ms()),
            checksum_verified: true,
        }
    }

    fn committed_file(path: &str, chunks: Vec<ChunkRecord>) -> FileRecord {
        FileRecord {
            file_id: Uuid::new_v4(),
            path: path.to_string(),
            size: chunks.iter().map(|c| c.size).sum(),
            created_at_ms: now_ms(),
            modified_at_ms: now_ms(),
            chunks,
            published: true,
            is_deleted: false,
            deleted_at_ms: None,
            compressed: false,
            original_size: None,
        }
    }

    #[test]
    fn test_repair_scan_orders_most_degraded_first() {
        let healthy = ChunkRecord {
            chunk_id: Uuid::new_v4(),
            seq_index: 0,
            size: 10,
            checksum: Some(sha256_hex(b"x")),
            replicas: vec![
                replica("a", ChunkState::Committed),
                replica("b", ChunkState::Committed),
                replica("c", ChunkState::Committed),
            ],
        };
        let degraded = ChunkRecord {
            chunk_id: Uuid::new_v4(),
            seq_index: 1,
            size: 10,
            checksum: Some(sha256_hex(b"y")),
            replicas: vec![
                replica("a", ChunkState::Committed),
                replica("b", ChunkState::Committed),
            ],
        };
        let critical = ChunkRecord {
            chunk_id: Uuid::new_v4(),
            seq_index: 2,
            size: 10,
            checksum: Some(sha256_hex(b"z")),
            replicas: vec![replica("a", ChunkState::Committed)],
        };

        let files = vec![committed_file(
            "/f",
            vec![healthy.clone(), degraded.clone(), critical.clone()],
        )];
        let workers = vec![
            worker("a", 500, 1000, None),
            worker("b", 500, 1000, None),
            worker("c", 500, 1000, None),
        ];

        let tasks = find_under_replicated(&files, &workers, 3);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].chunk_id, critical.chunk_id);
        assert_eq!(tasks[0].missing, 2);
        assert_eq!(tasks[1].chunk_id, degraded.chunk_id);
        assert_eq!(tasks[1].missing, 1);
    }

    #[test]
    fn test_repair_scan_ignores_placements_on_inactive_workers() {
        let chunk = ChunkRecord {
            chunk_id: Uuid::new_v4(),
            seq_index: 0,
            size: 10,
            checksum: Some(sha256_hex(b"x")),
            replicas: vec![
                replica("a", ChunkState::Committed),
                replica("b", ChunkState::Committed),
                replica("down", ChunkState::Committed),
            ],
        };
        let files = vec![committed_file("/f", vec![chunk])];

        let mut down = worker("down", 500, 1000, None);
        down.state = NodeState::Inactive;
        let workers = vec![
            worker("a", 500, 1000, None),
            worker("b", 500, 1000, None),
            down,
        ];

        let tasks = find_under_replicated(&files, &workers, 3);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].missing, 1);
        // The inactive holder is still excluded as a destination.
        assert!(tasks[0].holders.contains("down"));
        // Only live committed copies qualify as sources.
        assert_eq!(tasks[0].source_urls.len(), 2);
    }

    #[test]
    fn test_repair_scan_counts_pending_toward_trigger() {
        let chunk = ChunkRecord {
            chunk_id: Uuid::new_v4(),
            seq_index: 0,
            size: 10,
            checksum: Some(sha256_hex(b"x")),
            replicas: vec![
                replica("a", ChunkState::Committed),
                replica("b", ChunkState::Committed),
                replica("c", ChunkState::Pending),
            ],
        };
        let files = vec![committed_file("/f", vec![chunk])];
        let workers = vec![
            worker("a", 500, 1000, None),
            worker("b", 500, 1000, None),
            worker("c", 500, 1000, None),
        ];

        // A pending copy is already on its way; don't schedule another.
        assert!(find_under_replicated(&files, &workers, 3).is_empty());
    }
}
