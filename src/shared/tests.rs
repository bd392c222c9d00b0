#[cfg(test)]
mod tests {
    use crate::shared::checksum::{sha256_hex, StreamingHasher};
    use crate::shared::error::DfsError;
    use crate::shared::protocol::{HeartbeatRequest, UploadInitRequest};
    use crate::shared::retry::{retry_async, RetryPolicy};
    use crate::shared::types::{chunk_count, chunk_len};
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    // ============================================================
    // CHUNK MATH
    // ============================================================

    #[test]
    fn test_chunk_count_empty_file_has_no_chunks() {
        assert_eq!(chunk_count(0, 64), 0);
    }

    #[test]
    fn test_chunk_count_exact_multiple_has_no_empty_tail() {
        assert_eq!(chunk_count(128, 64), 2);
        assert_eq!(chunk_len(128, 64, 1), 64);
    }

    #[test]
    fn test_chunk_count_one_extra_byte_adds_a_chunk() {
        // 64 MiB + 1 with 64 MiB chunks -> one full chunk and a 1-byte tail.
        let mib64 = 64 * 1024 * 1024;
        assert_eq!(chunk_count(mib64 + 1, mib64), 2);
        assert_eq!(chunk_len(mib64 + 1, mib64, 0), mib64);
        assert_eq!(chunk_len(mib64 + 1, mib64, 1), 1);
    }

    #[test]
    fn test_chunk_len_single_byte_file() {
        assert_eq!(chunk_count(1, 64), 1);
        assert_eq!(chunk_len(1, 64, 0), 1);
    }

    // ============================================================
    // CHECKSUMS
    // ============================================================

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc"), the classic FIPS 180 test vector.
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_streaming_hasher_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut hasher = StreamingHasher::new();
        for block in data.chunks(777) {
            hasher.update(block);
        }

        assert_eq!(hasher.bytes_seen(), data.len() as u64);
        assert_eq!(hasher.finalize_hex(), sha256_hex(&data));
    }

    // ============================================================
    // RETRY COMBINATOR
    // ============================================================

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2,
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, &str> = retry_async(
            &fast_policy(5),
            |_| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retriable_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async(
            &fast_policy(5),
            |e| *e != "fatal",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async(
            &fast_policy(3),
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still down") }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // ============================================================
    // ERROR MAPPING
    // ============================================================

    #[test]
    fn test_error_kinds_and_status_codes() {
        let conflict = DfsError::PathConflict("/a".into());
        assert_eq!(conflict.kind(), "path-conflict");
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert!(!conflict.is_retriable());

        let capacity = DfsError::NoCapacity {
            active: 1,
            required: 3,
        };
        assert_eq!(capacity.kind(), "no-capacity");
        assert_eq!(capacity.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(capacity.is_retriable());

        let expired = DfsError::SessionExpired(Uuid::new_v4());
        assert_eq!(expired.status_code(), StatusCode::GONE);
        assert!(!expired.is_retriable());

        let missing = DfsError::NotFound("/gone".into());
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    // ============================================================
    // WIRE TYPES
    // ============================================================

    #[test]
    fn test_upload_init_request_defaults() {
        let req: UploadInitRequest =
            serde_json::from_str(r#"{"path": "/a", "size": 10}"#).unwrap();
        assert!(!req.overwrite);
        assert!(!req.compressed);
        assert!(req.original_size.is_none());
    }

    #[test]
    fn test_heartbeat_request_roundtrip() {
        let req = HeartbeatRequest {
            node_id: "node-127.0.0.1-8001".into(),
            host: "127.0.0.1".into(),
            port: 8001,
            rack: Some("r1".into()),
            free_space: 10,
            total_space: 100,
            chunk_ids: vec![Uuid::new_v4()],
        };

        let json = serde_json::to_string(&req).unwrap();
        let back: HeartbeatRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_id, req.node_id);
        assert_eq!(back.chunk_ids, req.chunk_ids);
    }
}
