#[cfg(test)]
mod tests {
    use crate::client::client::{encoded_path_segment, error_from_payload, node_id_from_url};
    use crate::shared::error::DfsError;
    use crate::shared::protocol::ErrorResponse;

    #[test]
    fn test_paths_are_encoded_as_one_url_segment() {
        assert_eq!(encoded_path_segment("/a"), "%2Fa");
        assert_eq!(encoded_path_segment("/docs/report.pdf"), "%2Fdocs%2Freport.pdf");
        // A missing leading slash is normalized before encoding.
        assert_eq!(encoded_path_segment("a"), "%2Fa");
        // Reserved characters never leak URL structure into the request.
        assert_eq!(encoded_path_segment("/a?b#c"), "%2Fa%3Fb%23c");
    }

    #[test]
    fn test_node_id_recovered_from_target_url() {
        assert_eq!(
            node_id_from_url("http://127.0.0.1:8001"),
            "node-127.0.0.1-8001"
        );
        assert_eq!(
            node_id_from_url("http://storage-3.internal:9000/"),
            "node-storage-3.internal-9000"
        );
    }

    #[test]
    fn test_error_payload_maps_to_kinds() {
        let payload = |kind: &str| {
            Some(ErrorResponse {
                error: kind.to_string(),
                detail: "detail".to_string(),
            })
        };

        assert!(matches!(
            error_from_payload(409, payload("path-conflict")),
            DfsError::PathConflict(_)
        ));
        assert!(matches!(
            error_from_payload(410, payload("session-expired")),
            DfsError::SessionExpired(_)
        ));
        assert!(matches!(
            error_from_payload(404, payload("not-found")),
            DfsError::NotFound(_)
        ));

        // Transient kinds come back retriable.
        let err = error_from_payload(503, payload("no-capacity"));
        assert!(err.is_retriable());
        let err = error_from_payload(502, None);
        assert!(err.is_retriable());

        // Fatal kinds do not.
        assert!(!error_from_payload(409, payload("path-conflict")).is_retriable());
        assert!(!error_from_payload(410, payload("session-expired")).is_retriable());
    }
}
