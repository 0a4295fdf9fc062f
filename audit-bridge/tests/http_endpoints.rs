use audit_bridge::server::router;
use audit_bridge::BridgeMetrics;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

async fn get(metrics: &BridgeMetrics, uri: &str) -> (StatusCode, String) {
    let response = router(metrics.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn health_and_index_respond() {
    let metrics = BridgeMetrics::new().unwrap();
    assert_eq!(get(&metrics, "/health").await, (StatusCode::OK, "healthy".to_string()));
    assert_eq!(get(&metrics, "/").await, (StatusCode::OK, "See: /health, /metrics".to_string()));
    assert_eq!(get(&metrics, "/nope").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_exposes_bridge_counters() {
    let metrics = BridgeMetrics::new().unwrap();
    metrics.events_received.inc_by(5);
    metrics.events_delivered.inc_by(3);
    metrics.events_parse_errors.inc();
    metrics.events_delivery_errors.inc();

    let (status, body) = get(&metrics, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("events_receive_sum 5"), "{body}");
    assert!(body.contains("events_send_sum 3"), "{body}");
    assert!(body.contains("events_error_parse 1"), "{body}");
    assert!(body.contains("events_error_send 1"), "{body}");
}
