mod common;

use common::{morning, TestApp};
use nudge_service::services::init_metrics;

// The recorder is process-global, so this binary holds a single test.
#[tokio::test]
async fn metrics_endpoint_exposes_http_and_reminder_counters() {
    init_metrics();
    let app = TestApp::spawn().await;

    for _ in 0..3 {
        let response = app
            .http
            .get(format!("{}/health", app.address))
            .send()
            .await
            .expect("Failed to execute request");
        assert!(response.status().is_success());
    }
    app.state.scheduler.run(morning("2024-06-23")).await.unwrap();

    let body = app
        .http
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .expect("Failed to execute request")
        .text()
        .await
        .expect("Failed to read body");

    assert!(body.contains("http_requests_total"), "{}", body);
    assert!(body.contains("route=\"/health\""), "{}", body);
    assert!(body.contains("http_request_duration_seconds"), "{}", body);
    assert!(body.contains("nudge_batch_runs_total"), "{}", body);
}
