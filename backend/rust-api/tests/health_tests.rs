use axum::http::StatusCode;

mod common;

#[tokio::test]
async fn health_reports_store_status() {
    let (app, _store) = common::create_test_app();

    let (status, body) = common::get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "prepdeck-api");
    assert_eq!(body["dependencies"]["sessions"]["status"], "healthy");
    assert_eq!(body["dependencies"]["ledger"]["status"], "healthy");
}

#[tokio::test]
async fn metrics_endpoint_requires_basic_auth() {
    let (app, _store) = common::create_test_app();

    let (status, _) = common::get_json(&app, "/metrics").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
