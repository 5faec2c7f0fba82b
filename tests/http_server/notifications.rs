use herald::{config::EngineConfig, test_helpers::RecordingSender};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn submit_queues_notification_into_batch() {
    let server = TestServer::new().await;

    let resp = server.post("/notifications", Some(notification_json("u1"))).await;

    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["decision"]["decision"], "allow");
    assert_eq!(body["decision"]["reason"], "within_limits");
    assert_eq!(body["admission"]["result"], "queued");
    assert!(body["admission"]["batch_id"].is_i64());

    server.cleanup();
}

#[tokio::test]
async fn submit_reports_throttle_decision() {
    let server = TestServer::with_options(unbatched(), Some(API_KEY), RecordingSender::new()).await;

    server.post("/notifications", Some(notification_json("u1"))).await;
    let resp = server.post("/notifications", Some(notification_json("u1"))).await;

    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["decision"]["decision"], "throttle");
    assert_eq!(body["decision"]["reason"], "cooldown_active");
    assert!(body["admission"].is_null());

    server.cleanup();
}

#[tokio::test]
async fn submit_rejects_unknown_channel_and_bad_priority() {
    let server = TestServer::new().await;

    let mut payload = notification_json("u1");
    payload["channel"] = json!("pager");
    let resp = server.post("/notifications", Some(payload)).await;
    assert_eq!(resp.status(), 422);

    let mut payload = notification_json("u1");
    payload["priority_score"] = json!(101);
    let resp = server.post("/notifications", Some(payload)).await;
    assert_eq!(resp.status(), 422);

    server.cleanup();
}

#[tokio::test]
async fn write_endpoints_require_api_key() {
    let server = TestServer::new().await;

    let url = format!("http://{}/notifications", server.address);
    let resp = server.client.post(&url).json(&notification_json("u1")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server
        .client
        .post(&url)
        .bearer_auth("wrong-key")
        .json(&notification_json("u1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    server.cleanup();
}

#[tokio::test]
async fn write_endpoints_are_not_mounted_without_api_key() {
    let server =
        TestServer::with_options(EngineConfig::default(), None, RecordingSender::new()).await;

    let resp = server.post("/notifications", Some(notification_json("u1"))).await;
    assert_eq!(resp.status(), 404);

    let resp = server.get("/health").await;
    assert_eq!(resp.status(), 200);

    server.cleanup();
}

#[tokio::test]
async fn test_notification_sends_directly() {
    let server = TestServer::new().await;

    let resp = server
        .post(
            "/test-notification",
            Some(json!({ "channel": "email", "recipient_id": "u9", "subject": "Ping" })),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["throttle_decision"]["decision"], "allow");
    assert_eq!(body["send"]["result"]["success"], true);
    assert!(body["current_metric"].is_null());
    assert_eq!(server.sender.sent().len(), 1);
    assert_eq!(server.sender.sent()[0].subject, "Ping");

    server.cleanup();
}

#[tokio::test]
async fn config_reload_returns_active_configuration() {
    let server = TestServer::new().await;

    let resp = server.post("/config/reload", None).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["config"]["batching"]["max_batch_size"], 10);
    assert_eq!(body["config"]["throttling"]["cooldown_minutes"], 5);

    server.cleanup();
}

#[tokio::test]
async fn config_override_updates_active_configuration() {
    let server = TestServer::new().await;

    let resp = server.put("/config/throttling/burst_limit", json!({ "value": 3 })).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["config"]["throttling"]["burst_limit"], 3);

    let resp = server.put("/config/batching/max_batch_size", json!({ "value": 0 })).await;
    assert_eq!(resp.status(), 422);
    let resp = server.put("/config/metrics/enabled", json!({ "value": true })).await;
    assert_eq!(resp.status(), 422);

    // Survives a reload because it is stored
    let resp = server.post("/config/reload", None).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["config"]["throttling"]["burst_limit"], 3);
    assert_eq!(body["config"]["batching"]["max_batch_size"], 10);

    let url = format!("http://{}/config/throttling/burst_limit", server.address);
    let resp = server.client.put(&url).json(&json!({ "value": 4 })).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    server.cleanup();
}
