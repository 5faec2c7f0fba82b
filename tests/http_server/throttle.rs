use herald::test_helpers::RecordingSender;

use crate::helpers::*;

#[tokio::test]
async fn throttle_metrics_before_any_request() {
    let server = TestServer::new().await;

    let resp = server.get("/throttle/u1/email").await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert!(body["metric"].is_null());
    assert_eq!(body["recent_events"].as_array().unwrap().len(), 0);
    assert_eq!(body["limits"]["rate_limit_per_hour"], 50);

    server.cleanup();
}

#[tokio::test]
async fn throttle_metrics_reflect_submissions() {
    let server = TestServer::with_options(unbatched(), Some(API_KEY), RecordingSender::new()).await;

    server.post("/notifications", Some(notification_json("u1"))).await;
    server.post("/notifications", Some(notification_json("u1"))).await;

    let resp = server.get("/throttle/u1/email").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["recipient_id"], "u1");
    assert_eq!(body["metric"]["hourly_count"], 1);
    assert_eq!(body["metric"]["burst_count"], 1);

    let events = body["recent_events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "throttled");
    assert_eq!(events[0]["reason"], "cooldown_active");
    assert_eq!(events[1]["event_type"], "allowed");

    server.cleanup();
}

#[tokio::test]
async fn batched_submissions_skip_cooldown() {
    let server = TestServer::new().await;

    server.post("/notifications", Some(notification_json("u1"))).await;
    let resp = server.post("/notifications", Some(notification_json("u1"))).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["decision"]["decision"], "allow");
    assert_eq!(body["admission"]["result"], "queued");

    let resp = server.get("/throttle/u1/email").await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["metric"]["burst_count"], 2);
    assert!(body["metric"]["last_notification_time"].is_null());

    server.cleanup();
}
