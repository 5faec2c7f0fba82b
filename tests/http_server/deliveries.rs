use herald::test_helpers::RecordingSender;

use crate::helpers::*;

#[tokio::test]
async fn delivery_endpoint_returns_record() {
    let server = TestServer::with_options(unbatched(), Some(API_KEY), RecordingSender::new()).await;

    let resp = server.post("/notifications", Some(notification_json("u1"))).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["admission"]["result"], "sent_immediately");
    let delivery_id = body["admission"]["delivery"]["delivery_id"].as_i64().unwrap();

    let resp = server.get(&format!("/deliveries/{}", delivery_id)).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["delivery"]["id"], delivery_id);
    assert_eq!(body["delivery"]["status"], "delivered");
    assert_eq!(body["delivery"]["deliverable"]["recipient_id"], "u1");

    let resp = server.get("/deliveries/999").await;
    assert_eq!(resp.status(), 404);

    server.cleanup();
}

#[tokio::test]
async fn cancel_delivery_stops_retries() {
    let server =
        TestServer::with_options(unbatched(), Some(API_KEY), RecordingSender::failing(3)).await;

    let resp = server.post("/notifications", Some(notification_json("u1"))).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["admission"]["delivery"]["outcome"]["outcome"], "retry_scheduled");
    let delivery_id = body["admission"]["delivery"]["delivery_id"].as_i64().unwrap();

    let resp = server.post(&format!("/deliveries/{}/cancel", delivery_id), None).await;
    assert_eq!(resp.status(), 200);

    server.clock.advance(chrono::TimeDelta::minutes(5));
    let report = server.engine.tick().await;
    assert!(report.deliveries.attempted.is_empty());
    assert_eq!(server.sender.sent().len(), 1);

    let resp = server.get(&format!("/deliveries/{}", delivery_id)).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["delivery"]["status"], "cancelled");

    let resp = server.post(&format!("/deliveries/{}/cancel", delivery_id), None).await;
    assert_eq!(resp.status(), 409);

    server.cleanup();
}
