use crate::helpers::*;

async fn queue_one(server: &TestServer) -> i64 {
    let resp = server.post("/notifications", Some(notification_json("u1"))).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    body["admission"]["batch_id"].as_i64().expect("expected a queued batch")
}

#[tokio::test]
async fn batch_endpoint_returns_404_for_nonexistent_id() {
    let server = TestServer::new().await;

    let resp = server.get("/batches/1234").await;

    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "batch 1234 not found");

    server.cleanup();
}

#[tokio::test]
async fn batch_endpoint_returns_batch_with_members() {
    let server = TestServer::new().await;
    let batch_id = queue_one(&server).await;

    let resp = server.get(&format!("/batches/{}", batch_id)).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["batch"]["id"], batch_id);
    assert_eq!(body["batch"]["status"], "open");
    assert_eq!(body["batch"]["member_count"], 1);
    assert_eq!(body["batch"]["members"].as_array().unwrap().len(), 1);

    server.cleanup();
}

#[tokio::test]
async fn send_batch_now_flushes_once() {
    let server = TestServer::new().await;
    let batch_id = queue_one(&server).await;

    let resp = server.post(&format!("/batches/{}/send", batch_id), None).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["result"], "flushed");
    assert_eq!(body["deliveries"][0]["outcome"]["outcome"], "delivered");
    assert_eq!(server.sender.sent().len(), 1);

    let resp = server.post(&format!("/batches/{}/send", batch_id), None).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["result"], "not_open");
    assert_eq!(body["status"], "flushed");
    assert_eq!(server.sender.sent().len(), 1);

    server.cleanup();
}

#[tokio::test]
async fn cancel_batch_only_applies_to_open_batches() {
    let server = TestServer::new().await;
    let batch_id = queue_one(&server).await;

    let resp = server.post(&format!("/batches/{}/cancel", batch_id), None).await;
    assert_eq!(resp.status(), 200);

    let resp = server.get(&format!("/batches/{}", batch_id)).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["batch"]["status"], "cancelled");
    assert_eq!(body["batch"]["members"][0]["status"], "cancelled");

    let resp = server.post(&format!("/batches/{}/cancel", batch_id), None).await;
    assert_eq!(resp.status(), 409);

    let resp = server.post(&format!("/batches/{}/send", batch_id), None).await;
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["result"], "not_open");
    assert!(server.sender.sent().is_empty());

    server.cleanup();
}
