use std::{net::SocketAddr, sync::Arc};

use chrono::{TimeZone, Utc};
use herald::{
    config::{AppConfig, BatchingConfig, EngineConfig, ServerConfig},
    engine::notification_engine::NotificationEngine,
    http_server,
    persistence::SqliteMetricsStore,
    test_helpers::{MockClock, RecordingSender, create_test_engine},
};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::task;

pub const API_KEY: &str = "test-key";

pub struct TestServer {
    pub address: SocketAddr,
    pub server_handle: task::JoinHandle<()>,
    pub client: Client,
    pub engine: Arc<NotificationEngine>,
    pub store: Arc<SqliteMetricsStore>,
    pub sender: Arc<RecordingSender>,
    pub clock: MockClock,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_options(EngineConfig::default(), Some(API_KEY), RecordingSender::new()).await
    }

    pub async fn with_options(
        engine_config: EngineConfig,
        api_key: Option<&str>,
        sender: RecordingSender,
    ) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get address");
        drop(listener); // Release port for the app to use

        let config = Arc::new(AppConfig {
            server: ServerConfig {
                listen_address: addr.to_string(),
                api_key: api_key.map(String::from),
                ..Default::default()
            },
            engine: engine_config.clone(),
            ..Default::default()
        });

        let clock = MockClock::new(Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap());
        let sender = Arc::new(sender);
        let (engine, store) =
            create_test_engine(engine_config, &["email"], sender.clone(), Arc::new(clock.clone()))
                .await;

        let server_engine = Arc::clone(&engine);
        let server_handle = task::spawn(async move {
            http_server::run_server_from_config(config, server_engine)
                .await
                .expect("Server failed");
        });

        // Wait for server to start
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        Self { address: addr, server_handle, client: Client::new(), engine, store, sender, clock }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.get(&url).send().await.expect("Request failed")
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        let mut request = self.client.post(&url).bearer_auth(API_KEY);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.expect("Request failed")
    }

    pub async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.put(&url).bearer_auth(API_KEY).json(&body).send().await.expect("Request failed")
    }

    pub fn cleanup(self) {
        self.server_handle.abort();
    }
}

pub fn notification_json(recipient_id: &str) -> Value {
    json!({
        "recipient_id": recipient_id,
        "channel": "email",
        "severity": "medium",
        "priority_score": 40,
        "subject": "Hearing scheduled",
        "body": "A public hearing on parcel 7 is scheduled for Monday."
    })
}

pub fn unbatched() -> EngineConfig {
    EngineConfig {
        batching: BatchingConfig { enabled: false, ..Default::default() },
        ..Default::default()
    }
}
