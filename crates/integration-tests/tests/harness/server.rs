//! Test server wrapper that starts Chitin on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use chitin_config::Config;
use chitin_server::Server;
use chitin_store::{DocumentStore, EntitlementRecord, EventMarker, MemoryStore};
use tokio_util::sync::CancellationToken;

use super::config::TOKEN;

/// A running test server instance backed by an inspectable in-memory store
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    store: Arc<MemoryStore>,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new(config.store.marker_retention()?));
        let server = Server::with_store(config, store.clone())?;
        let shutdown = CancellationToken::new();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.serve_on(listener, serve_shutdown).await.ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            store,
        })
    }

    /// URL of a path on the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a JSON body to `path` with the configured bearer token
    pub async fn deliver(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(TOKEN)
            .json(body)
            .send()
            .await
            .expect("request should reach the test server")
    }

    pub async fn entitlement(&self, app_user_id: &str) -> Option<EntitlementRecord> {
        self.store.entitlement(app_user_id).await.expect("memory store read")
    }

    pub async fn marker(&self, event_id: &str) -> Option<EventMarker> {
        self.store.marker(event_id).await.expect("memory store read")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A provider event in the wrapped payload shape
pub fn event(event_id: &str, event_type: &str, app_user_id: &str, product_id: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "api_version": "1.0",
        "event": {
            "id": event_id,
            "type": event_type,
            "app_user_id": app_user_id,
            "product_id": product_id,
            "event_timestamp_ms": 1_767_225_600_000_i64,
        }
    })
}
