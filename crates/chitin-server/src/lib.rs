mod health;
mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chitin_config::{Config, StoreBackend};
use chitin_store::{DocumentStore, MemoryStore, ValkeyStore};
use chitin_webhook::{WebhookProcessor, WebhookState};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    store: Arc<dyn DocumentStore>,
    sweep_interval: std::time::Duration,
}

impl Server {
    /// Build the server from configuration, connecting the configured store
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the webhook
    /// settings are invalid
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = build_store(&config).await?;
        Self::with_store(config, store)
    }

    /// Build the server around an existing store
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook settings are invalid
    pub fn with_store(config: Config, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let processor = WebhookProcessor::from_config(&config, Arc::clone(&store))?;

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        // Billing provider webhook
        app = app.merge(chitin_webhook::webhook_router(
            WebhookState::new(processor),
            &config.webhook.path,
        ));

        app = app.layer(TraceLayer::new_for_http());

        tracing::debug!(
            webhook_path = %config.webhook.path,
            store = ?config.store.backend,
            products = config.products.iter().count(),
            "routes assembled"
        );

        Ok(Self {
            router: app,
            listen_address,
            store,
            sweep_interval: config.store.sweep_interval()?,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Override the configured listen address
    #[must_use]
    pub fn with_listen_address(mut self, listen_address: SocketAddr) -> Self {
        self.listen_address = listen_address;
        self
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Also runs the marker retention sweep. Blocks until the cancellation
    /// token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails
    pub async fn serve_on(self, listener: tokio::net::TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let sweeper = tokio::spawn(sweeper::run(self.store, self.sweep_interval, shutdown.clone()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "marker sweeper task ended abnormally");
        }

        Ok(())
    }
}

/// Connect the store selected by `[store]`
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let retention = config.store.marker_retention()?;

    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; entitlements and event markers are lost on restart");
            Ok(Arc::new(MemoryStore::new(retention)))
        }
        StoreBackend::Valkey => {
            let url = config
                .store
                .url
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("store.url is required for the valkey backend"))?;

            let store = ValkeyStore::connect(url.as_str(), &config.store.key_prefix, retention)
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect to valkey at {}: {e}", url.host_str().unwrap_or("?")))?;

            tracing::info!(key_prefix = %config.store.key_prefix, "connected to valkey store");
            Ok(Arc::new(store))
        }
    }
}
