//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use chitin_config::{Config, HealthConfig, ProductsConfig, ServerConfig, UnknownProductPolicy, WebhookConfig};
use secrecy::SecretString;

/// Bearer token configured by [`ConfigBuilder::new`]
pub const TOKEN: &str = "integration-webhook-token";

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with a bearer token and the default products
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig::default(),
                },
                webhook: WebhookConfig {
                    bearer_token: Some(SecretString::from(TOKEN)),
                    ..WebhookConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Leave the bearer token unset
    pub fn without_token(mut self) -> Self {
        self.config.webhook.bearer_token = None;
        self
    }

    /// Serve the webhook at a different path
    pub fn with_webhook_path(mut self, path: &str) -> Self {
        path.clone_into(&mut self.config.webhook.path);
        self
    }

    /// Replace the product table
    pub fn with_products(mut self, products: &[(&str, u64)]) -> Self {
        self.config.products = products.iter().copied().collect::<ProductsConfig>();
        self
    }

    pub fn with_unknown_product_policy(mut self, policy: UnknownProductPolicy) -> Self {
        self.config.webhook.unknown_product_policy = policy;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
