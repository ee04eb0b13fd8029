#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod products;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod webhook;

use serde::Deserialize;

pub use products::*;
pub use server::*;
pub use store::*;
pub use telemetry::TelemetryConfig;
pub use webhook::*;

/// Top-level Chitin configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Billing webhook endpoint configuration
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Product identifier to token grant table
    #[serde(default)]
    pub products: ProductsConfig,
    /// Entitlement and event-marker storage
    #[serde(default)]
    pub store: StoreConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
