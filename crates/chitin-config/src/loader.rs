use std::path::Path;

use crate::{Config, StoreBackend};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text, expanding placeholders first
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// A missing webhook bearer token is not a validation failure: the
    /// endpoint reports it per request so the rest of the service can run.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook route, durations, or store settings
    /// are invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_webhook()?;
        self.validate_store()?;
        Ok(())
    }

    fn validate_webhook(&self) -> anyhow::Result<()> {
        let path = &self.webhook.path;
        if !path.starts_with('/') || path.len() < 2 {
            anyhow::bail!("webhook.path must be an absolute route, got '{path}'");
        }

        if self.server.health.enabled && self.server.health.path == *path {
            anyhow::bail!("webhook.path must differ from the health check path");
        }

        if self.webhook.claim_ttl()?.is_zero() {
            anyhow::bail!("webhook.claim_ttl must be greater than 0");
        }

        if self.webhook.bearer_token().is_none() {
            tracing::warn!("webhook.bearer_token is not set; billing webhooks will be rejected with 500");
        }

        if self.products.is_empty() {
            tracing::warn!("no products configured; purchase events will grant zero tokens");
        }

        Ok(())
    }

    fn validate_store(&self) -> anyhow::Result<()> {
        self.store.marker_retention()?;
        self.store.sweep_interval()?;

        if self.store.backend == StoreBackend::Valkey && self.store.url.is_none() {
            anyhow::bail!("store.url is required when store.backend is \"valkey\"");
        }

        if self.store.key_prefix.is_empty() {
            anyhow::bail!("store.key_prefix must not be empty");
        }

        Ok(())
    }
}
