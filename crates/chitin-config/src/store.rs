use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Entitlement and processed-event storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StoreBackend,
    /// Valkey connection URL, required for the `valkey` backend
    #[serde(default)]
    pub url: Option<Url>,
    /// Key prefix in Valkey
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// How long completed event markers are kept; `"0s"` keeps them forever
    #[serde(default = "default_marker_retention")]
    pub marker_retention: String,
    /// Interval between sweeps of expired markers in the memory backend
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local maps; state is lost on restart
    #[default]
    Memory,
    /// Valkey (or any Redis-protocol server)
    Valkey,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            key_prefix: default_key_prefix(),
            marker_retention: default_marker_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl StoreConfig {
    /// Parsed marker retention, `None` when markers never expire
    ///
    /// # Errors
    ///
    /// Returns an error if `marker_retention` is not a valid duration string
    pub fn marker_retention(&self) -> anyhow::Result<Option<Duration>> {
        let retention = duration_str::parse(&self.marker_retention).map_err(|e| {
            anyhow::anyhow!("invalid store.marker_retention '{}': {e}", self.marker_retention)
        })?;

        Ok((!retention.is_zero()).then_some(retention))
    }

    /// Parsed sweep interval
    ///
    /// # Errors
    ///
    /// Returns an error if `sweep_interval` is not a valid, non-zero duration
    pub fn sweep_interval(&self) -> anyhow::Result<Duration> {
        let interval = duration_str::parse(&self.sweep_interval)
            .map_err(|e| anyhow::anyhow!("invalid store.sweep_interval '{}': {e}", self.sweep_interval))?;

        if interval.is_zero() {
            anyhow::bail!("store.sweep_interval must be greater than 0");
        }

        Ok(interval)
    }
}

fn default_key_prefix() -> String {
    "chitin".to_owned()
}

fn default_marker_retention() -> String {
    "90d".to_owned()
}

fn default_sweep_interval() -> String {
    "1h".to_owned()
}
