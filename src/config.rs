//! Resilience layer configuration.

use serde::Deserialize;
use std::time::Duration;

/// Tunables for the resilience layer.
///
/// Deserializable from whatever configuration source the host application
/// uses; every field has a production default so an empty table works.
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Attempts per retry sequence and per queued operation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in seconds (doubles per attempt)
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Inactivity window in seconds after which retry state is discarded
    #[serde(default = "default_idle_reset_secs")]
    pub idle_reset_secs: u64,

    /// Cache time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Stale window as a multiple of the ttl
    #[serde(default = "default_cache_stale_factor")]
    pub cache_stale_factor: u32,

    /// Path of the queue snapshot file; `None` keeps the queue in memory
    #[serde(default)]
    pub queue_path: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_idle_reset_secs() -> u64 {
    600
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_stale_factor() -> u32 {
    3
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            idle_reset_secs: default_idle_reset_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_stale_factor: default_cache_stale_factor(),
            queue_path: None,
        }
    }
}

impl ResilienceConfig {
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    #[must_use]
    pub fn idle_reset(&self) -> Duration {
        Duration::from_secs(self.idle_reset_secs)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
