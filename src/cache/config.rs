//! Cache configuration.

use std::time::Duration;

const DEFAULT_TASKS_TTL_SECS: u64 = 60;
const DEFAULT_TTL_SECS: u64 = 300;

/// Runtime cache policy derived from `[cache]` settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, reads go straight to the producer and nothing is stored.
    pub enabled: bool,
    /// Expiry for the full task list.
    pub tasks_ttl: Duration,
    /// Expiry for entries that do not specify their own.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tasks_ttl: Duration::from_secs(DEFAULT_TASKS_TTL_SECS),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            tasks_ttl: settings.tasks_ttl,
            default_ttl: settings.default_ttl,
        }
    }
}

impl CacheConfig {
    /// Returns the expiry for `key`, falling back to the default TTL.
    pub fn ttl_for(&self, key: super::CacheKey) -> Duration {
        match key {
            super::CacheKey::AllTasks => self.tasks_ttl,
            super::CacheKey::AllUsers => self.default_ttl,
        }
    }
}
