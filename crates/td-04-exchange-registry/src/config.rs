//! Registry configuration.

use std::time::Duration;

/// Default lifetime of an unfinished exchange.
pub const DEFAULT_EXCHANGE_TTL: Duration = Duration::from_secs(2 * 60);

/// Exchange registry settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Exchanges older than this without a terminal status are evicted.
    pub ttl: Duration,
    /// Minimum time between two sweeps. `None` means a quarter of `ttl`.
    pub min_sweep_interval: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_EXCHANGE_TTL,
            min_sweep_interval: None,
        }
    }
}

impl RegistryConfig {
    pub fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }

    pub fn sweep_interval_ms(&self) -> u64 {
        self.min_sweep_interval
            .map_or(self.ttl_ms() / 4, |interval| interval.as_millis() as u64)
    }
}
