use std::time::Duration;

use crate::config::CoordinatorConfig;

/// Exponential reconnect delay capped at a fixed ceiling.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct ReconnectPolicy {
    base: Duration,
    multiplier: u32,
    cap: Duration,
}

impl ReconnectPolicy {
    pub(crate) fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            base: config.backoff_base(),
            multiplier: config.backoff_multiplier(),
            cap: config.backoff_cap(),
        }
    }

    /// Delay before the reconnect following `attempt` consecutive failures.
    pub(crate) fn delay_for(self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(self.multiplier.saturating_pow(attempt))
            .min(self.cap)
    }
}
