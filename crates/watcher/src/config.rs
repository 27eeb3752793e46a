//! This module contains the configuration of the [`Watcher`](crate::Watcher).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use watchtower_primitives::types::BitcoinBlockHeight;

use crate::constants::{
    DEFAULT_CHAIN_RETRY_INTERVAL, DEFAULT_EXPIRY_DELTA, DEFAULT_MAX_APPOINTMENTS,
};

/// Tunables of the [`Watcher`](crate::Watcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Appointments beyond this many live ones are rejected.
    max_appointments: usize,

    /// An appointment is dropped once the chain is more than this many blocks past its
    /// `end_time`.
    expiry_delta: BitcoinBlockHeight,

    /// Wait between two attempts at fetching a block's txids.
    chain_retry_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_appointments: DEFAULT_MAX_APPOINTMENTS,
            expiry_delta: DEFAULT_EXPIRY_DELTA,
            chain_retry_interval: DEFAULT_CHAIN_RETRY_INTERVAL,
        }
    }
}

impl WatcherConfig {
    pub const fn with_max_appointments(mut self, max_appointments: usize) -> Self {
        self.max_appointments = max_appointments;
        self
    }

    pub const fn with_expiry_delta(mut self, expiry_delta: BitcoinBlockHeight) -> Self {
        self.expiry_delta = expiry_delta;
        self
    }

    pub const fn with_chain_retry_interval(mut self, interval: Duration) -> Self {
        self.chain_retry_interval = interval;
        self
    }

    pub const fn max_appointments(&self) -> usize {
        self.max_appointments
    }

    pub const fn expiry_delta(&self) -> BitcoinBlockHeight {
        self.expiry_delta
    }

    pub const fn chain_retry_interval(&self) -> Duration {
        self.chain_retry_interval
    }

    /// Whether an appointment ending at `end_time` is expired at `height`.
    pub const fn is_expired(
        &self,
        end_time: BitcoinBlockHeight,
        height: BitcoinBlockHeight,
    ) -> bool {
        end_time.saturating_add(self.expiry_delta) < height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: WatcherConfig = serde_json::from_str("{}").expect("must deserialize");

        assert_eq!(config.max_appointments(), 100);
        assert_eq!(config.expiry_delta(), 6);
    }

    #[test]
    fn expiry_is_strictly_after_the_grace_period() {
        let config = WatcherConfig::default().with_expiry_delta(6);

        assert!(!config.is_expired(100, 106));
        assert!(config.is_expired(100, 107));
        assert!(!config.is_expired(u64::MAX, u64::MAX));
    }
}
