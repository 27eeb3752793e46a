//! Configuration of the [`ChainMonitor`](crate::ChainMonitor).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BURY_DEPTH, DEFAULT_POLLING_INTERVAL};

/// ChainMonitorConfig controls how the [`ChainMonitor`](crate::ChainMonitor) talks to its chain
/// source.
///
/// You should construct a ChainMonitorConfig with [`Default::default`] and modify it with the
/// member methods on this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainMonitorConfig {
    /// Period between two polls, defaults to [`DEFAULT_POLLING_INTERVAL`].
    pub(crate) polling_interval: Duration,

    /// How many delivered blocks are remembered to find the fork point of a reorg, defaults to
    /// [`DEFAULT_BURY_DEPTH`].
    pub(crate) bury_depth: usize,
}

impl ChainMonitorConfig {
    /// Updates the ChainMonitorConfig with a new polling interval and returns the updated config.
    ///
    /// Useful for a builder pattern with dotchaining.
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Updates the ChainMonitorConfig with a new bury depth and returns the updated config.
    pub const fn with_bury_depth(mut self, depth: usize) -> Self {
        self.bury_depth = depth;
        self
    }

    /// Number of delivered blocks remembered for reorg detection.
    pub const fn bury_depth(&self) -> usize {
        self.bury_depth
    }

    /// Period between two polls of the chain source.
    pub const fn polling_interval(&self) -> Duration {
        self.polling_interval
    }
}

impl Default for ChainMonitorConfig {
    fn default() -> Self {
        ChainMonitorConfig {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            bury_depth: DEFAULT_BURY_DEPTH,
        }
    }
}
