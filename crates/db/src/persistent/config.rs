//! Configuration of the SQLite persistence layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{DEFAULT_BACKOFF_PERIOD, DEFAULT_MAX_RETRY_COUNT};

/// Retry policy applied to every SQLite operation.
///
/// Only transient failures (busy or locked database, pool timeouts, I/O) are retried. Anything
/// else is surfaced to the caller immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    max_retry_count: usize,
    backoff_period: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            backoff_period: DEFAULT_BACKOFF_PERIOD,
        }
    }
}

impl DbConfig {
    /// Sets how many times a transient failure is retried.
    pub const fn with_max_retry_count(self, count: usize) -> Self {
        Self {
            max_retry_count: count,
            ..self
        }
    }

    /// Sets the wait between two attempts.
    pub const fn with_backoff_period(self, period: Duration) -> Self {
        Self {
            backoff_period: period,
            ..self
        }
    }

    pub const fn max_retry_count(&self) -> usize {
        self.max_retry_count
    }

    pub const fn backoff_period(&self) -> Duration {
        self.backoff_period
    }
}
