//! Defaults for the persistence layer.

use std::time::Duration;

/// The number of times a transient database failure is retried before erroring out.
pub const DEFAULT_MAX_RETRY_COUNT: usize = 5;

/// The period of time to wait between retries.
pub const DEFAULT_BACKOFF_PERIOD: Duration = Duration::from_secs(1);

/// SQLite result code for a busy database file.
pub(super) const SQLITE_BUSY: &str = "5";

/// SQLite result code for a locked table.
pub(super) const SQLITE_LOCKED: &str = "6";
