//! Defaults for the watcher configuration.

use std::time::Duration;

use watchtower_primitives::types::BitcoinBlockHeight;

/// Maximum number of live appointments.
pub const DEFAULT_MAX_APPOINTMENTS: usize = 100;

/// Number of blocks past its `end_time` an appointment is still watched for.
pub const DEFAULT_EXPIRY_DELTA: BitcoinBlockHeight = 6;

/// Wait between two attempts at fetching the contents of a block from the chain source.
pub const DEFAULT_CHAIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);
