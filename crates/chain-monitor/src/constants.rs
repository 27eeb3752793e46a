//! This module provides the constant values used throughout the crate.

use std::time::Duration;

/// Default period between two polls of the chain source.
///
/// Bitcoin blocks arrive every ten minutes on average so this mostly bounds detection latency.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of delivered blocks remembered for reorg detection.
///
/// A reorg replacing more blocks than this is still re-delivered, starting from the oldest
/// remembered height.
pub const DEFAULT_BURY_DEPTH: usize = 6;
