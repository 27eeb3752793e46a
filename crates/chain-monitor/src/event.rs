//! This module defines the events handed to block consumers.

use bitcoin::BlockHash;
use watchtower_primitives::types::BitcoinBlockHeight;

/// A new best-height block observed by the [`ChainMonitor`](crate::ChainMonitor).
///
/// Only the block's identity travels through the fan-out. Consumers fetch whatever else they need
/// (such as the confirmed txids) from their own chain source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockEvent {
    /// Height of the block.
    pub height: BitcoinBlockHeight,

    /// Hash of the block.
    pub hash: BlockHash,

    /// Hash of the block's parent as committed in its header.
    pub prev_hash: BlockHash,
}
