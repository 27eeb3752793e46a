//! The chain data source the monitor polls.

use async_trait::async_trait;
use bitcoin::{block::Header, BlockHash, Txid};
use thiserror::Error;
use watchtower_primitives::types::BitcoinBlockHeight;

/// Errors returned by a [`ChainSource`].
#[derive(Debug, Error)]
pub enum ChainSourceError {
    /// The source could not be reached or returned garbage.
    #[error("chain source unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No block exists at the requested height on the best chain.
    #[error("no block at height {0}")]
    UnknownHeight(BitcoinBlockHeight),

    /// The source does not know the requested block.
    #[error("unknown block {0}")]
    UnknownBlock(BlockHash),
}

impl ChainSourceError {
    /// Wraps any error raised by the underlying transport.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Box::new(err))
    }
}

/// Read-only access to the best chain.
///
/// Implementations are expected to be cheap to call repeatedly. Neither the monitor nor the
/// watcher cache anything they fetch.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Height of the current best block.
    async fn current_height(&self) -> Result<BitcoinBlockHeight, ChainSourceError>;

    /// Hash of the best-chain block at `height`.
    async fn block_hash(&self, height: BitcoinBlockHeight) -> Result<BlockHash, ChainSourceError>;

    /// Header of the block identified by `hash`.
    async fn block_header(&self, hash: &BlockHash) -> Result<Header, ChainSourceError>;

    /// Txids of every transaction confirmed in the block identified by `hash`.
    async fn confirmed_txids(&self, hash: &BlockHash) -> Result<Vec<Txid>, ChainSourceError>;
}
