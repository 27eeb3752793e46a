//! An in-memory [`ChainSource`] for tests.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::{
    block::{Header, Version},
    hashes::Hash,
    BlockHash, CompactTarget, TxMerkleNode, Txid,
};
use tokio::sync::Mutex;
use watchtower_primitives::types::BitcoinBlockHeight;

use crate::{
    event::BlockEvent,
    source::{ChainSource, ChainSourceError},
};

#[derive(Debug)]
struct MockBlock {
    header: Header,
    txids: Vec<Txid>,
}

#[derive(Debug)]
struct MockChainState {
    blocks: Vec<MockBlock>,
    available: bool,
    nonce: u32,
}

impl MockChainState {
    fn push(&mut self, txids: Vec<Txid>) -> BlockEvent {
        let prev_blockhash = self
            .blocks
            .last()
            .map(|block| block.header.block_hash())
            .unwrap_or_else(BlockHash::all_zeros);

        // every header gets a fresh nonce so that replaced blocks never collide
        self.nonce += 1;
        let header = Header {
            version: Version::ONE,
            prev_blockhash,
            merkle_root: TxMerkleNode::all_zeros(),
            time: self.nonce,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: self.nonce,
        };

        self.blocks.push(MockBlock { header, txids });

        BlockEvent {
            height: self.blocks.len() as BitcoinBlockHeight - 1,
            hash: header.block_hash(),
            prev_hash: prev_blockhash,
        }
    }

    fn find(&self, hash: &BlockHash) -> Result<&MockBlock, ChainSourceError> {
        self.blocks
            .iter()
            .find(|block| block.header.block_hash() == *hash)
            .ok_or(ChainSourceError::UnknownBlock(*hash))
    }

    fn check_available(&self) -> Result<(), ChainSourceError> {
        if self.available {
            Ok(())
        } else {
            Err(ChainSourceError::unavailable(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock chain is down",
            )))
        }
    }
}

/// A best chain living in memory. Starts with a single empty genesis block at height 0.
///
/// Cloning is cheap and every clone sees the same chain, so a test can keep mining on a clone
/// after handing another one to the code under test.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Creates a chain holding only the genesis block.
    pub fn new() -> Self {
        let mut state = MockChainState {
            blocks: Vec::new(),
            available: true,
            nonce: 0,
        };
        state.push(Vec::new());

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Mines a block confirming `txids` on top of the current tip.
    pub async fn mine_block(&self, txids: Vec<Txid>) -> BlockEvent {
        self.state.lock().await.push(txids)
    }

    /// Mines `count` empty blocks and returns the last one.
    pub async fn mine_empty_blocks(&self, count: usize) -> Option<BlockEvent> {
        let mut state = self.state.lock().await;

        (0..count).map(|_| state.push(Vec::new())).last()
    }

    /// Replaces the tip with a different block at the same height, simulating a one block reorg.
    pub async fn replace_tip(&self, txids: Vec<Txid>) -> BlockEvent {
        let mut state = self.state.lock().await;
        state.blocks.pop();

        state.push(txids)
    }

    /// Drops the `depth` topmost blocks and mines one block per entry of `branch` instead,
    /// simulating a reorg. Returns the new blocks in height order.
    pub async fn reorg(&self, depth: usize, branch: Vec<Vec<Txid>>) -> Vec<BlockEvent> {
        let mut state = self.state.lock().await;
        // genesis is never reorganized
        let keep = state.blocks.len().saturating_sub(depth).max(1);
        state.blocks.truncate(keep);

        branch.into_iter().map(|txids| state.push(txids)).collect()
    }

    /// Height of the current tip.
    pub async fn tip_height(&self) -> BitcoinBlockHeight {
        self.state.lock().await.blocks.len() as BitcoinBlockHeight - 1
    }

    /// Makes every [`ChainSource`] call fail (or succeed again).
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn current_height(&self) -> Result<BitcoinBlockHeight, ChainSourceError> {
        let state = self.state.lock().await;
        state.check_available()?;

        Ok(state.blocks.len() as BitcoinBlockHeight - 1)
    }

    async fn block_hash(&self, height: BitcoinBlockHeight) -> Result<BlockHash, ChainSourceError> {
        let state = self.state.lock().await;
        state.check_available()?;

        usize::try_from(height)
            .ok()
            .and_then(|height| state.blocks.get(height))
            .map(|block| block.header.block_hash())
            .ok_or(ChainSourceError::UnknownHeight(height))
    }

    async fn block_header(&self, hash: &BlockHash) -> Result<Header, ChainSourceError> {
        let state = self.state.lock().await;
        state.check_available()?;

        state.find(hash).map(|block| block.header)
    }

    async fn confirmed_txids(&self, hash: &BlockHash) -> Result<Vec<Txid>, ChainSourceError> {
        let state = self.state.lock().await;
        state.check_available()?;

        state.find(hash).map(|block| block.txids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mined_blocks_chain_together() {
        let chain = MockChain::new();
        let genesis = chain.block_hash(0).await.expect("genesis must exist");

        let first = chain.mine_block(vec![]).await;
        let second = chain.mine_block(vec![]).await;

        assert_eq!(first.prev_hash, genesis);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(second.height, 2);
        assert_eq!(chain.tip_height().await, 2);

        let header = chain
            .block_header(&second.hash)
            .await
            .expect("header must exist");
        assert_eq!(header.prev_blockhash, first.hash);
    }

    #[tokio::test]
    async fn replaced_tip_is_forgotten() {
        let chain = MockChain::new();
        let stale = chain.mine_block(vec![]).await;
        let fresh = chain.replace_tip(vec![]).await;

        assert_eq!(stale.height, fresh.height);
        assert!(matches!(
            chain.block_header(&stale.hash).await,
            Err(ChainSourceError::UnknownBlock(_))
        ));
        assert!(matches!(
            chain.block_hash(5).await,
            Err(ChainSourceError::UnknownHeight(5))
        ));
    }

    #[tokio::test]
    async fn reorg_forks_below_the_dropped_blocks() {
        let chain = MockChain::new();
        let kept = chain.mine_block(vec![]).await;
        let dropped = chain.mine_block(vec![]).await;

        let branch = chain.reorg(1, vec![vec![], vec![]]).await;

        assert_eq!(branch.len(), 2);
        assert_eq!(branch[0].height, dropped.height);
        assert_eq!(branch[0].prev_hash, kept.hash);
        assert_eq!(branch[1].prev_hash, branch[0].hash);
        assert_eq!(chain.tip_height().await, 3);
        assert!(chain.block_header(&dropped.hash).await.is_err());
    }
}
