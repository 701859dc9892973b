//! In-memory chain backend.
//!
//! A complete, non-persistent implementation of the [`ChainMutator`] and
//! [`BlockStore`] contracts, backed by a `parking_lot::RwLock` over the
//! block vector. The reference node runs on it and every consensus test
//! drives it; a disk-backed engine implements the same two traits.
//!
//! Apply and delete counters are exposed so tests can assert properties
//! like "a second sync performs zero rollbacks" without instrumenting the
//! consensus code itself.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::chain::block::{short_id, Block, BlockId};
use crate::config::ROUND_LENGTH;
use crate::external::{BlockStore, ChainError, ChainMutator, CommonBlockDescriptor};

/// Non-persistent chain storage with a single canonical branch.
#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks: RwLock<Vec<Block>>,
    applies: AtomicU64,
    deletes: AtomicU64,
    recoveries: AtomicU64,
}

impl MemoryChain {
    /// Creates an empty chain. Until a genesis block is applied, the tip
    /// reads as the well-known genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain with the genesis block already installed.
    pub fn with_genesis() -> Self {
        let chain = Self::new();
        chain.blocks.write().push(Block::genesis());
        chain
    }

    /// Creates a chain preloaded with the given blocks, genesis first.
    /// The caller is responsible for their linkage.
    pub fn seeded(blocks: Vec<Block>) -> Self {
        let chain = Self::new();
        *chain.blocks.write() = blocks;
        chain
    }

    /// Current chain height.
    pub fn height(&self) -> u64 {
        self.blocks.read().last().map(|b| b.height).unwrap_or(1)
    }

    /// Snapshot of every stored block, oldest first.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.read().clone()
    }

    /// Number of `apply_block` calls accepted so far.
    pub fn apply_count(&self) -> u64 {
        self.applies.load(Ordering::SeqCst)
    }

    /// Number of `delete_last_block` calls that removed a block.
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of deep recovery invocations.
    pub fn recovery_count(&self) -> u64 {
        self.recoveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainMutator for MemoryChain {
    async fn apply_block(
        &self,
        block: &Block,
        _broadcast: bool,
        _persist: bool,
    ) -> Result<(), ChainError> {
        let mut blocks = self.blocks.write();
        let tip = blocks.last().cloned().unwrap_or_else(Block::genesis);
        if block.previous_block_id != Some(tip.id) || block.height != tip.height + 1 {
            return Err(ChainError::Storage(format!(
                "block {} at height {} does not extend tip {} at height {}",
                short_id(&block.id),
                block.height,
                short_id(&tip.id),
                tip.height,
            )));
        }
        blocks.push(block.clone());
        self.applies.fetch_add(1, Ordering::SeqCst);
        debug!(height = block.height, id = %short_id(&block.id), "block applied");
        Ok(())
    }

    async fn apply_genesis_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut blocks = self.blocks.write();
        if !blocks.is_empty() {
            return Err(ChainError::Storage("chain is not empty".into()));
        }
        blocks.push(block.clone());
        info!(id = %short_id(&block.id), "genesis block applied");
        Ok(())
    }

    async fn delete_last_block(&self) -> Result<Block, ChainError> {
        let mut blocks = self.blocks.write();
        if blocks.len() <= 1 {
            return Err(ChainError::CannotDeleteGenesis);
        }
        let popped = blocks.pop().map(|b| b.height).unwrap_or(0);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let tip = blocks.last().cloned().unwrap_or_else(Block::genesis);
        debug!(popped_height = popped, new_tip = tip.height, "block deleted");
        Ok(tip)
    }

    async fn recover_chain(&self) -> Result<(), ChainError> {
        // Deep recovery drops at most one full round so the next sync can
        // rebuild the suffix from a healthier peer set.
        let mut blocks = self.blocks.write();
        let keep = blocks.len().saturating_sub(ROUND_LENGTH as usize).max(1);
        let dropped = blocks.len() - keep;
        blocks.truncate(keep);
        self.recoveries.fetch_add(1, Ordering::SeqCst);
        info!(dropped, new_height = blocks.last().map(|b| b.height).unwrap_or(1),
            "deep chain recovery");
        Ok(())
    }
}

impl BlockStore for MemoryChain {
    fn tip(&self) -> Block {
        self.blocks.read().last().cloned().unwrap_or_else(Block::genesis)
    }

    fn has_block(&self, id: &BlockId) -> bool {
        self.blocks.read().iter().any(|b| b.id == *id)
    }

    fn id_at_height(&self, height: u64) -> Option<BlockId> {
        self.blocks
            .read()
            .iter()
            .find(|b| b.height == height)
            .map(|b| b.id)
    }

    fn has_exact(&self, descriptor: &CommonBlockDescriptor) -> bool {
        self.blocks.read().iter().any(|b| {
            b.id == descriptor.id
                && b.height == descriptor.height
                && b.previous_block_id == descriptor.previous_block_id
        })
    }
}
