//! Shared test fixtures: deterministic keys, signed transactions, forged
//! chains, and scripted collaborator doubles. Compiled only for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;

use crate::chain::block::{Block, BlockId, Transaction};
use crate::config::SLOT_DURATION_SECS;
use crate::external::{
    CommonBlockDescriptor, ConsensusGauge, DelegateSlotChecker, ForkEvent, ForkEventSink,
    ForgingSlotRejected, PeerClient, PeerDescriptor, PeerError, TransactionRejected,
    TransactionValidator,
};

/// Deterministic Ed25519 keypair derived from a one-byte seed.
pub fn delegate_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// A structurally complete signed transaction. The consensus core never
/// checks transaction signatures itself, so the fixture signs its own
/// canonical bytes for shape, not for cryptographic meaning.
pub fn signed_tx(seed: u8, amount: u64, fee: u64) -> Transaction {
    use ed25519_dalek::Signer;

    let key = delegate_key(seed.wrapping_add(100));
    let mut tx = Transaction {
        id: [0u8; 32],
        timestamp: seed as u64,
        sender_public_key: key.verifying_key().to_bytes(),
        recipient: format!("hls:{}", hex::encode([seed; 4])),
        amount,
        fee,
        signature: Vec::new(),
    };
    tx.signature = key.sign(&tx.canonical_bytes()).to_bytes().to_vec();
    tx.id = tx.compute_id();
    tx
}

/// Forges a linked chain of `len` blocks starting at genesis, one slot
/// apart. Returned oldest first; `result[0]` is genesis at height 1.
pub fn forge_chain(len: usize) -> Vec<Block> {
    let mut chain = vec![Block::genesis()];
    for i in 1..len {
        let parent = &chain[i - 1];
        let key = delegate_key(i as u8);
        let timestamp = i as u64 * SLOT_DURATION_SECS;
        chain.push(Block::forge(parent, vec![], &key, timestamp));
    }
    chain
}

/// Forges one empty block on `parent`, signed by the seeded delegate.
pub fn forge_on(parent: &Block, seed: u8, timestamp: u64) -> Block {
    Block::forge(parent, vec![], &delegate_key(seed), timestamp)
}

/// Descriptor for a block already in a chain, as a peer would report it.
pub fn descriptor_for(block: &Block) -> CommonBlockDescriptor {
    CommonBlockDescriptor {
        id: block.id,
        height: block.height,
        previous_block_id: block.previous_block_id,
    }
}

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

/// Accepts every transaction.
pub struct AcceptAllTxs;

#[async_trait]
impl TransactionValidator for AcceptAllTxs {
    async fn verify(&self, _tx: &Transaction, _height: u64) -> Result<(), TransactionRejected> {
        Ok(())
    }
}

/// Rejects any transaction whose id matches, accepts the rest.
pub struct RejectTxById(pub [u8; 32]);

#[async_trait]
impl TransactionValidator for RejectTxById {
    async fn verify(&self, tx: &Transaction, _height: u64) -> Result<(), TransactionRejected> {
        if tx.id == self.0 {
            Err(TransactionRejected("scripted rejection".into()))
        } else {
            Ok(())
        }
    }
}

/// Slot checker that approves every block.
pub struct AnySlot;

#[async_trait]
impl DelegateSlotChecker for AnySlot {
    async fn assert_valid_forging_slot(&self, _block: &Block) -> Result<(), ForgingSlotRejected> {
        Ok(())
    }
}

/// Slot checker that rejects every block.
pub struct NoSlot;

#[async_trait]
impl DelegateSlotChecker for NoSlot {
    async fn assert_valid_forging_slot(&self, _block: &Block) -> Result<(), ForgingSlotRejected> {
        Err(ForgingSlotRejected("wrong delegate for slot".into()))
    }
}

/// Consensus gauge pinned to a fixed reading.
pub struct FixedGauge(pub bool);

impl ConsensusGauge for FixedGauge {
    fn has_poor_consensus(&self) -> bool {
        self.0
    }
}

/// Records every fork event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ForkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ForkEvent> {
        self.events.lock().clone()
    }
}

impl ForkEventSink for RecordingSink {
    fn record(&self, event: ForkEvent) {
        self.events.lock().push(event);
    }
}

/// A peer client that plays back scripted responses.
///
/// `common_block_ids` answers from the `common` queue (empty queue means
/// "no shared history"); `blocks_since` serves the next page, or an empty
/// page once exhausted. Checkpoint lists sent to the peer are captured for
/// assertions.
#[derive(Default)]
pub struct ScriptedPeer {
    common: Mutex<VecDeque<Option<CommonBlockDescriptor>>>,
    pages: Mutex<VecDeque<Vec<Block>>>,
    sent_checkpoints: Mutex<Vec<Vec<BlockId>>>,
}

impl ScriptedPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_common(self, answer: Option<CommonBlockDescriptor>) -> Self {
        self.common.lock().push_back(answer);
        self
    }

    pub fn serve_page(self, page: Vec<Block>) -> Self {
        self.pages.lock().push_back(page);
        self
    }

    /// Every checkpoint id list this peer was asked about, in call order.
    pub fn checkpoint_requests(&self) -> Vec<Vec<BlockId>> {
        self.sent_checkpoints.lock().clone()
    }

    pub fn negotiation_count(&self) -> usize {
        self.sent_checkpoints.lock().len()
    }
}

#[async_trait]
impl PeerClient for ScriptedPeer {
    async fn common_block_ids(
        &self,
        _peer: &PeerDescriptor,
        ids: &[BlockId],
    ) -> Result<Option<CommonBlockDescriptor>, PeerError> {
        self.sent_checkpoints.lock().push(ids.to_vec());
        Ok(self.common.lock().pop_front().unwrap_or(None))
    }

    async fn blocks_since(
        &self,
        _peer: &PeerDescriptor,
        _last_block_id: BlockId,
        _limit: usize,
    ) -> Result<Vec<Block>, PeerError> {
        Ok(self.pages.lock().pop_front().unwrap_or_default())
    }
}

/// One-line peer descriptor for tests.
pub fn peer(height: u64) -> PeerDescriptor {
    PeerDescriptor {
        address: "198.51.100.7:7331".into(),
        height,
    }
}
