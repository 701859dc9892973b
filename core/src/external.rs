//! # Collaborator Contracts
//!
//! The consensus core decides; collaborators act. Everything that persists
//! blocks, talks to peers, validates transaction semantics, or knows the
//! delegate schedule sits behind one of these traits and is injected at
//! construction — there is no ambient registry to resolve from, which keeps
//! every dependency of a consensus decision visible at the call site.
//!
//! The core defines only the in-memory shapes it reads and writes. Wire
//! formats and storage schemas belong to the implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::block::{Block, BlockId, Transaction};

// ---------------------------------------------------------------------------
// Shared Types
// ---------------------------------------------------------------------------

/// A remote peer as supplied for one sync attempt: endpoint plus its
/// self-reported chain height. Ephemeral — peer selection and reputation
/// live outside the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Endpoint string, opaque to the core (the transport resolves it).
    pub address: String,
    /// The peer's advertised chain height.
    pub height: u64,
}

/// The ancestor negotiated with a peer, consumed once per sync attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonBlockDescriptor {
    /// Id of the agreed ancestor block.
    pub id: BlockId,
    /// Its height on both chains.
    pub height: u64,
    /// Its parent id, used to re-validate the claim against local storage.
    pub previous_block_id: Option<BlockId>,
}

/// Why a fork event was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkCause {
    /// A block at the next height arrived from a different parent.
    Type1,
    /// Two different blocks exist at the same height with the same parent.
    Type5,
    /// A block was signed by a delegate outside its assigned slot.
    WrongForgeSlot,
}

/// Write-once audit record emitted whenever divergence is observed.
///
/// Persisted by an external collaborator and consumed later by peer
/// reputation analysis; the core itself never penalizes anyone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkEvent {
    /// Id of the offending block.
    pub block_id: BlockId,
    /// Its claimed height.
    pub height: u64,
    /// Its claimed parent.
    pub previous_block_id: Option<BlockId>,
    /// The key that signed it.
    pub generator_public_key: [u8; 32],
    /// Classification of the divergence.
    pub cause: ForkCause,
    /// Unix timestamp at which this node observed the fork.
    pub noted_at: i64,
}

impl ForkEvent {
    /// Builds an event for `block` with the given cause, stamped now.
    pub fn of(block: &Block, cause: ForkCause) -> Self {
        ForkEvent {
            block_id: block.id,
            height: block.height,
            previous_block_id: block.previous_block_id,
            generator_public_key: block.generator_public_key,
            cause,
            noted_at: chrono::Utc::now().timestamp(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the chain mutator or block store.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The persistence layer failed; the tip is unchanged.
    #[error("storage failure: {0}")]
    Storage(String),
    /// Rollback reached the genesis block, which can never be popped.
    #[error("cannot delete the genesis block")]
    CannotDeleteGenesis,
}

/// Failures surfaced by the peer client.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The peer could not be reached or dropped the connection.
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    /// The peer answered with something structurally invalid.
    #[error("malformed peer response: {0}")]
    BadPayload(String),
}

/// A transaction failed semantic validation. The message is descriptive
/// enough for the operator log; the block carrying it is rejected whole.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransactionRejected(pub String);

/// A block was forged outside its generator's assigned slot.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ForgingSlotRejected(pub String);

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// The sole mutator of the chain tip.
///
/// Implementations own persistence. The core guarantees every call arrives
/// from within the serialized execution slot, so implementations never see
/// two mutations racing.
#[async_trait]
pub trait ChainMutator: Send + Sync {
    /// Applies a fully verified block on top of the current tip.
    async fn apply_block(&self, block: &Block, broadcast: bool, persist: bool)
        -> Result<(), ChainError>;

    /// Installs the genesis block into empty storage.
    async fn apply_genesis_block(&self, block: &Block) -> Result<(), ChainError>;

    /// Pops the current tip and returns the new one.
    async fn delete_last_block(&self) -> Result<Block, ChainError>;

    /// Deep chain recovery, invoked only on multi-signal divergence (a
    /// failed negotiation while cross-peer consensus confidence is already
    /// low). A single peer's claim never reaches this.
    async fn recover_chain(&self) -> Result<(), ChainError>;
}

/// Read-only chain queries.
///
/// Reads may run concurrently with a pending mutation; implementations
/// must return a consistent snapshot per call.
pub trait BlockStore: Send + Sync {
    /// The block currently considered the canonical head.
    fn tip(&self) -> Block;

    /// Whether a block with this id exists anywhere in local storage.
    fn has_block(&self, id: &BlockId) -> bool;

    /// The id of the canonical block at `height`, if the chain reaches it.
    fn id_at_height(&self, height: u64) -> Option<BlockId>;

    /// Whether local storage holds a block matching the descriptor exactly
    /// (id, height, and parent). Defends against a peer claiming ancestry
    /// that never existed here.
    fn has_exact(&self, descriptor: &CommonBlockDescriptor) -> bool;
}

/// Transaction-level semantic validation against current state.
#[async_trait]
pub trait TransactionValidator: Send + Sync {
    /// Verifies one transaction in the context of a block forged at
    /// `height`. Account resolution happens inside the implementation,
    /// since account state belongs to the storage engine.
    async fn verify(&self, tx: &Transaction, height: u64) -> Result<(), TransactionRejected>;
}

/// Network access to one peer, request/response style.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Asks the peer for its best match among our checkpoint ids. `None`
    /// means the peer claims no shared history at all.
    async fn common_block_ids(
        &self,
        peer: &PeerDescriptor,
        ids: &[BlockId],
    ) -> Result<Option<CommonBlockDescriptor>, PeerError>;

    /// Fetches an ordered page of up to `limit` blocks newer than
    /// `last_block_id` from the peer.
    async fn blocks_since(
        &self,
        peer: &PeerDescriptor,
        last_block_id: BlockId,
        limit: usize,
    ) -> Result<Vec<Block>, PeerError>;
}

/// Delegate slot-schedule oracle.
#[async_trait]
pub trait DelegateSlotChecker: Send + Sync {
    /// Fails if the block's slot belongs to a different delegate than the
    /// one that signed it.
    async fn assert_valid_forging_slot(&self, block: &Block) -> Result<(), ForgingSlotRejected>;
}

/// Cross-peer consensus confidence, computed elsewhere and consumed here
/// strictly as an opaque boolean. The core must never re-derive or
/// approximate it.
pub trait ConsensusGauge: Send + Sync {
    /// True when the node has independently lost confidence in its own
    /// chain's agreement with the network.
    fn has_poor_consensus(&self) -> bool;
}

/// Sink for fork audit records. Fire-and-forget — recording must never
/// block or fail the consensus path.
pub trait ForkEventSink: Send + Sync {
    /// Persists one fork event.
    fn record(&self, event: ForkEvent);
}
