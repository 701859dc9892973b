//! # Common-Ancestor Negotiation
//!
//! Before a node can fast-forward from a peer it has to know where the two
//! chains last agreed. Rather than binary-searching block by block, the
//! locator sends one bounded probe: a checkpoint id sequence covering the
//! tip, the first block of each of the last five rounds, and genesis. The
//! peer answers with the most recent id it also stores, which in turn bounds
//! how far the synchronizer may roll back.
//!
//! ## Design Decisions
//!
//! - The probe is built from local storage at call time, so a concurrent
//!   tip change between building and answering is tolerated; the answer is
//!   re-checked against local storage before it is trusted.
//! - The answer must be one of the ids the probe actually asked about. An
//!   honest peer can only ever name a probed checkpoint, and the deepest
//!   probed checkpoint is what bounds how far the synchronizer may roll
//!   back; a peer naming some other locally-stored block is lying and gets
//!   rejected rather than granted a deeper unwind.
//! - A peer that claims *no* common block is contradicting the shared
//!   genesis. That is either a hostile peer or evidence this node is on a
//!   long-dead branch; which one is decided by the consensus gauge, and
//!   only the latter triggers deep local recovery.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::block::{short_id, BlockId};
use crate::chain::slots::{round_of, round_start_height};
use crate::config::CHECKPOINT_ROUNDS;
use crate::external::{
    BlockStore, ChainError, ChainMutator, CommonBlockDescriptor, ConsensusGauge, PeerClient,
    PeerDescriptor, PeerError,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why negotiation produced no usable ancestor.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Transport-level failure talking to the peer. Retryable.
    #[error(transparent)]
    Peer(#[from] PeerError),
    /// The peer answered with a descriptor that cannot be valid.
    #[error("malformed common-block response from {peer}: {detail}")]
    MalformedResponse {
        /// The peer's address.
        peer: String,
        /// What was wrong with the descriptor.
        detail: String,
    },
    /// The peer named an ancestor this node does not actually store.
    #[error("peer {peer} claimed unknown ancestor {id}")]
    UnknownAncestor {
        /// The peer's address.
        peer: String,
        /// Short id of the claimed ancestor.
        id: String,
    },
    /// The peer denied sharing any checkpoint, including genesis, while
    /// local consensus confidence is healthy. Try another peer.
    #[error("peer {0} shares no checkpoint; treating as noncompliant")]
    NoncompliantPeer(String),
    /// The peer denied sharing any checkpoint *and* local consensus
    /// confidence was independently poor; deep chain recovery has been
    /// started and the sync attempt must be abandoned.
    #[error("no common checkpoint with {0} and poor consensus; chain recovery triggered")]
    ChainRecoveryTriggered(String),
    /// Chain recovery itself failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

// ---------------------------------------------------------------------------
// CommonBlockLocator
// ---------------------------------------------------------------------------

/// Builds checkpoint probes and negotiates the last shared block with a peer.
pub struct CommonBlockLocator {
    store: Arc<dyn BlockStore>,
    mutator: Arc<dyn ChainMutator>,
    peers: Arc<dyn PeerClient>,
    gauge: Arc<dyn ConsensusGauge>,
}

impl CommonBlockLocator {
    /// Wires a locator to its collaborators.
    pub fn new(
        store: Arc<dyn BlockStore>,
        mutator: Arc<dyn ChainMutator>,
        peers: Arc<dyn PeerClient>,
        gauge: Arc<dyn ConsensusGauge>,
    ) -> Self {
        Self {
            store,
            mutator,
            peers,
            gauge,
        }
    }

    /// The checkpoint id sequence anchored at `height`, most recent first.
    ///
    /// Order: the current tip, then the first block of each of the last
    /// [`CHECKPOINT_ROUNDS`] rounds counting down from the round containing
    /// `height`, then genesis. Duplicates keep their first (most recent)
    /// position. Near genesis the sequence simply shrinks.
    pub fn id_sequence(&self, height: u64) -> Vec<BlockId> {
        let mut ids = Vec::with_capacity(CHECKPOINT_ROUNDS as usize + 2);
        let mut push = |id: BlockId| {
            if !ids.contains(&id) {
                ids.push(id);
            }
        };

        push(self.store.tip().id);

        let top_round = round_of(height);
        let bottom_round = top_round.saturating_sub(CHECKPOINT_ROUNDS - 1).max(1);
        for round in (bottom_round..=top_round).rev() {
            if let Some(id) = self.store.id_at_height(round_start_height(round)) {
                push(id);
            }
        }

        if let Some(genesis_id) = self.store.id_at_height(1) {
            push(genesis_id);
        }

        ids
    }

    /// Asks `peer` for the most recent checkpoint it shares with us.
    ///
    /// The answer is validated before being returned: a descriptor at
    /// height zero, above our tip, naming a block we do not hold, or naming
    /// a block the probe never asked about is rejected rather than trusted.
    /// A flat "nothing in common" answer escalates per the consensus gauge.
    pub async fn negotiate(
        &self,
        peer: &PeerDescriptor,
        height: u64,
    ) -> Result<CommonBlockDescriptor, NegotiationError> {
        let ids = self.id_sequence(height);
        debug!(
            peer = %peer.address,
            checkpoints = ids.len(),
            anchor_height = height,
            "probing for common checkpoint",
        );

        let answer = self.peers.common_block_ids(peer, &ids).await?;

        let descriptor = match answer {
            Some(descriptor) => descriptor,
            None => return self.escalate_no_common(peer).await,
        };

        let tip_height = self.store.tip().height;
        if descriptor.height == 0 || descriptor.height > tip_height {
            return Err(NegotiationError::MalformedResponse {
                peer: peer.address.clone(),
                detail: format!(
                    "claimed height {} against local tip {}",
                    descriptor.height, tip_height,
                ),
            });
        }
        if !self.store.has_exact(&descriptor) {
            return Err(NegotiationError::UnknownAncestor {
                peer: peer.address.clone(),
                id: short_id(&descriptor.id),
            });
        }
        // The checkpoint must come from the probe itself; this is what
        // caps the rollback the synchronizer performs on its answer.
        if !ids.contains(&descriptor.id) {
            return Err(NegotiationError::MalformedResponse {
                peer: peer.address.clone(),
                detail: format!(
                    "answered {} at height {}, which was not among the probed checkpoints",
                    short_id(&descriptor.id),
                    descriptor.height,
                ),
            });
        }

        info!(
            peer = %peer.address,
            common = %short_id(&descriptor.id),
            height = descriptor.height,
            "common checkpoint agreed",
        );
        Ok(descriptor)
    }

    /// The peer denied even genesis. Recover only when our own consensus
    /// confidence is independently poor; otherwise blame the peer.
    async fn escalate_no_common(
        &self,
        peer: &PeerDescriptor,
    ) -> Result<CommonBlockDescriptor, NegotiationError> {
        if self.gauge.has_poor_consensus() {
            warn!(
                peer = %peer.address,
                "no common checkpoint and poor consensus; starting chain recovery",
            );
            self.mutator.recover_chain().await?;
            Err(NegotiationError::ChainRecoveryTriggered(peer.address.clone()))
        } else {
            warn!(
                peer = %peer.address,
                "peer shares no checkpoint but consensus is healthy; skipping peer",
            );
            Err(NegotiationError::NoncompliantPeer(peer.address.clone()))
        }
    }
}
