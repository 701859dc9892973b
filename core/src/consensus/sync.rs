//! # Chain Synchronization
//!
//! Catches a lagging node up to a taller peer in one serialized pass:
//!
//! ```text
//!   negotiate common checkpoint
//!            |
//!            v
//!   rollback local tip until tip == common
//!            |
//!            v
//!   page forward: request blocks after tip, run each through
//!   the full acceptance pipeline, repeat until caught up
//! ```
//!
//! The whole pass holds the execution slot, so forged blocks, gossiped
//! blocks, and a second sync attempt all queue behind it. A fresh node at
//! genesis skips negotiation entirely; with one shared block there is
//! nothing to negotiate about.
//!
//! Rollback is bounded by the negotiation: the locator only returns a
//! checkpoint drawn from the probe it sent, which reaches at most
//! [`CHECKPOINT_ROUNDS`](crate::config::CHECKPOINT_ROUNDS) rounds plus the
//! tip's partial round down (genesis excepted, and a tip that close to
//! genesis has little to lose). A peer naming a deeper locally-stored
//! block is rejected during negotiation, before any block is unwound.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::chain::block::short_id;
use crate::config::SYNC_PAGE_SIZE;
use crate::consensus::locator::{CommonBlockLocator, NegotiationError};
use crate::consensus::sequencer::Sequencer;
use crate::consensus::verify::{BlockVerifier, ProcessError};
use crate::external::{BlockStore, ChainError, ChainMutator, PeerClient, PeerDescriptor, PeerError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a sync attempt aborted. The tip is left wherever the last completed
/// step put it; a later attempt resumes from there.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Common-ancestor negotiation failed or escalated.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    /// A peer-served block failed the acceptance pipeline.
    #[error("peer block rejected: {0}")]
    Process(#[from] ProcessError),
    /// Transport failure while paging blocks.
    #[error(transparent)]
    Peer(#[from] PeerError),
    /// The chain mutator failed during rollback.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Rollback reached the checkpoint height without matching its id.
    /// Storage and negotiation disagree; unwinding further would destroy
    /// agreed history.
    #[error("rollback reached height {tip_height} without meeting checkpoint {checkpoint} at height {checkpoint_height}")]
    RollbackOverrun {
        /// Height the rollback stopped at.
        tip_height: u64,
        /// Short id of the negotiated checkpoint.
        checkpoint: String,
        /// Height the checkpoint was claimed at.
        checkpoint_height: u64,
    },
}

// ---------------------------------------------------------------------------
// Sync-in-progress marker
// ---------------------------------------------------------------------------

/// RAII flag for the advisory sync indicator; cleared on any exit path.
struct SyncMarker<'a> {
    sequencer: &'a Sequencer,
}

impl<'a> SyncMarker<'a> {
    fn raise(sequencer: &'a Sequencer) -> Self {
        sequencer.set_sync_in_progress(true);
        Self { sequencer }
    }
}

impl Drop for SyncMarker<'_> {
    fn drop(&mut self) {
        self.sequencer.set_sync_in_progress(false);
    }
}

// ---------------------------------------------------------------------------
// ChainSynchronizer
// ---------------------------------------------------------------------------

/// Drives catch-up against one peer at a time.
pub struct ChainSynchronizer {
    store: Arc<dyn BlockStore>,
    mutator: Arc<dyn ChainMutator>,
    peers: Arc<dyn PeerClient>,
    verifier: Arc<BlockVerifier>,
    locator: Arc<CommonBlockLocator>,
    sequencer: Arc<Sequencer>,
}

impl ChainSynchronizer {
    /// Wires a synchronizer to its collaborators.
    pub fn new(
        store: Arc<dyn BlockStore>,
        mutator: Arc<dyn ChainMutator>,
        peers: Arc<dyn PeerClient>,
        verifier: Arc<BlockVerifier>,
        locator: Arc<CommonBlockLocator>,
        sequencer: Arc<Sequencer>,
    ) -> Self {
        Self {
            store,
            mutator,
            peers,
            verifier,
            locator,
            sequencer,
        }
    }

    /// Synchronizes against `peer`.
    ///
    /// Returns `Ok(true)` when the local tip reached the peer's advertised
    /// height and `Ok(false)` when the peer stopped serving blocks short of
    /// it. Holds the execution slot end to end; the sync-in-progress flag
    /// is raised for the duration so the fork resolver defers gossip.
    pub async fn sync_with_peer(&self, peer: &PeerDescriptor) -> Result<bool, SyncError> {
        let _slot = self.sequencer.admit().await;
        if self.sequencer.is_shutting_down() {
            return Err(SyncError::Process(ProcessError::ShuttingDown));
        }
        let _marker = SyncMarker::raise(&self.sequencer);

        let mut tip = self.store.tip();
        info!(
            peer = %peer.address,
            peer_height = peer.height,
            local_height = tip.height,
            "sync started",
        );

        // Step 1 & 2: negotiate and rewind. A tip at genesis shares its
        // only block with every honest peer, so negotiation is skipped.
        if tip.height > 1 {
            let common = self.locator.negotiate(peer, tip.height).await?;
            let mut unwound = 0u64;
            while tip.id != common.id {
                if tip.height <= common.height {
                    return Err(SyncError::RollbackOverrun {
                        tip_height: tip.height,
                        checkpoint: short_id(&common.id),
                        checkpoint_height: common.height,
                    });
                }
                tip = self.mutator.delete_last_block().await?;
                unwound += 1;
            }
            if unwound > 0 {
                info!(
                    peer = %peer.address,
                    unwound,
                    resume_height = tip.height,
                    "rolled back to common checkpoint",
                );
            }
        }

        // Step 3: page forward through the acceptance pipeline. Applied
        // blocks are persisted but not re-broadcast; the network already
        // has them.
        loop {
            let tip = self.store.tip();
            if tip.height >= peer.height {
                break;
            }
            let page = self
                .peers
                .blocks_since(peer, tip.id, SYNC_PAGE_SIZE)
                .await?;
            if page.is_empty() {
                debug!(
                    peer = %peer.address,
                    height = tip.height,
                    "peer served no further blocks",
                );
                break;
            }
            for block in &page {
                self.verifier.process_admitted(block, false, true).await?;
            }
        }

        // Step 4: caught up iff we reached the peer's advertised height.
        let final_height = self.store.tip().height;
        let caught_up = final_height >= peer.height;
        info!(
            peer = %peer.address,
            height = final_height,
            caught_up,
            "sync finished",
        );
        Ok(caught_up)
    }
}
