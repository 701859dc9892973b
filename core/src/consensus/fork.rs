//! # Fork Resolution
//!
//! Every block that arrives over gossip lands here first. Relative to the
//! current tip it is one of five things:
//!
//! ```text
//!   Duplicate  — same id as the tip; drop silently
//!   Extension  — child of the tip; run the acceptance pipeline
//!   ForkOne    — next height, different parent; branches diverged earlier
//!   ForkFive   — same height, same parent; a rival tip (equivocation)
//!   Unrelated  — anything else; discarded, left to the synchronizer
//! ```
//!
//! Both fork kinds resolve by the same deterministic tie-break: the block
//! with the older timestamp wins, and on equal timestamps the smaller id
//! wins. Every node orders any two rivals identically, so the network
//! converges without further rounds of communication.
//!
//! ## Design Decisions
//!
//! - A losing rival costs nothing: the tip is retained and only a fork
//!   event is recorded. A *winning* rival must still present a clean
//!   receipt before a single block is unwound; rollback is the expensive
//!   step and a forged winner must not be able to buy it with a bad block.
//! - Resolution re-classifies after each rollback instead of recursing:
//!   a fork-five winner becomes a plain extension one block down, and a
//!   fork-one winner usually becomes unrelated two blocks down and is left
//!   for the next sync pass to settle.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::block::{short_id, Block};
use crate::consensus::sequencer::Sequencer;
use crate::consensus::verify::{BlockVerifier, ProcessError};
use crate::external::{
    BlockStore, ChainError, ChainMutator, ForkCause, ForkEvent, ForkEventSink,
};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How an incoming block relates to the current tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkKind {
    /// Same id as the tip.
    Duplicate,
    /// Direct child of the tip.
    Extension,
    /// Next height but a different parent.
    ForkOne,
    /// Same height and same parent as the tip, different id.
    ForkFive,
    /// No direct relation to the tip.
    Unrelated,
}

impl ForkKind {
    /// Classifies `incoming` against `tip`. Pure; uses only the two headers.
    pub fn classify(incoming: &Block, tip: &Block) -> Self {
        if incoming.id == tip.id {
            ForkKind::Duplicate
        } else if incoming.height == tip.height + 1 {
            if incoming.previous_block_id == Some(tip.id) {
                ForkKind::Extension
            } else {
                ForkKind::ForkOne
            }
        } else if incoming.height == tip.height
            && incoming.previous_block_id == tip.previous_block_id
        {
            ForkKind::ForkFive
        } else {
            ForkKind::Unrelated
        }
    }
}

/// True when `incoming` beats `tip` under the deterministic tie-break.
fn incoming_wins(tip: &Block, incoming: &Block) -> bool {
    incoming.timestamp < tip.timestamp
        || (incoming.timestamp == tip.timestamp && incoming.id < tip.id)
}

// ---------------------------------------------------------------------------
// Outcomes & Errors
// ---------------------------------------------------------------------------

/// What happened to a gossiped block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The block extended the chain and is now the tip.
    Applied,
    /// The block was already the tip; nothing to do.
    Duplicate,
    /// A rival lost the tie-break; the tip stands.
    TipRetained,
    /// The block has no usable relation to the tip (possibly after
    /// rollback); the synchronizer will settle the divergence.
    Discarded,
    /// A sync pass holds the chain; the block was dropped and the peer
    /// will re-gossip or the sync will fetch it.
    Deferred,
}

/// Why fork resolution failed. The tip may have been legitimately rolled
/// back before the failure; the chain is still internally consistent.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A winning rival presented a bad receipt; nothing was rolled back.
    #[error("winning rival {id} has invalid receipt: {violation}")]
    RivalRejected {
        /// Short id of the rival block.
        id: String,
        /// First violated receipt rule.
        violation: String,
    },
    /// The extension acceptance pipeline refused the block.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// Rollback failed mid-resolution.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

// ---------------------------------------------------------------------------
// ForkResolver
// ---------------------------------------------------------------------------

/// Entry point for gossiped blocks; owns fork classification and rollback.
pub struct ForkResolver {
    store: Arc<dyn BlockStore>,
    mutator: Arc<dyn ChainMutator>,
    verifier: Arc<BlockVerifier>,
    fork_sink: Arc<dyn ForkEventSink>,
    sequencer: Arc<Sequencer>,
}

impl ForkResolver {
    /// Wires a resolver to its collaborators.
    pub fn new(
        store: Arc<dyn BlockStore>,
        mutator: Arc<dyn ChainMutator>,
        verifier: Arc<BlockVerifier>,
        fork_sink: Arc<dyn ForkEventSink>,
        sequencer: Arc<Sequencer>,
    ) -> Self {
        Self {
            store,
            mutator,
            verifier,
            fork_sink,
            sequencer,
        }
    }

    /// Handles one gossiped block.
    ///
    /// Checks the sync indicator *before* queueing for the execution slot:
    /// a sync pass may hold the slot for many seconds and gossip is cheap
    /// to drop. Once admitted, the block is classified against the live
    /// tip and re-classified after every rollback until it either applies,
    /// loses, or falls out of relation.
    pub async fn on_receive_block(&self, block: &Block) -> Result<ReceiveOutcome, ResolveError> {
        if self.sequencer.is_sync_in_progress() {
            debug!(
                height = block.height,
                id = %short_id(&block.id),
                "sync in progress; deferring gossiped block",
            );
            return Ok(ReceiveOutcome::Deferred);
        }

        let _slot = self.sequencer.admit().await;

        loop {
            let tip = self.store.tip();
            match ForkKind::classify(block, &tip) {
                ForkKind::Duplicate => return Ok(ReceiveOutcome::Duplicate),

                ForkKind::Extension => {
                    self.verifier.process_admitted(block, true, true).await?;
                    return Ok(ReceiveOutcome::Applied);
                }

                ForkKind::ForkOne => {
                    self.fork_sink.record(ForkEvent::of(block, ForkCause::Type1));
                    info!(
                        height = block.height,
                        id = %short_id(&block.id),
                        tip = %short_id(&tip.id),
                        "fork-one: rival branch at next height",
                    );
                    if !incoming_wins(&tip, block) {
                        return Ok(ReceiveOutcome::TipRetained);
                    }
                    self.check_rival_receipt(block)?;
                    // The divergence is below the tip: unwind two blocks
                    // and let re-classification decide what remains.
                    let below = self.mutator.delete_last_block().await?;
                    if below.height > 1 {
                        self.mutator.delete_last_block().await?;
                    }
                }

                ForkKind::ForkFive => {
                    self.fork_sink.record(ForkEvent::of(block, ForkCause::Type5));
                    if block.generator_public_key == tip.generator_public_key {
                        warn!(
                            height = block.height,
                            generator = %hex::encode(block.generator_public_key),
                            "fork-five: delegate signed two rival blocks",
                        );
                    }
                    if !incoming_wins(&tip, block) {
                        return Ok(ReceiveOutcome::TipRetained);
                    }
                    self.check_rival_receipt(block)?;
                    // Drop the losing tip; the rival is now a plain
                    // extension of the shared parent.
                    self.mutator.delete_last_block().await?;
                }

                ForkKind::Unrelated => {
                    debug!(
                        height = block.height,
                        id = %short_id(&block.id),
                        tip_height = tip.height,
                        "block unrelated to tip; leaving to synchronizer",
                    );
                    return Ok(ReceiveOutcome::Discarded);
                }
            }
        }
    }

    /// A rival must be structurally sound before any rollback happens.
    fn check_rival_receipt(&self, block: &Block) -> Result<(), ResolveError> {
        let summary = self.verifier.verify_receipt(block);
        match summary.first() {
            None => Ok(()),
            Some(violation) => Err(ResolveError::RivalRejected {
                id: short_id(&block.id),
                violation: violation.to_string(),
            }),
        }
    }
}
