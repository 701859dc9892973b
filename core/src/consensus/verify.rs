//! # Block Verification
//!
//! Three layers, cheapest first:
//!
//! 1. **Receipt verification** — purely structural, no storage access.
//!    Collects *every* violated rule so a misbehaving peer can be diagnosed
//!    from a single log line.
//! 2. **Contextual verification** — checks against the current tip:
//!    fork-one detection and slot timing.
//! 3. **`process_block`** — the full acceptance pipeline. Admitted through
//!    the serialized execution slot, suspends on storage and collaborator
//!    I/O, and delegates the actual tip mutation to the chain mutator only
//!    after every check has passed. Surfaces the first failure only;
//!    partial block application is never observable.
//!
//! All arithmetic here is exact integer arithmetic. A verification result
//! must be bit-identical on every conforming node, so overflow is itself a
//! violation rather than a wrap or a saturation.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::block::{compute_payload_hash, short_id, Block};
use crate::chain::rewards::reward_for_height;
use crate::chain::slots;
use crate::config::{
    MAX_PAYLOAD_LENGTH_BYTES, MAX_TRANSACTIONS_PER_BLOCK, SUPPORTED_BLOCK_VERSION,
};
use crate::consensus::sequencer::Sequencer;
use crate::external::{
    BlockStore, ChainError, ChainMutator, DelegateSlotChecker, ForgingSlotRejected, ForkCause,
    ForkEvent, ForkEventSink, TransactionRejected, TransactionValidator,
};

// ---------------------------------------------------------------------------
// Results & Errors
// ---------------------------------------------------------------------------

/// Outcome of receipt-level verification: the full ordered list of violated
/// rules. Empty list means the block is structurally sound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifySummary {
    /// Violated-rule messages in rule order.
    pub errors: Vec<String>,
}

impl VerifySummary {
    /// True when no rule was violated.
    pub fn verified(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first violated rule, if any.
    pub fn first(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Outcome of contextual verification: structural violations first, then
/// tip-relative ones, kept apart so failures map onto the right error class.
#[derive(Clone, Debug, Default)]
pub struct BlockVerdict {
    /// Receipt-level violations.
    pub structural: Vec<String>,
    /// Tip-relative violations (fork-one, slot timing).
    pub contextual: Vec<String>,
}

impl BlockVerdict {
    /// True when both layers passed.
    pub fn verified(&self) -> bool {
        self.structural.is_empty() && self.contextual.is_empty()
    }

    /// Maps the first violation into the acceptance error taxonomy.
    fn into_first_error(self) -> Option<ProcessError> {
        if let Some(msg) = self.structural.into_iter().next() {
            return Some(ProcessError::Structural(msg));
        }
        self.contextual.into_iter().next().map(ProcessError::Contextual)
    }
}

/// Why `process_block` refused a block. Only the first failing check is
/// surfaced; the caller treats any variant as "this unit of work failed"
/// and leaves the tip at its last good state.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The node is shutting down; no new blocks are accepted.
    #[error("node is shutting down")]
    ShuttingDown,
    /// A receipt-level (structural) rule was violated.
    #[error("structural violation: {0}")]
    Structural(String),
    /// A tip-relative rule was violated (fork-one or slot timing).
    #[error("contextual violation: {0}")]
    Contextual(String),
    /// A block with this id is already stored.
    #[error("block {0} already processed")]
    AlreadyExists(String),
    /// The block was forged outside its generator's slot.
    #[error("slot assignment violation: {0}")]
    SlotAssignment(#[from] ForgingSlotRejected),
    /// A contained transaction failed semantic validation.
    #[error("transaction {id} rejected: {reason}")]
    Transaction {
        /// Hex id of the offending transaction.
        id: String,
        /// The validator's explanation.
        reason: TransactionRejected,
    },
    /// The chain mutator failed; the tip is unchanged.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

// ---------------------------------------------------------------------------
// BlockVerifier
// ---------------------------------------------------------------------------

/// Validates candidate blocks and orchestrates full acceptance.
pub struct BlockVerifier {
    store: Arc<dyn BlockStore>,
    mutator: Arc<dyn ChainMutator>,
    tx_validator: Arc<dyn TransactionValidator>,
    slot_checker: Arc<dyn DelegateSlotChecker>,
    fork_sink: Arc<dyn ForkEventSink>,
    sequencer: Arc<Sequencer>,
}

impl BlockVerifier {
    /// Wires a verifier to its collaborators.
    pub fn new(
        store: Arc<dyn BlockStore>,
        mutator: Arc<dyn ChainMutator>,
        tx_validator: Arc<dyn TransactionValidator>,
        slot_checker: Arc<dyn DelegateSlotChecker>,
        fork_sink: Arc<dyn ForkEventSink>,
        sequencer: Arc<Sequencer>,
    ) -> Self {
        Self {
            store,
            mutator,
            tx_validator,
            slot_checker,
            fork_sink,
            sequencer,
        }
    }

    /// Structural verification of one block. Synchronous, storage-free.
    ///
    /// Every rule is evaluated; the summary carries all violations in rule
    /// order so one pass over a bad block explains everything wrong with it.
    pub fn verify_receipt(&self, block: &Block) -> VerifySummary {
        let mut errors = Vec::new();

        if !block.verify_signature() {
            errors.push("block signature verification failed".to_string());
        }

        if block.height != 1 && block.previous_block_id.is_none() {
            errors.push("previous block id missing above genesis height".to_string());
        }

        if block.version != SUPPORTED_BLOCK_VERSION {
            errors.push(format!("unsupported block version {}", block.version));
        }

        let expected_reward = reward_for_height(block.height);
        if block.reward != expected_reward {
            errors.push(format!(
                "invalid reward: expected {}, claimed {}",
                expected_reward, block.reward,
            ));
        }

        let computed_id = block.compute_id();
        if block.id != computed_id {
            errors.push(format!(
                "block id mismatch: claimed {}, computed {}",
                hex::encode(block.id),
                hex::encode(computed_id),
            ));
        }

        if block.payload_length > MAX_PAYLOAD_LENGTH_BYTES {
            errors.push(format!(
                "payload length {} exceeds maximum {}",
                block.payload_length, MAX_PAYLOAD_LENGTH_BYTES,
            ));
        }
        if block.number_of_transactions > MAX_TRANSACTIONS_PER_BLOCK {
            errors.push(format!(
                "transaction count {} exceeds maximum {}",
                block.number_of_transactions, MAX_TRANSACTIONS_PER_BLOCK,
            ));
        }
        if block.number_of_transactions as usize != block.transactions.len() {
            errors.push(format!(
                "transaction count field {} disagrees with payload of {}",
                block.number_of_transactions,
                block.transactions.len(),
            ));
        }

        let payload_hash = compute_payload_hash(&block.transactions);
        if block.payload_hash != payload_hash {
            errors.push("payload hash mismatch".to_string());
        }

        // Totals with exact arithmetic: overflow is a violation, not a wrap.
        let mut amount_sum: Option<u64> = Some(0);
        let mut fee_sum: Option<u64> = Some(0);
        for tx in &block.transactions {
            amount_sum = amount_sum.and_then(|s| s.checked_add(tx.amount));
            fee_sum = fee_sum.and_then(|s| s.checked_add(tx.fee));
        }
        match amount_sum {
            Some(sum) if sum == block.total_amount => {}
            Some(sum) => errors.push(format!(
                "invalid total amount: claimed {}, computed {}",
                block.total_amount, sum,
            )),
            None => errors.push("transaction amounts overflow".to_string()),
        }
        match fee_sum {
            Some(sum) if sum == block.total_fee => {}
            Some(sum) => errors.push(format!(
                "invalid total fee: claimed {}, computed {}",
                block.total_fee, sum,
            )),
            None => errors.push("transaction fees overflow".to_string()),
        }

        let mut seen = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if !seen.insert(tx.id) {
                errors.push(format!("duplicate transaction id {}", hex::encode(tx.id)));
            }
        }

        VerifySummary { errors }
    }

    /// Contextual verification: receipt rules plus tip-relative checks.
    ///
    /// A parent mismatch is fork-one divergence; it records a
    /// [`ForkCause::Type1`] event before failing the block.
    pub fn verify_block(&self, block: &Block) -> BlockVerdict {
        let structural = self.verify_receipt(block).errors;
        let mut contextual = Vec::new();
        let tip = self.store.tip();

        if block.previous_block_id != Some(tip.id) {
            self.fork_sink.record(ForkEvent::of(block, ForkCause::Type1));
            contextual.push(format!(
                "expected previous block {}, received block built on {}",
                short_id(&tip.id),
                block
                    .previous_block_id
                    .as_ref()
                    .map(short_id)
                    .unwrap_or_else(|| "none".to_string()),
            ));
        }

        let block_slot = slots::slot_number(block.timestamp);
        let tip_slot = slots::slot_number(tip.timestamp);
        let current_slot = slots::current_slot();
        if block_slot > current_slot {
            contextual.push(format!(
                "block slot {} is in the future (current slot {})",
                block_slot, current_slot,
            ));
        }
        if block_slot <= tip_slot {
            contextual.push(format!(
                "block slot {} is not later than tip slot {}",
                block_slot, tip_slot,
            ));
        }

        BlockVerdict {
            structural,
            contextual,
        }
    }

    /// Full acceptance pipeline, admitted through the serialized slot.
    ///
    /// Once admitted the block runs to completion or failure; there is no
    /// mid-flight cancellation. On success the chain mutator has applied
    /// the block and the tip has advanced.
    pub async fn process_block(
        &self,
        block: &Block,
        broadcast: bool,
        persist: bool,
    ) -> Result<(), ProcessError> {
        let _slot = self.sequencer.admit().await;
        self.process_admitted(block, broadcast, persist).await
    }

    /// Acceptance pipeline body. The caller must already hold the
    /// execution slot; the synchronizer and fork resolver enter here.
    pub(crate) async fn process_admitted(
        &self,
        block: &Block,
        broadcast: bool,
        persist: bool,
    ) -> Result<(), ProcessError> {
        if self.sequencer.is_shutting_down() {
            return Err(ProcessError::ShuttingDown);
        }

        block.normalize().map_err(ProcessError::Structural)?;

        let verdict = self.verify_block(block);
        if let Some(error) = verdict.into_first_error() {
            warn!(
                height = block.height,
                id = %short_id(&block.id),
                %error,
                "block rejected",
            );
            return Err(error);
        }

        if self.store.has_block(&block.id) {
            return Err(ProcessError::AlreadyExists(short_id(&block.id)));
        }

        if let Err(rejection) = self.slot_checker.assert_valid_forging_slot(block).await {
            self.fork_sink
                .record(ForkEvent::of(block, ForkCause::WrongForgeSlot));
            return Err(rejection.into());
        }

        for tx in &block.transactions {
            self.tx_validator
                .verify(tx, block.height)
                .await
                .map_err(|reason| ProcessError::Transaction {
                    id: hex::encode(tx.id),
                    reason,
                })?;
        }

        self.mutator.apply_block(block, broadcast, persist).await?;

        info!(
            height = block.height,
            id = %short_id(&block.id),
            transactions = block.number_of_transactions,
            broadcast,
            "block accepted",
        );
        debug!(
            total_amount = block.total_amount,
            total_fee = block.total_fee,
            reward = block.reward,
            "block totals",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::MemoryChain;
    use crate::testutil::{
        delegate_key, forge_chain, forge_on, signed_tx, AcceptAllTxs, AnySlot, NoSlot,
        RecordingSink, RejectTxById,
    };

    fn verifier_on(
        chain: Arc<MemoryChain>,
        sink: Arc<RecordingSink>,
    ) -> BlockVerifier {
        BlockVerifier::new(
            Arc::clone(&chain) as Arc<dyn BlockStore>,
            chain as Arc<dyn ChainMutator>,
            Arc::new(AcceptAllTxs),
            Arc::new(AnySlot),
            sink,
            Arc::new(Sequencer::new()),
        )
    }

    fn default_verifier(chain: Arc<MemoryChain>) -> BlockVerifier {
        verifier_on(chain, Arc::new(RecordingSink::new()))
    }

    // -- Receipt rules -------------------------------------------------------

    #[test]
    fn clean_block_passes_receipt() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let block = forge_on(&chain.tip(), 1, 10);

        let summary = verifier.verify_receipt(&block);
        assert!(summary.verified(), "unexpected errors: {:?}", summary.errors);
    }

    #[test]
    fn receipt_flags_bad_signature() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let mut block = forge_on(&chain.tip(), 1, 10);
        block.signature[0] ^= 0xFF;
        block.id = block.compute_id();

        let summary = verifier.verify_receipt(&block);
        assert_eq!(summary.first(), Some("block signature verification failed"));
    }

    #[test]
    fn receipt_flags_missing_previous_id() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let key = delegate_key(1);
        let mut block = Block::forge(&chain.tip(), vec![], &key, 10);
        block.previous_block_id = None;
        // Re-sign so only the missing parent is wrong.
        use ed25519_dalek::Signer;
        block.signature = key.sign(&block.unsigned_bytes()).to_bytes().to_vec();
        block.id = block.compute_id();

        let summary = verifier.verify_receipt(&block);
        assert!(summary
            .errors
            .iter()
            .any(|e| e.contains("previous block id missing")));
    }

    #[test]
    fn receipt_flags_wrong_reward() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let key = delegate_key(1);
        let mut block = Block::forge(&chain.tip(), vec![], &key, 10);
        block.reward = 1_000;
        use ed25519_dalek::Signer;
        block.signature = key.sign(&block.unsigned_bytes()).to_bytes().to_vec();
        block.id = block.compute_id();

        let summary = verifier.verify_receipt(&block);
        assert!(summary.errors.iter().any(|e| e.contains("invalid reward")));
    }

    #[test]
    fn receipt_flags_id_mismatch() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let mut block = forge_on(&chain.tip(), 1, 10);
        block.id = [0xAA; 32];

        let summary = verifier.verify_receipt(&block);
        assert!(summary.errors.iter().any(|e| e.contains("block id mismatch")));
    }

    #[test]
    fn receipt_flags_payload_hash_mismatch() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let key = delegate_key(1);
        let mut block = Block::forge(&chain.tip(), vec![signed_tx(1, 100, 5)], &key, 10);
        block.payload_hash = [0x11; 32];
        use ed25519_dalek::Signer;
        block.signature = key.sign(&block.unsigned_bytes()).to_bytes().to_vec();
        block.id = block.compute_id();

        let summary = verifier.verify_receipt(&block);
        assert!(summary.errors.iter().any(|e| e.contains("payload hash mismatch")));
    }

    #[test]
    fn receipt_flags_wrong_totals() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let key = delegate_key(1);
        let mut block = Block::forge(&chain.tip(), vec![signed_tx(1, 100, 5)], &key, 10);
        block.total_amount = 1;
        block.total_fee = 2;
        use ed25519_dalek::Signer;
        block.signature = key.sign(&block.unsigned_bytes()).to_bytes().to_vec();
        block.id = block.compute_id();

        let summary = verifier.verify_receipt(&block);
        assert!(summary.errors.iter().any(|e| e.contains("invalid total amount")));
        assert!(summary.errors.iter().any(|e| e.contains("invalid total fee")));
    }

    #[test]
    fn receipt_flags_duplicate_transactions() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let tx = signed_tx(1, 100, 5);
        let block = Block::forge(
            &chain.tip(),
            vec![tx.clone(), tx],
            &delegate_key(1),
            10,
        );

        let summary = verifier.verify_receipt(&block);
        assert!(summary
            .errors
            .iter()
            .any(|e| e.contains("duplicate transaction id")));
    }

    #[test]
    fn receipt_collects_every_violation_in_order() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let mut block = forge_on(&chain.tip(), 1, 10);
        block.signature[0] ^= 0xFF; // breaks signature AND the claimed id
        block.reward = 7;

        let summary = verifier.verify_receipt(&block);
        assert!(summary.errors.len() >= 3);
        assert_eq!(summary.first(), Some("block signature verification failed"));
    }

    // -- Contextual rules ----------------------------------------------------

    #[test]
    fn verify_block_accepts_clean_extension() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let block = forge_on(&chain.tip(), 1, 10);

        assert!(verifier.verify_block(&block).verified());
    }

    #[test]
    fn verify_block_detects_fork_one_and_records_event() {
        let chain = Arc::new(MemoryChain::seeded(forge_chain(3)));
        let sink = Arc::new(RecordingSink::new());
        let verifier = verifier_on(Arc::clone(&chain), Arc::clone(&sink));

        // A block at the right height but built on a stranger parent.
        let mut strangers = forge_chain(3);
        strangers[2] = forge_on(&strangers[1], 9, 25);
        let foreign = forge_on(&strangers[2], 7, 35);

        let verdict = verifier.verify_block(&foreign);
        assert!(!verdict.verified());
        assert!(verdict.contextual[0].contains("expected previous block"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cause, ForkCause::Type1);
        assert_eq!(events[0].block_id, foreign.id);
    }

    #[test]
    fn verify_block_rejects_future_slot() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let future = slots::now_epoch_seconds() + 3_600;
        let block = forge_on(&chain.tip(), 1, future);

        let verdict = verifier.verify_block(&block);
        assert!(verdict.contextual.iter().any(|e| e.contains("in the future")));
    }

    #[test]
    fn verify_block_rejects_slot_not_after_tip() {
        let chain = Arc::new(MemoryChain::seeded(forge_chain(2)));
        let verifier = default_verifier(Arc::clone(&chain));
        // Same slot as the tip (tip at timestamp 10, slot 1).
        let block = forge_on(&chain.tip(), 1, 12);

        let verdict = verifier.verify_block(&block);
        assert!(verdict
            .contextual
            .iter()
            .any(|e| e.contains("not later than tip slot")));
    }

    // -- process_block -------------------------------------------------------

    #[tokio::test]
    async fn process_block_applies_clean_block() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let block = forge_on(&chain.tip(), 1, 10);

        verifier.process_block(&block, true, true).await.unwrap();
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.tip().id, block.id);
    }

    #[tokio::test]
    async fn process_block_rejects_duplicate_id() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let verifier = default_verifier(Arc::clone(&chain));
        let block = forge_on(&chain.tip(), 1, 10);

        verifier.process_block(&block, false, true).await.unwrap();
        let err = verifier.process_block(&block, false, true).await.unwrap_err();
        // The replay fails contextually (the tip moved) before the
        // existence check can even fire; either way it is refused whole.
        assert!(matches!(
            err,
            ProcessError::Contextual(_) | ProcessError::AlreadyExists(_)
        ));
        assert_eq!(chain.height(), 2);
    }

    #[tokio::test]
    async fn process_block_rejects_wrong_forging_slot() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let sink = Arc::new(RecordingSink::new());
        let verifier = BlockVerifier::new(
            Arc::clone(&chain) as Arc<dyn BlockStore>,
            Arc::clone(&chain) as Arc<dyn ChainMutator>,
            Arc::new(AcceptAllTxs),
            Arc::new(NoSlot),
            Arc::clone(&sink) as Arc<dyn ForkEventSink>,
            Arc::new(Sequencer::new()),
        );
        let block = forge_on(&chain.tip(), 1, 10);

        let err = verifier.process_block(&block, false, true).await.unwrap_err();
        assert!(matches!(err, ProcessError::SlotAssignment(_)));
        assert_eq!(chain.height(), 1);
        assert_eq!(sink.events()[0].cause, ForkCause::WrongForgeSlot);
    }

    #[tokio::test]
    async fn one_bad_transaction_rejects_the_whole_block() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let good = signed_tx(1, 100, 5);
        let bad = signed_tx(2, 200, 5);
        let verifier = BlockVerifier::new(
            Arc::clone(&chain) as Arc<dyn BlockStore>,
            Arc::clone(&chain) as Arc<dyn ChainMutator>,
            Arc::new(RejectTxById(bad.id)),
            Arc::new(AnySlot),
            Arc::new(RecordingSink::new()),
            Arc::new(Sequencer::new()),
        );
        let block = Block::forge(&chain.tip(), vec![good, bad], &delegate_key(1), 10);

        let err = verifier.process_block(&block, false, true).await.unwrap_err();
        assert!(matches!(err, ProcessError::Transaction { .. }));
        assert_eq!(chain.height(), 1, "no partial application");
    }

    #[tokio::test]
    async fn process_block_refuses_work_during_shutdown() {
        let chain = Arc::new(MemoryChain::with_genesis());
        let sequencer = Arc::new(Sequencer::new());
        let verifier = BlockVerifier::new(
            Arc::clone(&chain) as Arc<dyn BlockStore>,
            Arc::clone(&chain) as Arc<dyn ChainMutator>,
            Arc::new(AcceptAllTxs),
            Arc::new(AnySlot),
            Arc::new(RecordingSink::new()),
            Arc::clone(&sequencer),
        );
        sequencer.begin_shutdown();
        let block = forge_on(&chain.tip(), 1, 10);

        let err = verifier.process_block(&block, false, true).await.unwrap_err();
        assert!(matches!(err, ProcessError::ShuttingDown));
    }
}
