// Block verification benchmarks for the Helios consensus core.
//
// Covers receipt verification of empty and full blocks, the underlying
// signature check, and id recomputation.

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ed25519_dalek::{Signer, SigningKey};

use helios_core::chain::block::{Block, Transaction};
use helios_core::chain::MemoryChain;
use helios_core::consensus::{BlockVerifier, Sequencer};
use helios_core::external::{
    BlockStore, DelegateSlotChecker, ForgingSlotRejected, ForkEvent, ForkEventSink,
    TransactionRejected, TransactionValidator,
};

// ---------------------------------------------------------------------------
// Inert collaborators — verification alone is what gets measured
// ---------------------------------------------------------------------------

struct PassValidator;

#[async_trait]
impl TransactionValidator for PassValidator {
    async fn verify(&self, _tx: &Transaction, _height: u64) -> Result<(), TransactionRejected> {
        Ok(())
    }
}

struct PassSlot;

#[async_trait]
impl DelegateSlotChecker for PassSlot {
    async fn assert_valid_forging_slot(&self, _block: &Block) -> Result<(), ForgingSlotRejected> {
        Ok(())
    }
}

struct DropSink;

impl ForkEventSink for DropSink {
    fn record(&self, _event: ForkEvent) {}
}

fn verifier_over_genesis() -> (BlockVerifier, Block) {
    let chain = Arc::new(MemoryChain::with_genesis());
    let genesis = chain.tip();
    let verifier = BlockVerifier::new(
        Arc::clone(&chain) as Arc<dyn BlockStore>,
        chain,
        Arc::new(PassValidator),
        Arc::new(PassSlot),
        Arc::new(DropSink),
        Arc::new(Sequencer::new()),
    );
    (verifier, genesis)
}

fn delegate_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn signed_tx(seed: u8) -> Transaction {
    let key = delegate_key(seed.wrapping_add(100));
    let mut tx = Transaction {
        id: [0u8; 32],
        timestamp: 10,
        sender_public_key: key.verifying_key().to_bytes(),
        recipient: format!("hls:{}", hex::encode([seed; 4])),
        amount: 1_000,
        fee: 10,
        signature: Vec::new(),
    };
    tx.signature = key.sign(&tx.canonical_bytes()).to_bytes().to_vec();
    tx.id = tx.compute_id();
    tx
}

fn forged_block(tx_count: usize) -> (BlockVerifier, Block) {
    let (verifier, genesis) = verifier_over_genesis();
    let txs = (0..tx_count).map(|i| signed_tx(i as u8)).collect();
    let block = Block::forge(&genesis, txs, &delegate_key(1), 10);
    (verifier, block)
}

fn bench_receipt_empty(c: &mut Criterion) {
    let (verifier, block) = forged_block(0);

    c.bench_function("verify/receipt_empty", |b| {
        b.iter(|| verifier.verify_receipt(&block));
    });
}

fn bench_receipt_by_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify/receipt_payload");

    for tx_count in [1usize, 5, 25] {
        group.throughput(Throughput::Elements(tx_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(tx_count),
            &tx_count,
            |b, &n| {
                let (verifier, block) = forged_block(n);
                b.iter(|| verifier.verify_receipt(&block));
            },
        );
    }

    group.finish();
}

fn bench_signature_check(c: &mut Criterion) {
    let (_, block) = forged_block(0);

    c.bench_function("verify/block_signature", |b| {
        b.iter(|| block.verify_signature());
    });
}

fn bench_id_recompute(c: &mut Criterion) {
    let (_, block) = forged_block(25);

    c.bench_function("verify/id_recompute", |b| {
        b.iter(|| block.compute_id());
    });
}

criterion_group!(
    benches,
    bench_receipt_empty,
    bench_receipt_by_payload,
    bench_signature_check,
    bench_id_recompute,
);
criterion_main!(benches);
