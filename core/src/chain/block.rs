//! # Block Structure
//!
//! A block is the atomic unit of consensus in Helios. Each block carries an
//! ordered transaction list, a link to its parent (forming the chain), the
//! forging delegate's signature, and a digest-derived identifier.
//!
//! ## Identifier Computation
//!
//! The block `id` is the BLAKE3 digest of the unsigned canonical bytes
//! concatenated with the signature, which makes it a pure function of every
//! other field. The signature itself covers only the unsigned bytes (it
//! signs the content, the id then seals the signature).
//!
//! ## Canonical Encoding
//!
//! Fields are concatenated in a fixed order with little-endian integers.
//! This encoding exists purely for hashing and signing — wire formats and
//! storage schemas belong to the transport and persistence collaborators.
//! Because verification must be bit-identical across independent nodes,
//! nothing in this module may touch floating point or locale-sensitive
//! formatting.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::chain::rewards::reward_for_height;
use crate::config::SUPPORTED_BLOCK_VERSION;

/// Message folded into the genesis payload hash — the chain's birth
/// certificate, tamper-evident for as long as the chain exists.
pub const GENESIS_PAYLOAD_MESSAGE: &[u8] = b"HELIOS/2026: one chain, fifty-one keepers";

/// A 32-byte BLAKE3 digest identifying a block.
pub type BlockId = [u8; 32];

/// Renders the first 8 bytes of an id as hex, for logs where the full
/// 64-char digest is just noise.
pub fn short_id(id: &BlockId) -> String {
    hex::encode(&id[..8])
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// The in-memory transaction shape the consensus core reads.
///
/// Semantic validation (balances, per-type business rules) is the
/// transaction validator collaborator's job; the core only needs the fields
/// that feed block totals, the payload hash, and duplicate detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// BLAKE3 digest of the canonical bytes below.
    pub id: [u8; 32],
    /// Seconds since the chain epoch.
    pub timestamp: u64,
    /// Ed25519 public key of the sender.
    pub sender_public_key: [u8; 32],
    /// Recipient address string (format owned by the address scheme).
    pub recipient: String,
    /// Transferred amount in sparks.
    pub amount: u64,
    /// Fee in sparks.
    pub fee: u64,
    /// Sender's Ed25519 signature.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Canonical byte encoding: every field except the id, in fixed order.
    /// This feeds both the transaction id and the block payload hash.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.recipient.len());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.sender_public_key);
        out.extend_from_slice(&(self.recipient.len() as u32).to_le_bytes());
        out.extend_from_slice(self.recipient.as_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    /// Recomputes the id from the canonical bytes.
    pub fn compute_id(&self) -> [u8; 32] {
        *blake3::hash(&self.canonical_bytes()).as_bytes()
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A full Helios block.
///
/// Invariants the verifier enforces: `id` is a pure function of every other
/// field, `height == parent.height + 1` except for genesis (height 1), and
/// the totals equal the per-transaction sums.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// BLAKE3 of `unsigned_bytes() || signature`.
    pub id: BlockId,
    /// Block format version. Only [`SUPPORTED_BLOCK_VERSION`] is accepted.
    pub version: u32,
    /// Chain position. Genesis is height 1.
    pub height: u64,
    /// Parent block id. `None` only for genesis.
    pub previous_block_id: Option<BlockId>,
    /// Seconds since the chain epoch at which this block was forged.
    pub timestamp: u64,
    /// Ordered BLAKE3 over each transaction's canonical bytes.
    pub payload_hash: [u8; 32],
    /// Sum of the canonical byte lengths of all transactions.
    pub payload_length: u32,
    /// Sum of transaction amounts, in sparks.
    pub total_amount: u64,
    /// Sum of transaction fees, in sparks.
    pub total_fee: u64,
    /// Forging reward, in sparks. Must match the reward schedule.
    pub reward: u64,
    /// Claimed transaction count; must equal `transactions.len()`.
    pub number_of_transactions: u32,
    /// Ordered transaction list.
    pub transactions: Vec<Transaction>,
    /// Ed25519 public key of the forging delegate.
    pub generator_public_key: [u8; 32],
    /// Delegate's Ed25519 signature over the unsigned canonical bytes.
    pub signature: Vec<u8>,
}

impl Block {
    /// Constructs the genesis block, identical on every node.
    ///
    /// Genesis is unsigned and carries a well-known zero generator key; it
    /// is applied through `ChainMutator::apply_genesis_block` and never
    /// passes through receipt verification.
    pub fn genesis() -> Self {
        let mut block = Block {
            id: [0u8; 32],
            version: SUPPORTED_BLOCK_VERSION,
            height: 1,
            previous_block_id: None,
            timestamp: 0,
            payload_hash: *blake3::hash(GENESIS_PAYLOAD_MESSAGE).as_bytes(),
            payload_length: 0,
            total_amount: 0,
            total_fee: 0,
            reward: 0,
            number_of_transactions: 0,
            transactions: Vec::new(),
            generator_public_key: [0u8; 32],
            signature: Vec::new(),
        };
        block.id = block.compute_id();
        block
    }

    /// Forges a signed block on top of `parent`.
    ///
    /// Fills every derived field (payload hash and length, totals, reward,
    /// counts), signs the unsigned bytes with the delegate key, then seals
    /// the id. Totals use saturating sums here because forging is the
    /// trusted construction path — the verifier is the one that rejects
    /// overflow on foreign blocks.
    pub fn forge(
        parent: &Block,
        transactions: Vec<Transaction>,
        keypair: &SigningKey,
        timestamp: u64,
    ) -> Self {
        let height = parent.height + 1;
        let payload_hash = compute_payload_hash(&transactions);
        let payload_length = payload_length_of(&transactions);
        let total_amount = transactions.iter().map(|tx| tx.amount).fold(0u64, u64::saturating_add);
        let total_fee = transactions.iter().map(|tx| tx.fee).fold(0u64, u64::saturating_add);

        let mut block = Block {
            id: [0u8; 32],
            version: SUPPORTED_BLOCK_VERSION,
            height,
            previous_block_id: Some(parent.id),
            timestamp,
            payload_hash,
            payload_length,
            total_amount,
            total_fee,
            reward: reward_for_height(height),
            number_of_transactions: transactions.len() as u32,
            transactions,
            generator_public_key: keypair.verifying_key().to_bytes(),
            signature: Vec::new(),
        };

        let signature = keypair.sign(&block.unsigned_bytes());
        block.signature = signature.to_bytes().to_vec();
        block.id = block.compute_id();
        block
    }

    /// Canonical byte encoding of every field the signature covers.
    ///
    /// Transactions participate through `payload_hash`, so the encoding is
    /// fixed-size plus the signature-free header fields.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        match &self.previous_block_id {
            Some(prev) => {
                out.push(1);
                out.extend_from_slice(prev);
            }
            None => {
                out.push(0);
                out.extend_from_slice(&[0u8; 32]);
            }
        }
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.payload_hash);
        out.extend_from_slice(&self.payload_length.to_le_bytes());
        out.extend_from_slice(&self.total_amount.to_le_bytes());
        out.extend_from_slice(&self.total_fee.to_le_bytes());
        out.extend_from_slice(&self.reward.to_le_bytes());
        out.extend_from_slice(&self.number_of_transactions.to_le_bytes());
        out.extend_from_slice(&self.generator_public_key);
        out
    }

    /// Recomputes the id from the other fields. A stored id that disagrees
    /// with this value fails receipt verification.
    pub fn compute_id(&self) -> BlockId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.unsigned_bytes());
        hasher.update(&self.signature);
        *hasher.finalize().as_bytes()
    }

    /// Verifies the delegate signature over the unsigned bytes.
    pub fn verify_signature(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.generator_public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify(&self.unsigned_bytes(), &signature).is_ok()
    }

    /// Canonical-representation check run before verification.
    ///
    /// Rejects unsupported versions and blocks whose claimed counts disagree
    /// with their own content. Returns the first inconsistency found.
    pub fn normalize(&self) -> Result<(), String> {
        if self.version != SUPPORTED_BLOCK_VERSION {
            return Err(format!(
                "unsupported block version {} (expected {})",
                self.version, SUPPORTED_BLOCK_VERSION,
            ));
        }
        if self.number_of_transactions as usize != self.transactions.len() {
            return Err(format!(
                "transaction count field {} disagrees with payload of {}",
                self.number_of_transactions,
                self.transactions.len(),
            ));
        }
        if self.payload_length != payload_length_of(&self.transactions) {
            return Err(format!(
                "payload length field {} disagrees with encoded payload of {}",
                self.payload_length,
                payload_length_of(&self.transactions),
            ));
        }
        Ok(())
    }

    /// Returns the block id as a full hex string.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

// ---------------------------------------------------------------------------
// Payload Hashing
// ---------------------------------------------------------------------------

/// Ordered BLAKE3 over each transaction's canonical bytes.
///
/// Reordering, dropping, or substituting any transaction changes the digest.
/// An empty payload hashes the empty input, not a zero sentinel, so even an
/// empty block commits to "no transactions" cryptographically.
pub fn compute_payload_hash(transactions: &[Transaction]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for tx in transactions {
        hasher.update(&tx.canonical_bytes());
    }
    *hasher.finalize().as_bytes()
}

/// Sum of the canonical byte lengths of all transactions.
pub fn payload_length_of(transactions: &[Transaction]) -> u32 {
    transactions
        .iter()
        .map(|tx| tx.canonical_bytes().len() as u32)
        .fold(0u32, u32::saturating_add)
}
