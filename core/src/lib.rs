// Copyright (c) 2026 Helios Contributors. MIT License.
// See LICENSE for details.

//! # Helios — Consensus Core
//!
//! The chain-management core of the Helios delegated-proof-of-stake
//! network: block verification, chain synchronization, and fork
//! resolution. Fifty-one delegates take ten-second turns forging blocks;
//! this crate decides which of the blocks they (and everyone else) produce
//! actually become the chain.
//!
//! ## Architecture
//!
//! The crate is split along the two questions a consensus node keeps
//! answering:
//!
//! - **chain** — What is a block, and what makes one well-formed? Block
//!   and transaction structures, the slot/round clock, the reward
//!   schedule, and an in-memory chain store.
//! - **consensus** — Which block wins? The acceptance pipeline, the
//!   serialized execution slot, common-ancestor negotiation, peer sync,
//!   and fork resolution.
//! - **external** — The seams. Storage, networking, transaction
//!   semantics, and the delegate schedule live behind traits here; the
//!   core drives them and never reaches around them.
//! - **config** — Consensus constants. Changing these is a hard fork.
//!
//! ## Design Philosophy
//!
//! 1. Determinism above all: every node must judge every block identically.
//! 2. One block in flight — whole-operation serialization beats clever
//!    locking every time someone has to debug a rollback.
//! 3. Bounded trust: a peer can waste our time, never our history.
//! 4. If it moves the tip, it has tests. Plural.

pub mod chain;
pub mod config;
pub mod consensus;
pub mod external;

#[cfg(test)]
pub(crate) mod testutil;

pub use chain::{Block, BlockId, MemoryChain, Transaction};
pub use consensus::{
    BlockVerifier, ChainSynchronizer, CommonBlockLocator, ForkResolver, ProcessError,
    ReceiveOutcome, Sequencer, SyncError, VerifySummary,
};
pub use external::{CommonBlockDescriptor, ForkCause, ForkEvent, PeerDescriptor};
