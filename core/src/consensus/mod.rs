//! # Consensus Module
//!
//! Everything that decides what the chain tip *is*: block acceptance,
//! catch-up against taller peers, and resolution of rival branches.
//!
//! ## Architecture
//!
//! ```text
//! sequencer.rs — FIFO execution slot; every tip mutation queues here
//! verify.rs    — Receipt + contextual verification and the acceptance pipeline
//! locator.rs   — Checkpoint probes and common-ancestor negotiation
//! sync.rs      — Rollback-and-page-forward synchronization against a peer
//! fork.rs      — Gossip entry point: classification, tie-break, rollback
//! ```
//!
//! ## Design Decisions
//!
//! - One fair async mutex serializes every tip mutation. Forged blocks,
//!   gossip, and sync attempts interleave at whole-operation granularity,
//!   so no caller ever observes a half-applied block or a mid-rollback tip.
//! - The modules own no storage and no sockets. They drive the collaborator
//!   traits in [`crate::external`], which keeps every consensus rule
//!   testable with in-memory doubles.

pub mod fork;
pub mod locator;
pub mod sequencer;
pub mod sync;
pub mod verify;

pub use fork::{ForkKind, ForkResolver, ReceiveOutcome, ResolveError};
pub use locator::{CommonBlockLocator, NegotiationError};
pub use sequencer::Sequencer;
pub use sync::{ChainSynchronizer, SyncError};
pub use verify::{BlockVerifier, ProcessError, VerifySummary};
