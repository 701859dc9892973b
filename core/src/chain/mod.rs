//! # Chain Module
//!
//! The data layer of Helios consensus: what a block *is*, when it may be
//! forged, and what forging it pays.
//!
//! ## Architecture
//!
//! ```text
//! block.rs   — Block and transaction structures, genesis, hash/sign/verify
//! slots.rs   — Epoch clock: timestamps to slots, heights to rounds
//! rewards.rs — The forging reward schedule (milestone halvings)
//! memory.rs  — In-memory chain store backing tests and single-node runs
//! ```
//!
//! ## Design Decisions
//!
//! - Timestamps are seconds since the Helios epoch, not Unix time. Every
//!   slot and round computation stays in small integers that way, and a
//!   block forged before the chain existed is unrepresentable.
//! - The reward schedule lives in code rather than config: changing it is
//!   a consensus change and must look like one in review.

pub mod block;
pub mod memory;
pub mod rewards;
pub mod slots;

pub use block::{Block, BlockId, Transaction};
pub use memory::MemoryChain;
