//! Slot and round arithmetic.
//!
//! Time on the chain is divided into fixed 10-second forging slots, and
//! slots are grouped into rounds of [`ROUND_LENGTH`] blocks. These helpers
//! are pure functions over chain-epoch timestamps so that verification and
//! checkpoint sampling are deterministic everywhere they run.

use chrono::Utc;

use crate::config::{EPOCH_UNIX_SECONDS, ROUND_LENGTH, SLOT_DURATION_SECS};

/// Returns the slot number containing the given chain-epoch timestamp.
pub fn slot_number(timestamp: u64) -> u64 {
    timestamp / SLOT_DURATION_SECS
}

/// Returns the chain-epoch timestamp at which the given slot begins.
pub fn slot_start(slot: u64) -> u64 {
    slot * SLOT_DURATION_SECS
}

/// Seconds elapsed since the chain epoch, clamped to zero for wall clocks
/// that predate it.
pub fn now_epoch_seconds() -> u64 {
    let now = Utc::now().timestamp();
    now.saturating_sub(EPOCH_UNIX_SECONDS).max(0) as u64
}

/// Returns the slot number the wall clock is currently in.
pub fn current_slot() -> u64 {
    slot_number(now_epoch_seconds())
}

/// Returns the 1-based round containing the given block height.
///
/// Heights 1..=ROUND_LENGTH are round 1, the next ROUND_LENGTH heights are
/// round 2, and so on.
pub fn round_of(height: u64) -> u64 {
    if height == 0 {
        return 0;
    }
    (height - 1) / ROUND_LENGTH + 1
}

/// Returns the height of the first block in the given 1-based round.
pub fn round_start_height(round: u64) -> u64 {
    (round.saturating_sub(1)) * ROUND_LENGTH + 1
}
