//! Deterministic block reward schedule.
//!
//! The reward for a block is a pure function of its height. Verification
//! recomputes the expected reward and rejects any block that claims a
//! different one, so this table is as consensus-critical as the hash
//! function.

use crate::config::{REWARD_DISTANCE, REWARD_MILESTONES, REWARD_OFFSET_HEIGHT};

/// Returns the reward, in sparks, that a block at `height` is entitled to.
///
/// Genesis and every block below [`REWARD_OFFSET_HEIGHT`] earn nothing.
/// From the offset on, the schedule steps through [`REWARD_MILESTONES`]
/// every [`REWARD_DISTANCE`] blocks and stays at the last milestone forever.
pub fn reward_for_height(height: u64) -> u64 {
    if height == 1 || height < REWARD_OFFSET_HEIGHT {
        return 0;
    }
    let step = (height - REWARD_OFFSET_HEIGHT) / REWARD_DISTANCE;
    let index = (step as usize).min(REWARD_MILESTONES.len() - 1);
    REWARD_MILESTONES[index]
}
