//! # Protocol Configuration & Constants
//!
//! Every consensus-critical magic number in Helios lives here. These values
//! define the shape of the chain — slot cadence, round size, block maxima,
//! the reward schedule — and changing any of them after launch is a hard
//! fork. Non-consensus tuning knobs (page sizes, timeouts) live here too so
//! there is exactly one place to look.
//!
//! All monetary values are integers in the smallest unit ("sparks",
//! 8 decimals). Verification must be bit-identical across independent node
//! implementations, so floating point is banned from every path that touches
//! these constants.

// ---------------------------------------------------------------------------
// Chain Timing
// ---------------------------------------------------------------------------

/// Chain epoch: 2025-01-01T00:00:00Z as a Unix timestamp. Block and
/// transaction timestamps are seconds elapsed since this instant, so the
/// genesis block sits at timestamp 0 and every timestamp fits comfortably
/// in a `u64` for the lifetime of the network.
pub const EPOCH_UNIX_SECONDS: i64 = 1_735_689_600;

/// Duration of one forging slot in seconds. Exactly one delegate is
/// authorized to produce a block per slot.
pub const SLOT_DURATION_SECS: u64 = 10;

/// Number of forging slots (and therefore blocks) in one round. Each active
/// delegate forges once per round.
pub const ROUND_LENGTH: u64 = 51;

// ---------------------------------------------------------------------------
// Block Limits
// ---------------------------------------------------------------------------

/// The only block version this node accepts. Bumped on consensus changes.
pub const SUPPORTED_BLOCK_VERSION: u32 = 1;

/// Maximum number of transactions a single block may carry.
pub const MAX_TRANSACTIONS_PER_BLOCK: u32 = 25;

/// Maximum total payload length in bytes (sum of each transaction's
/// canonical encoding). 1 MiB keeps worst-case verification bounded.
pub const MAX_PAYLOAD_LENGTH_BYTES: u32 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Reward Schedule
// ---------------------------------------------------------------------------

/// Height at which block rewards begin. Blocks below this height (and the
/// genesis block) carry a reward of exactly zero.
pub const REWARD_OFFSET_HEIGHT: u64 = 2_160;

/// Number of blocks between reward milestone steps.
pub const REWARD_DISTANCE: u64 = 3_000_000;

/// Reward milestones in sparks. The schedule starts at the first entry and
/// steps down every [`REWARD_DISTANCE`] blocks, staying at the last entry
/// forever after.
pub const REWARD_MILESTONES: [u64; 5] = [
    500_000_000, // 5 HLS
    400_000_000, // 4 HLS
    300_000_000, // 3 HLS
    200_000_000, // 2 HLS
    100_000_000, // 1 HLS
];

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// Number of blocks requested per forward-fill page during catch-up.
pub const SYNC_PAGE_SIZE: usize = 64;

/// How many trailing rounds contribute a checkpoint id to the common-block
/// negotiation sequence. Bounds both the request size and the worst-case
/// rollback depth a negotiated ancestor can demand.
pub const CHECKPOINT_ROUNDS: u64 = 5;
