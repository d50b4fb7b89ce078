//! Fixed-point scales and protocol constants shared across the core.

use ethers::types::U256;

/// Number of fractional bits in a Q64.96 sqrt price.
pub const RESOLUTION: usize = 96;

/// 2^96, the Q64.96 one.
pub const Q96: U256 = U256([0, 4294967296, 0, 0]);

/// 2^128, the Q128 one used by fee-growth accumulators.
pub const Q128: U256 = U256([0, 0, 1, 0]);

/// 2^160 - 1; sqrt prices must fit in 160 bits.
pub const MAX_UINT_160: U256 = U256([u64::MAX, u64::MAX, 4294967295, 0]);

/// Swap fee denominator, parts per million.
pub const FEE_DENOMINATOR: u32 = 1_000_000;

/// Fee applied before the first oracle-driven recalculation, in ppm.
pub const BASE_FEE: u16 = 100;

/// Default distance between usable ticks.
pub const TICK_SPACING: i32 = 60;

/// Upper bound on the total liquidity referencing a single tick.
pub const MAX_LIQUIDITY_PER_TICK: u128 = 11505743598341114571880798222544994;

/// Community fee is expressed as a fraction of this denominator.
pub const COMMUNITY_FEE_DENOMINATOR: u32 = 1000;

/// Largest allowed community fee numerator.
pub const MAX_COMMUNITY_FEE: u8 = 250;

/// Largest allowed liquidity cooldown, in seconds.
pub const MAX_LIQUIDITY_COOLDOWN: u32 = 60 * 60 * 24;

/// Number of slots in the oracle ring buffer (2^16).
pub const UINT16_MODULO: u32 = 65536;

/// Trailing averaging window of the oracle, in seconds (24 hours).
pub const WINDOW: u32 = 60 * 60 * 24;

/// Cap on the per-block volume-per-liquidity contribution (100000 << 64).
pub const MAX_VOLUME_PER_LIQUIDITY: U256 = U256([0, 100000, 0, 0]);
