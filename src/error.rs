//! Unified error type for the replay core.
//!
//! Every failure here mirrors an on-chain revert: it is fatal to the
//! in-progress event application and must propagate to the caller without
//! committing partial state.

/// Errors raised by the pool replay core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// A full-precision multiply-divide result does not fit in 256 bits,
    /// or an intermediate exceeded the width the on-chain code asserts.
    #[error("256-bit arithmetic overflow")]
    ArithmeticOverflow,

    /// Division with a zero denominator.
    #[error("division by zero")]
    DivisionByZero,

    /// Tick outside `[MIN_TICK, MAX_TICK]`.
    #[error("tick {0} out of range")]
    InvalidTick(i32),

    /// Tick is not a multiple of the pool's tick spacing.
    #[error("tick {0} is not aligned to spacing {1}")]
    UnalignedTick(i32, i32),

    /// Sqrt price outside `[MIN_SQRT_RATIO, MAX_SQRT_RATIO)`.
    #[error("sqrt price out of range")]
    InvalidPrice,

    /// A tick's total liquidity would exceed `MAX_LIQUIDITY_PER_TICK`,
    /// or the pool-wide liquidity would overflow 128 bits.
    #[error("liquidity exceeds the allowed maximum")]
    LiquidityOverflow,

    /// More liquidity removed than is present.
    #[error("liquidity underflow")]
    LiquidityUnderflow,

    /// A timepoint query targets a moment older than the oldest retained
    /// ring-buffer entry. Under a correct replay this is unreachable; it
    /// signals an ordering bug in the caller's event feed.
    #[error("timepoint target predates the oldest retained entry")]
    StaleOracleQuery,

    /// The averaging window collapsed to zero width. Defensive; mirrors
    /// the original model's terminal branch in the averages computation.
    #[error("oracle averaging window is empty")]
    EmptyAverageWindow,

    /// Fee configuration violates `base_fee + alpha1 + alpha2 <= u16::MAX`
    /// or uses a zero gamma.
    #[error("invalid fee configuration")]
    InvalidFeeConfiguration,
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PoolError>;
