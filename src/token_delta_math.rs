//! Token amounts implied by a liquidity value between two sqrt prices.
//!
//! The rounding flag follows the on-chain convention: amounts a swapper or
//! liquidity provider must pay round up, amounts paid out round down.

use ethers::types::U256;

use crate::constants::{Q96, RESOLUTION};
use crate::error::{PoolError, Result};
use crate::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};

/// Amount of token0 covering `liquidity` between two prices:
/// `liquidity * (1/price_lower - 1/price_upper)` in Q64.96.
///
/// Fails when `price_upper <= price_lower` or `price_lower` is zero.
pub fn get_token0_delta(
    price_lower: U256,
    price_upper: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256> {
    let price_delta = price_upper.overflowing_sub(price_lower).0;
    if price_delta >= price_upper {
        // underflow, equal prices, or a zero lower price
        return Err(PoolError::InvalidPrice);
    }
    let liquidity_shifted = U256::from(liquidity) << RESOLUTION;

    if round_up {
        div_rounding_up(
            mul_div_rounding_up(price_delta, liquidity_shifted, price_upper)?,
            price_lower,
        )
    } else {
        Ok(mul_div(price_delta, liquidity_shifted, price_upper)? / price_lower)
    }
}

/// Amount of token1 covering `liquidity` between two prices:
/// `liquidity * (price_upper - price_lower)` in Q64.96.
///
/// Fails when `price_upper < price_lower`.
pub fn get_token1_delta(
    price_lower: U256,
    price_upper: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256> {
    if price_upper < price_lower {
        return Err(PoolError::InvalidPrice);
    }
    let price_delta = price_upper - price_lower;
    if round_up {
        mul_div_rounding_up(price_delta, U256::from(liquidity), Q96)
    } else {
        mul_div(price_delta, U256::from(liquidity), Q96)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_math::get_sqrt_ratio_at_tick;

    #[test]
    fn zero_price_gap_yields_zero_token1() {
        let p = get_sqrt_ratio_at_tick(0).unwrap();
        assert_eq!(get_token1_delta(p, p, 1_000_000, true).unwrap(), U256::zero());
    }

    #[test]
    fn token0_rejects_inverted_and_zero_prices() {
        let p = get_sqrt_ratio_at_tick(0).unwrap();
        // an empty gap is fine and pays nothing
        assert_eq!(get_token0_delta(p, p, 1_000_000, true).unwrap(), U256::zero());
        assert_eq!(
            get_token0_delta(p + 1, p, 1_000_000, true),
            Err(PoolError::InvalidPrice)
        );
        assert_eq!(
            get_token0_delta(U256::zero(), p, 1_000_000, true),
            Err(PoolError::InvalidPrice)
        );
    }

    #[test]
    fn token1_rejects_inverted_prices() {
        let p = get_sqrt_ratio_at_tick(0).unwrap();
        assert_eq!(
            get_token1_delta(p, p - 1, 1_000_000, false),
            Err(PoolError::InvalidPrice)
        );
    }

    #[test]
    fn round_up_dominates_round_down() {
        let lower = get_sqrt_ratio_at_tick(-600).unwrap();
        let upper = get_sqrt_ratio_at_tick(600).unwrap();
        let liquidity = 123_456_789_012u128;

        let a0_up = get_token0_delta(lower, upper, liquidity, true).unwrap();
        let a0_down = get_token0_delta(lower, upper, liquidity, false).unwrap();
        assert!(a0_up >= a0_down);
        assert!(a0_up - a0_down <= U256::from(2u8));

        let a1_up = get_token1_delta(lower, upper, liquidity, true).unwrap();
        let a1_down = get_token1_delta(lower, upper, liquidity, false).unwrap();
        assert!(a1_up >= a1_down);
        assert!(a1_up - a1_down <= U256::one());
    }

    #[test]
    fn symmetric_range_around_one_needs_similar_amounts() {
        // at price 1.0 a symmetric range needs roughly equal token amounts
        let lower = get_sqrt_ratio_at_tick(-6000).unwrap();
        let upper = get_sqrt_ratio_at_tick(6000).unwrap();
        let mid = get_sqrt_ratio_at_tick(0).unwrap();
        let liquidity = 10u128.pow(18);

        let amount0 = get_token0_delta(mid, upper, liquidity, true).unwrap();
        let amount1 = get_token1_delta(lower, mid, liquidity, true).unwrap();
        let lo = amount1 * 99u8 / 100u8;
        let hi = amount1 * 101u8 / 100u8;
        assert!(amount0 >= lo && amount0 <= hi);
    }
}
