//! Per-step swap math: how far a given token budget moves the price.
//!
//! `move_price_towards_target` is the core of every swap iteration. It
//! solves the constant-liquidity curve for the price reachable with the
//! available amount (after fees for exact input, capped output for exact
//! output) and reproduces the original fee rounding exactly, including the
//! branch that attributes the whole remaining budget to fees when rounding
//! keeps the price from reaching the target.

use ethers::types::{I256, U256};

use crate::constants::{FEE_DENOMINATOR, MAX_UINT_160, Q96, RESOLUTION};
use crate::error::{PoolError, Result};
use crate::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
use crate::token_delta_math::{get_token0_delta, get_token1_delta};

/// Outcome of one price-movement step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceMovement {
    /// Q64.96 sqrt price after the step.
    pub result_price: U256,
    /// Amount of the sold token consumed, excluding fees.
    pub input: U256,
    /// Amount of the bought token produced.
    pub output: U256,
    /// Fee charged on the step, in the sold token.
    pub fee_amount: U256,
}

/// New sqrt price after swapping `input` of the sold token into the pool.
pub fn get_new_price_after_input(
    price: U256,
    liquidity: u128,
    input: U256,
    zero_to_one: bool,
) -> Result<U256> {
    get_new_price(price, liquidity, input, zero_to_one, true)
}

/// New sqrt price after withdrawing `output` of the bought token.
pub fn get_new_price_after_output(
    price: U256,
    liquidity: u128,
    output: U256,
    zero_to_one: bool,
) -> Result<U256> {
    get_new_price(price, liquidity, output, zero_to_one, false)
}

fn get_new_price(
    price: U256,
    liquidity: u128,
    amount: U256,
    zero_to_one: bool,
    from_input: bool,
) -> Result<U256> {
    if price.is_zero() {
        return Err(PoolError::InvalidPrice);
    }
    if liquidity == 0 {
        return Err(PoolError::DivisionByZero);
    }

    if zero_to_one == from_input {
        // the token0 side: price = liquidity * Q96 * price / (liquidity * Q96 ± amount * price)
        if amount.is_zero() {
            return Ok(price);
        }
        let liquidity_shifted = U256::from(liquidity) << RESOLUTION;

        if from_input {
            if let Some(product) = amount.checked_mul(price) {
                if let Some(denominator) = liquidity_shifted.checked_add(product) {
                    // always fits in 160 bits
                    return mul_div_rounding_up(liquidity_shifted, price, denominator);
                }
            }
            let denominator = (liquidity_shifted / price)
                .checked_add(amount)
                .ok_or(PoolError::ArithmeticOverflow)?;
            div_rounding_up(liquidity_shifted, denominator)
        } else {
            // if the product overflows, the denominator would underflow
            let product = amount
                .checked_mul(price)
                .ok_or(PoolError::ArithmeticOverflow)?;
            if liquidity_shifted <= product {
                return Err(PoolError::ArithmeticOverflow);
            }
            mul_div_rounding_up(liquidity_shifted, price, liquidity_shifted - product)
        }
    } else {
        // the token1 side: price moves by amount / liquidity, rounding the
        // quotient down when adding and up when subtracting
        if from_input {
            let quotient = if amount <= MAX_UINT_160 {
                (amount << RESOLUTION) / U256::from(liquidity)
            } else {
                mul_div(amount, Q96, U256::from(liquidity))?
            };
            price
                .checked_add(quotient)
                .ok_or(PoolError::ArithmeticOverflow)
        } else {
            let quotient = if amount <= MAX_UINT_160 {
                div_rounding_up(amount << RESOLUTION, U256::from(liquidity))?
            } else {
                mul_div_rounding_up(amount, Q96, U256::from(liquidity))?
            };
            if price <= quotient {
                return Err(PoolError::ArithmeticOverflow);
            }
            // always fits 160 bits
            Ok((price - quotient) & MAX_UINT_160)
        }
    }
}

/// Amount of the sold token needed to move from `from` to `to`, rounded up.
fn input_amount(zero_to_one: bool, to: U256, from: U256, liquidity: u128) -> Result<U256> {
    if zero_to_one {
        get_token0_delta(to, from, liquidity, true)
    } else {
        get_token1_delta(from, to, liquidity, true)
    }
}

/// Amount of the bought token released by moving from `from` to `to`,
/// rounded down.
fn output_amount(zero_to_one: bool, to: U256, from: U256, liquidity: u128) -> Result<U256> {
    if zero_to_one {
        get_token1_delta(to, from, liquidity, false)
    } else {
        get_token0_delta(from, to, liquidity, false)
    }
}

/// Moves the price from `current_price` toward `target_price` within the
/// budget `amount_available` (exact input when non-negative, exact output
/// when negative) at the given fee in parts per million.
pub fn move_price_towards_target(
    zero_to_one: bool,
    current_price: U256,
    target_price: U256,
    liquidity: u128,
    amount_available: I256,
    fee: u32,
) -> Result<PriceMovement> {
    let fee_denominator = U256::from(FEE_DENOMINATOR);
    let fee_complement = U256::from(FEE_DENOMINATOR - fee);
    let mut result = PriceMovement::default();

    if amount_available >= I256::zero() {
        let amount_available = amount_available.into_raw();
        let amount_available_after_fee = mul_div(amount_available, fee_complement, fee_denominator)?;
        result.input = input_amount(zero_to_one, target_price, current_price, liquidity)?;

        if amount_available_after_fee >= result.input {
            result.result_price = target_price;
            result.fee_amount = mul_div_rounding_up(result.input, U256::from(fee), fee_complement)?;
        } else {
            result.result_price = get_new_price_after_input(
                current_price,
                liquidity,
                amount_available_after_fee,
                zero_to_one,
            )?;
            if target_price != result.result_price {
                result.input =
                    input_amount(zero_to_one, result.result_price, current_price, liquidity)?;
                // the target was not reached, so the remainder of the budget
                // becomes fee
                result.fee_amount = amount_available
                    .checked_sub(result.input)
                    .ok_or(PoolError::ArithmeticOverflow)?;
            } else {
                result.fee_amount =
                    mul_div_rounding_up(result.input, U256::from(fee), fee_complement)?;
            }
        }
        result.output = output_amount(zero_to_one, result.result_price, current_price, liquidity)?;
    } else {
        let amount_available = amount_available.unsigned_abs();
        result.output = output_amount(zero_to_one, target_price, current_price, liquidity)?;

        if amount_available >= result.output {
            result.result_price = target_price;
        } else {
            result.result_price = get_new_price_after_output(
                current_price,
                liquidity,
                amount_available,
                zero_to_one,
            )?;
            if target_price != result.result_price {
                result.output =
                    output_amount(zero_to_one, result.result_price, current_price, liquidity)?;
            }
            // never pay out more than the remaining requested output
            if result.output > amount_available {
                result.output = amount_available;
            }
        }
        result.input = input_amount(zero_to_one, result.result_price, current_price, liquidity)?;
        result.fee_amount = mul_div_rounding_up(result.input, U256::from(fee), fee_complement)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_math::get_sqrt_ratio_at_tick;

    const LIQUIDITY: u128 = 2_000_000_000_000_000_000;

    #[test]
    fn zero_budget_moves_nothing() {
        let price = get_sqrt_ratio_at_tick(0).unwrap();
        let target = get_sqrt_ratio_at_tick(-600).unwrap();
        let step =
            move_price_towards_target(true, price, target, LIQUIDITY, I256::zero(), 3000).unwrap();
        assert_eq!(step.result_price, price);
        assert_eq!(step.input, U256::zero());
        assert_eq!(step.output, U256::zero());
        assert_eq!(step.fee_amount, U256::zero());
    }

    #[test]
    fn lands_exactly_on_target_when_budget_allows() {
        let price = get_sqrt_ratio_at_tick(0).unwrap();
        let target = get_sqrt_ratio_at_tick(-60).unwrap();
        let budget = I256::from_raw(U256::from(10u128.pow(18)));
        let step = move_price_towards_target(true, price, target, LIQUIDITY, budget, 3000).unwrap();
        assert_eq!(step.result_price, target);
        assert!(step.input > U256::zero());
        assert!(step.output > U256::zero());
        // the fee inverts the input-side deduction
        assert_eq!(
            step.fee_amount,
            mul_div_rounding_up(step.input, U256::from(3000u32), U256::from(997_000u32)).unwrap()
        );
    }

    #[test]
    fn stops_short_and_charges_remainder_as_fee() {
        let price = get_sqrt_ratio_at_tick(0).unwrap();
        let target = get_sqrt_ratio_at_tick(-6000).unwrap();
        // small budget cannot reach a distant target
        let budget = U256::from(1_000_000u64);
        let step = move_price_towards_target(
            true,
            price,
            target,
            LIQUIDITY,
            I256::from_raw(budget),
            3000,
        )
        .unwrap();
        assert!(step.result_price > target);
        assert!(step.result_price < price);
        // everything the curve did not consume is fee
        assert_eq!(step.input + step.fee_amount, budget);
    }

    #[test]
    fn exact_output_caps_at_requested_amount() {
        let price = get_sqrt_ratio_at_tick(0).unwrap();
        let target = get_sqrt_ratio_at_tick(600).unwrap();
        let requested = U256::from(5_000_000u64);
        let step = move_price_towards_target(
            false,
            price,
            target,
            LIQUIDITY,
            I256::zero() - I256::from_raw(requested),
            500,
        )
        .unwrap();
        assert!(step.output <= requested);
        assert!(step.input > U256::zero());
        assert_eq!(
            step.fee_amount,
            mul_div_rounding_up(step.input, U256::from(500u32), U256::from(999_500u32)).unwrap()
        );
    }

    #[test]
    fn exact_output_lands_on_target_when_output_is_larger() {
        let price = get_sqrt_ratio_at_tick(0).unwrap();
        let target = get_sqrt_ratio_at_tick(60).unwrap();
        let full_output = output_amount(false, target, price, LIQUIDITY).unwrap();
        let step = move_price_towards_target(
            false,
            price,
            target,
            LIQUIDITY,
            I256::zero() - I256::from_raw(full_output * 2u8),
            500,
        )
        .unwrap();
        assert_eq!(step.result_price, target);
        assert_eq!(step.output, full_output);
    }

    #[test]
    fn price_direction_follows_swap_direction() {
        let price = get_sqrt_ratio_at_tick(0).unwrap();
        let budget = I256::from_raw(U256::from(10_000_000u64));

        let down = move_price_towards_target(
            true,
            price,
            get_sqrt_ratio_at_tick(-600).unwrap(),
            LIQUIDITY,
            budget,
            100,
        )
        .unwrap();
        assert!(down.result_price <= price);

        let up = move_price_towards_target(
            false,
            price,
            get_sqrt_ratio_at_tick(600).unwrap(),
            LIQUIDITY,
            budget,
            100,
        )
        .unwrap();
        assert!(up.result_price >= price);
    }

    #[test]
    fn new_price_round_trips_through_deltas() {
        let price = get_sqrt_ratio_at_tick(100).unwrap();
        let input = U256::from(123_456_789u64);
        let moved = get_new_price_after_input(price, LIQUIDITY, input, true).unwrap();
        assert!(moved < price);
        // consuming the implied input cannot exceed what was offered
        let implied = input_amount(true, moved, price, LIQUIDITY).unwrap();
        assert!(implied <= input);
    }

    #[test]
    fn new_price_rejects_degenerate_inputs() {
        assert_eq!(
            get_new_price_after_input(U256::zero(), LIQUIDITY, U256::one(), true),
            Err(PoolError::InvalidPrice)
        );
        assert_eq!(
            get_new_price_after_input(Q96, 0, U256::one(), true),
            Err(PoolError::DivisionByZero)
        );
    }
}
