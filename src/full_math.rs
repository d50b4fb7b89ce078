//! Full-precision 256-bit multiply-divide primitives.
//!
//! These mirror the on-chain `FullMath` library: the product `a * b` is held
//! in 512 bits before dividing, so quotients that fit 256 bits are computed
//! exactly even when the product does not. The on-chain code reconstructs the
//! 512-bit product from two 256-bit limbs and divides via a modular inverse;
//! here the transient 512-bit width is explicit, which yields the same
//! result for every input the on-chain version accepts.

use ethers::types::{U256, U512};

use crate::error::{PoolError, Result};

/// Computes `floor(a * b / denominator)` with full intermediate precision.
///
/// Fails when `denominator` is zero or the quotient does not fit 256 bits,
/// matching the on-chain revert conditions.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(PoolError::DivisionByZero);
    }
    let product = a.full_mul(b);
    let quotient = product / U512::from(denominator);
    U256::try_from(quotient).map_err(|_| PoolError::ArithmeticOverflow)
}

/// Computes `ceil(a * b / denominator)` with full intermediate precision.
///
/// Fails if the rounded-up result would not fit 256 bits.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(PoolError::DivisionByZero);
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let quotient = product / denominator;
    let result = U256::try_from(quotient).map_err(|_| PoolError::ArithmeticOverflow)?;
    if (product % denominator).is_zero() {
        Ok(result)
    } else {
        if result == U256::MAX {
            return Err(PoolError::ArithmeticOverflow);
        }
        Ok(result + 1)
    }
}

/// Returns `ceil(x / y)`.
///
/// Division by zero is the caller's responsibility on-chain; here it is
/// rejected explicitly.
pub fn div_rounding_up(x: U256, y: U256) -> Result<U256> {
    if y.is_zero() {
        return Err(PoolError::DivisionByZero);
    }
    let (quotient, remainder) = x.div_mod(y);
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + 1)
    }
}
