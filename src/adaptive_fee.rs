//! Dynamic fee curve: a base fee plus two volatility sigmoids gated by a
//! trade-volume sigmoid.
//!
//! Everything is evaluated in bounded integer arithmetic. The exponential is
//! an 8-term series of `e^(x/g) * g^8`, valid because the sigmoid saturates
//! once `|x - beta| >= 6 * gamma`, keeping `x` under 19 bits.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::constants::BASE_FEE;
use crate::error::{PoolError, Result};

/// Immutable tunables of the fee curve.
///
/// `alpha1`/`alpha2` are the amplitudes of the two volatility sigmoids,
/// `beta*` their midpoints, `gamma*` their stretch; `volume_*` parameterize
/// the outer volume sigmoid and `base_fee` is the floor, all fees in parts
/// per million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfiguration {
    pub alpha1: u16,
    pub alpha2: u16,
    pub beta1: u32,
    pub beta2: u32,
    pub gamma1: u16,
    pub gamma2: u16,
    pub volume_beta: u32,
    pub volume_gamma: u16,
    pub base_fee: u16,
}

impl Default for FeeConfiguration {
    fn default() -> Self {
        // production curve of the reference deployment
        Self {
            alpha1: 2900,
            alpha2: 12000,
            beta1: 360,
            beta2: 60000,
            gamma1: 59,
            gamma2: 8500,
            volume_beta: 0,
            volume_gamma: 10,
            base_fee: BASE_FEE,
        }
    }
}

impl FeeConfiguration {
    /// The fee ceiling must fit the 16-bit fee field and every gamma must be
    /// usable as a divisor.
    pub fn validate(&self) -> Result<()> {
        let ceiling = self.base_fee as u32 + self.alpha1 as u32 + self.alpha2 as u32;
        if ceiling > u16::MAX as u32 {
            return Err(PoolError::InvalidFeeConfiguration);
        }
        if self.gamma1 == 0 || self.gamma2 == 0 || self.volume_gamma == 0 {
            return Err(PoolError::InvalidFeeConfiguration);
        }
        Ok(())
    }
}

/// Fee in parts per million for the given average volatility and average
/// volume per liquidity.
pub fn get_fee(volatility: U256, volume_per_liquidity: U256, config: &FeeConfiguration) -> u16 {
    let sum_of_sigmoids = sigmoid(
        volatility,
        config.gamma1,
        U256::from(config.alpha1),
        U256::from(config.beta1),
    ) + sigmoid(
        volatility,
        config.gamma2,
        U256::from(config.alpha2),
        U256::from(config.beta2),
    );
    // should be impossible, just in case
    let sum_of_sigmoids = sum_of_sigmoids.min(U256::from(u16::MAX));

    let gated = sigmoid(
        volume_per_liquidity,
        config.volume_gamma,
        sum_of_sigmoids,
        U256::from(config.volume_beta),
    );
    // safe under the validated ceiling
    (config.base_fee as u32 + gated.low_u32()).min(u16::MAX as u32) as u16
}

/// `alpha / (1 + e^((beta - x) / gamma))`: a sigmoid with maximum `alpha`,
/// midpoint `beta` and stretch `gamma`. Saturates to `0` or `alpha` once
/// `|x - beta| >= 6 * gamma`. The result never exceeds `alpha`.
fn sigmoid(x: U256, gamma: u16, alpha: U256, beta: U256) -> U256 {
    // gammas are validated nonzero; degenerate configs collapse to a step
    if gamma == 0 {
        return if x > beta { alpha } else { U256::zero() };
    }
    let g = U256::from(gamma);
    let six_g = g * 6u8;

    if x > beta {
        let x = x - beta;
        if x >= six_g {
            return alpha;
        }
        let g8 = g.pow(U256::from(8u8));
        let ex = exp(x, g, g8);
        // (16 + 155 bits) / 155 bits, so the result fits alpha
        alpha * ex / (g8 + ex)
    } else {
        let x = beta - x;
        if x >= six_g {
            return U256::zero();
        }
        let g8 = g.pow(U256::from(8u8));
        let ex = g8 + exp(x, g, g8);
        // g8 <= ex, so the result fits alpha
        alpha * g8 / ex
    }
}

/// `e^(x/g) * g^8` by the series
/// `g^8 + x*g^7 + x^2*g^6/2 + ... + x^7*g/5040 + x^8/40320`.
///
/// With `x < 2^19` and `g < 2^16` every summand stays under 152 bits and the
/// sum under 155 bits.
fn exp(x: U256, g: U256, g_highest_degree: U256) -> U256 {
    let mut g_degree = g_highest_degree; // g^8
    let mut x_degree = x;
    let mut res = g_degree;

    g_degree = g_degree / g; // g^7
    res = res + x_degree * g_degree;
    g_degree = g_degree / g; // g^6
    x_degree = x_degree * x; // x^2
    res = res + x_degree * g_degree / 2u8;
    g_degree = g_degree / g; // g^5
    x_degree = x_degree * x; // x^3
    res = res + x_degree * g_degree / 6u8;
    g_degree = g_degree / g; // g^4
    x_degree = x_degree * x; // x^4
    res = res + x_degree * g_degree / 24u8;
    g_degree = g_degree / g; // g^3
    x_degree = x_degree * x; // x^5
    res = res + x_degree * g_degree / 120u8;
    g_degree = g_degree / g; // g^2
    x_degree = x_degree * x; // x^6
    res = res + x_degree * g_degree / 720u16;
    x_degree = x_degree * x; // x^7
    res + x_degree * g / 5040u16 + x_degree * x / 40320u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_pool_pays_the_base_fee() {
        let config = FeeConfiguration::default();
        assert_eq!(get_fee(U256::zero(), U256::zero(), &config), config.base_fee);
    }

    #[test]
    fn saturated_pool_pays_the_ceiling() {
        let config = FeeConfiguration::default();
        let huge = U256::from(10_000_000u64);
        let fee = get_fee(huge, huge, &config);
        assert_eq!(
            fee,
            config.base_fee + config.alpha1 + config.alpha2
        );
    }

    #[test]
    fn sigmoid_midpoint_is_half_amplitude() {
        let alpha = U256::from(10_000u32);
        let beta = U256::from(500u32);
        assert_eq!(sigmoid(beta, 100, alpha, beta), alpha / 2u8);
    }

    #[test]
    fn sigmoid_saturates_at_six_gammas() {
        let alpha = U256::from(4000u32);
        let beta = U256::from(1000u32);
        assert_eq!(sigmoid(beta + U256::from(600u32), 100, alpha, beta), alpha);
        assert_eq!(
            sigmoid(beta - U256::from(600u32), 100, alpha, beta),
            U256::zero()
        );
    }

    #[test]
    fn sigmoid_never_exceeds_amplitude_and_is_monotonic() {
        let alpha = U256::from(12_000u32);
        let beta = U256::from(60_000u32);
        let mut previous = U256::zero();
        for x in (0u32..=120_000).step_by(5_000) {
            let value = sigmoid(U256::from(x), 8500, alpha, beta);
            assert!(value <= alpha);
            assert!(value >= previous, "sigmoid must not decrease at x={x}");
            previous = value;
        }
    }

    #[test]
    fn fee_grows_with_volatility() {
        let config = FeeConfiguration::default();
        let volume = U256::from(1_000u32);
        let low = get_fee(U256::from(100u32), volume, &config);
        let high = get_fee(U256::from(5_000u32), volume, &config);
        assert!(high >= low);
        assert!(high > config.base_fee);
    }

    #[test]
    fn configuration_ceiling_is_enforced() {
        let mut config = FeeConfiguration::default();
        config.validate().unwrap();

        config.alpha1 = u16::MAX;
        config.alpha2 = u16::MAX;
        assert_eq!(config.validate(), Err(PoolError::InvalidFeeConfiguration));

        let mut config = FeeConfiguration {
            gamma1: 0,
            ..FeeConfiguration::default()
        };
        assert_eq!(config.validate(), Err(PoolError::InvalidFeeConfiguration));
        config.gamma1 = 59;
        config.validate().unwrap();
    }
}
