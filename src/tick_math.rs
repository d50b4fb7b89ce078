//! Tick ⇄ sqrt-price conversion.
//!
//! Prices live on the geometric grid `price = 1.0001^tick` and are stored as
//! Q64.96 fixed-point square roots. Both directions reproduce the on-chain
//! bit-level algorithm: a fixed chain of multiply-and-shift steps keyed off
//! the bits of `|tick|` one way, and a binary-logarithm extraction with a
//! conservative two-sided error bracket the other way. All signed
//! intermediates use 256-bit two's complement, exactly as the EVM does.

use ethers::types::U256;

use crate::constants::Q128;
use crate::error::{PoolError, Result};

/// Lowest tick with a representable sqrt price.
pub const MIN_TICK: i32 = -887272;
/// Highest tick with a representable sqrt price.
pub const MAX_TICK: i32 = 887272;

/// Sqrt price at `MIN_TICK`.
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]);
/// Sqrt price at `MAX_TICK`. Valid prices are strictly below this.
pub const MAX_SQRT_RATIO: U256 = U256([
    6743328256752651558,
    17280870778742802505,
    4294805859,
    0,
]);

/// `sqrt(1.0001^(2^k))` in Q128.128 for k = 1..=19; the k = 0 factor is
/// inlined in `get_sqrt_ratio_at_tick`.
const RATIO_MULTIPLIERS: [U256; 19] = [
    U256([6459403834229662010, 18444899583751176498, 0, 0]),
    U256([17226890335427755468, 18443055278223354162, 0, 0]),
    U256([2032852871939366096, 18439367220385604838, 0, 0]),
    U256([14545316742740207172, 18431993317065449817, 0, 0]),
    U256([5129152022828963008, 18417254355718160513, 0, 0]),
    U256([4894419605888772193, 18387811781193591352, 0, 0]),
    U256([1280255884321894483, 18329067761203520168, 0, 0]),
    U256([15924666964335305636, 18212142134806087854, 0, 0]),
    U256([8010504389359918676, 17980523815641551639, 0, 0]),
    U256([10668036004952895731, 17526086738831147013, 0, 0]),
    U256([4878133418470705625, 16651378430235024244, 0, 0]),
    U256([9537173718739605541, 15030750278693429944, 0, 0]),
    U256([9972618978014552549, 12247334978882834399, 0, 0]),
    U256([10428997489610666743, 8131365268884726200, 0, 0]),
    U256([9305304367709015974, 3584323654723342297, 0, 0]),
    U256([14301143598189091785, 696457651847595233, 0, 0]),
    U256([7393154844743099908, 26294789957452057, 0, 0]),
    U256([2209338891292245656, 37481735321082, 0, 0]),
    U256([10518117631919034274, 76158723, 0, 0]),
];

/// `log2(sqrt(1.0001))` in Q128.128.
const LOG_SQRT_10001_MULTIPLIER: U256 = U256([11745905768312294533, 13863, 0, 0]);
/// Lower error bound of the logarithm estimate.
const TICK_LOW_ERROR: U256 = U256([6552757943157144234, 184476617836266586, 0, 0]);
/// Upper error bound of the logarithm estimate.
const TICK_HIGH_ERROR: U256 = U256([4998474450511881007, 15793544031827761793, 0, 0]);

/// Returns the Q64.96 sqrt price at `tick`.
///
/// Fails with [`PoolError::InvalidTick`] when `|tick|` exceeds [`MAX_TICK`].
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(PoolError::InvalidTick(tick));
    }

    let mut ratio = if abs_tick & 1 != 0 {
        // sqrt(1.0001^-1) in Q128.128
        U256([12262481743371124737, 18445821805675392311, 0, 0])
    } else {
        Q128
    };
    for (k, multiplier) in RATIO_MULTIPLIERS.iter().enumerate() {
        if abs_tick & (2 << k) != 0 {
            // the product never reaches 2^256: ratio stays below 2^128
            ratio = ratio.overflowing_mul(*multiplier).0 >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up so the inverse conversion is
    // consistent for every tick.
    let round_up = !(ratio & U256::from(u32::MAX)).is_zero();
    Ok((ratio >> 32) + U256::from(round_up as u8))
}

/// Returns the greatest tick whose sqrt price is `<= price`.
///
/// Requires `MIN_SQRT_RATIO <= price < MAX_SQRT_RATIO`.
pub fn get_tick_at_sqrt_ratio(price: U256) -> Result<i32> {
    if price < MIN_SQRT_RATIO || price >= MAX_SQRT_RATIO {
        return Err(PoolError::InvalidPrice);
    }

    let ratio = price << 32;
    let msb = 255 - ratio.leading_zeros();

    let mut r = if msb >= 128 {
        ratio >> ((msb - 127) as usize)
    } else {
        ratio << ((127 - msb) as usize)
    };

    // log2(ratio) in signed Q192.64 two's complement, integer part from the
    // most significant bit, fraction bits from fourteen squaring steps.
    let mut log_2 = if msb >= 128 {
        U256::from(msb - 128) << 64
    } else {
        U256::zero().overflowing_sub(U256::from(128 - msb) << 64).0
    };
    for shift in (50..=63usize).rev() {
        r = r.overflowing_mul(r).0 >> 127;
        let f = r >> 128; // 0 or 1
        log_2 = log_2 | (f << shift);
        r = r >> (f.low_u32() as usize);
    }

    let log_sqrt10001 = log_2.overflowing_mul(LOG_SQRT_10001_MULTIPLIER).0;

    let tick_low = low_i32(sar128(log_sqrt10001.overflowing_sub(TICK_LOW_ERROR).0));
    let tick_high = low_i32(sar128(log_sqrt10001.overflowing_add(TICK_HIGH_ERROR).0));

    Ok(if tick_low == tick_high {
        tick_low
    } else if get_sqrt_ratio_at_tick(tick_high)? <= price {
        tick_high
    } else {
        tick_low
    })
}

/// Arithmetic (sign-extending) right shift by 128 over a two's-complement
/// 256-bit value.
fn sar128(x: U256) -> U256 {
    let shifted = x >> 128;
    if x.bit(255) {
        shifted | (U256::MAX << 128)
    } else {
        shifted
    }
}

/// Low 32 bits reinterpreted as a signed integer; callers guarantee the
/// value fits int24.
fn low_i32(x: U256) -> i32 {
    x.low_u32() as i32
}
