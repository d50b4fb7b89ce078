//! Per-tick liquidity and fee-growth bookkeeping.
//!
//! Each initialized tick stores the net liquidity change applied when the
//! price crosses it and a set of "outer" accumulator snapshots. The outer
//! values only have relative meaning: they are stamped at initialization
//! time under the convention that all growth before a tick existed happened
//! below it, and every crossing replaces them with `global - outer`. That
//! two-sided running-sum trick is what lets fee growth inside a range be
//! computed as a pair of subtractions. All accumulator arithmetic wraps at
//! the field width, matching the on-chain unsigned semantics.

use std::collections::BTreeMap;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_LIQUIDITY_PER_TICK;
use crate::error::{PoolError, Result};
use crate::liquidity_math::add_delta;

/// State of a single initialized tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Total position liquidity referencing this tick as a boundary.
    pub liquidity_total: u128,
    /// Net liquidity added when the tick is crossed left to right.
    pub liquidity_delta: i128,
    /// Fee growth per unit of liquidity on the other side of this tick.
    pub outer_fee_growth0_token: U256,
    pub outer_fee_growth1_token: U256,
    /// Cumulative tick value on the other side of this tick.
    pub outer_tick_cumulative: i64,
    /// Seconds per unit of liquidity on the other side of this tick.
    pub outer_seconds_per_liquidity: U256,
    /// Seconds spent on the other side of this tick.
    pub outer_seconds_spent: u32,
    /// Set while `liquidity_total` is nonzero.
    pub initialized: bool,
}

/// Sparse map of tick index to tick state. Missing ticks read as zeroed,
/// which callers rely on for "no liquidity here" semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRegistry {
    ticks: BTreeMap<i32, Tick>,
}

impl TickRegistry {
    /// State of `tick`, zeroed when the tick has never been touched.
    pub fn get(&self, tick: i32) -> Tick {
        self.ticks.get(&tick).cloned().unwrap_or_default()
    }

    /// Initialized ticks in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &Tick)> {
        self.ticks.iter()
    }

    /// Drops a tick whose liquidity has returned to zero.
    pub fn remove(&mut self, tick: i32) {
        self.ticks.remove(&tick);
    }

    /// Applies a position's liquidity delta to one of its boundary ticks.
    ///
    /// Stamps the outer accumulators on the zero -> nonzero transition
    /// (only when the tick is at or below the current tick) and returns
    /// whether the initialized flag flipped, in which case the caller must
    /// toggle the bitmap.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        current_tick: i32,
        liquidity_delta: i128,
        total_fee_growth0_token: U256,
        total_fee_growth1_token: U256,
        seconds_per_liquidity_cumulative: U256,
        tick_cumulative: i64,
        time: u32,
        upper: bool,
    ) -> Result<bool> {
        let data = self.ticks.entry(tick).or_default();

        let liquidity_delta_before = data.liquidity_delta;
        let liquidity_total_before = data.liquidity_total;

        let liquidity_total_after = add_delta(liquidity_total_before, liquidity_delta)?;
        if liquidity_total_after > MAX_LIQUIDITY_PER_TICK {
            return Err(PoolError::LiquidityOverflow);
        }

        // the lower boundary adds liquidity when crossed left to right, the
        // upper boundary removes it
        data.liquidity_delta = if upper {
            liquidity_delta_before
                .checked_sub(liquidity_delta)
                .ok_or(PoolError::ArithmeticOverflow)?
        } else {
            liquidity_delta_before
                .checked_add(liquidity_delta)
                .ok_or(PoolError::ArithmeticOverflow)?
        };
        data.liquidity_total = liquidity_total_after;

        let mut flipped = liquidity_total_after == 0;
        if liquidity_total_before == 0 {
            flipped = !flipped;
            // by convention, all growth before initialization happened below
            // the tick
            if tick <= current_tick {
                data.outer_fee_growth0_token = total_fee_growth0_token;
                data.outer_fee_growth1_token = total_fee_growth1_token;
                data.outer_seconds_per_liquidity = seconds_per_liquidity_cumulative;
                data.outer_tick_cumulative = tick_cumulative;
                data.outer_seconds_spent = time;
            }
            data.initialized = true;
        }
        Ok(flipped)
    }

    /// Transitions a tick as the price crosses it, flipping every outer
    /// accumulator to `global - outer`. Returns the signed liquidity delta
    /// the pool must apply for a left-to-right crossing.
    pub fn cross(
        &mut self,
        tick: i32,
        total_fee_growth0_token: U256,
        total_fee_growth1_token: U256,
        seconds_per_liquidity_cumulative: U256,
        tick_cumulative: i64,
        time: u32,
    ) -> i128 {
        let data = self.ticks.entry(tick).or_default();

        data.outer_seconds_spent = time.wrapping_sub(data.outer_seconds_spent);
        data.outer_seconds_per_liquidity = seconds_per_liquidity_cumulative
            .overflowing_sub(data.outer_seconds_per_liquidity)
            .0;
        data.outer_tick_cumulative = tick_cumulative.wrapping_sub(data.outer_tick_cumulative);

        data.outer_fee_growth1_token = total_fee_growth1_token
            .overflowing_sub(data.outer_fee_growth1_token)
            .0;
        data.outer_fee_growth0_token = total_fee_growth0_token
            .overflowing_sub(data.outer_fee_growth0_token)
            .0;

        data.liquidity_delta
    }

    /// Fee growth per unit of liquidity accrued strictly between two tick
    /// boundaries, in both tokens.
    pub fn inner_fee_growth(
        &self,
        bottom_tick: i32,
        top_tick: i32,
        current_tick: i32,
        total_fee_growth0_token: U256,
        total_fee_growth1_token: U256,
    ) -> (U256, U256) {
        let lower = self.get(bottom_tick);
        let upper = self.get(top_tick);

        let (mut inner0, mut inner1);
        if current_tick < top_tick {
            if current_tick >= bottom_tick {
                inner0 = total_fee_growth0_token
                    .overflowing_sub(lower.outer_fee_growth0_token)
                    .0;
                inner1 = total_fee_growth1_token
                    .overflowing_sub(lower.outer_fee_growth1_token)
                    .0;
            } else {
                inner0 = lower.outer_fee_growth0_token;
                inner1 = lower.outer_fee_growth1_token;
            }
            inner0 = inner0.overflowing_sub(upper.outer_fee_growth0_token).0;
            inner1 = inner1.overflowing_sub(upper.outer_fee_growth1_token).0;
        } else {
            inner0 = upper
                .outer_fee_growth0_token
                .overflowing_sub(lower.outer_fee_growth0_token)
                .0;
            inner1 = upper
                .outer_fee_growth1_token
                .overflowing_sub(lower.outer_fee_growth1_token)
                .0;
        }
        (inner0, inner1)
    }
}
