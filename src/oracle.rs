//! Time-weighted oracle ring buffer.
//!
//! A 65536-slot circular series of cumulative tick, seconds-per-liquidity,
//! volatility and volume-per-liquidity samples, addressed mod 2^16. Slots
//! are stored sparsely and read as zeroed when never written, matching the
//! storage layout being mirrored. Timestamps live on a wrapping 32-bit
//! clock; every comparison goes through [`lte_considering_overflow`], which
//! orders two points relative to the current time even across a wraparound.
//!
//! At most one timepoint is written per distinct timestamp: the pool calls
//! [`Oracle::write`] on every mutating event and the first call in a block
//! is the only one that lands.

use std::collections::BTreeMap;

use ethers::types::{I256, U256};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adaptive_fee::{self, FeeConfiguration};
use crate::constants::{MAX_VOLUME_PER_LIQUIDITY, UINT16_MODULO, WINDOW};
use crate::error::{PoolError, Result};

/// One oracle sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timepoint {
    /// Whether this slot has ever been written.
    pub initialized: bool,
    /// Wrapping 32-bit timestamp of the sample.
    pub block_timestamp: u32,
    /// Running sum of `tick * elapsed` since pool creation.
    pub tick_cumulative: i64,
    /// Running sum of `elapsed / max(1, liquidity)`, Q128.
    pub seconds_per_liquidity_cumulative: U256,
    /// Running sum of per-interval tick variance against its moving average.
    pub volatility_cumulative: u128,
    /// Average tick over the trailing window at this timestamp.
    pub average_tick: i32,
    /// Running sum of capped per-block volume per liquidity.
    pub volume_per_liquidity_cumulative: U256,
}

/// The ring buffer plus the operations the pool performs on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    timepoints: BTreeMap<u16, Timepoint>,
}

/// Orders `a <= b` on the wrapping 32-bit clock, relative to `current_time`.
///
/// A value greater than `current_time` is from before the clock wrapped and
/// therefore older than any value at or below it.
pub fn lte_considering_overflow(a: u32, b: u32, current_time: u32) -> bool {
    let a_before_wrap = a > current_time;
    if a_before_wrap == (b > current_time) {
        // both on the same side of the wrap point
        a <= b
    } else {
        a_before_wrap
    }
}

impl Oracle {
    /// Sample at `index`, zeroed when the slot was never written.
    pub fn get(&self, index: u16) -> Timepoint {
        self.timepoints.get(&index).cloned().unwrap_or_default()
    }

    /// Written slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&u16, &Timepoint)> {
        self.timepoints.iter()
    }

    /// Writes the genesis sample at slot 0 when the pool is initialized.
    pub fn init_genesis(&mut self, time: u32, tick: i32) {
        self.timepoints.insert(
            0,
            Timepoint {
                initialized: true,
                block_timestamp: time,
                average_tick: tick,
                ..Timepoint::default()
            },
        );
    }

    /// Appends a sample for `block_timestamp`, returning the index of the
    /// last written slot.
    ///
    /// A repeated timestamp is a no-op that returns `index` unchanged; the
    /// caller detects "first write in this block" by comparing indices.
    pub fn write(
        &mut self,
        index: u16,
        block_timestamp: u32,
        tick: i32,
        liquidity: u128,
        volume_per_liquidity: U256,
    ) -> Result<u16> {
        let last = self.get(index);
        if last.block_timestamp == block_timestamp {
            return Ok(index);
        }

        let index_updated = index.wrapping_add(1);
        // if the next slot is already initialized the ring has wrapped and
        // it holds the oldest retained sample
        let mut oldest_index = 0u16;
        if self.get(index_updated).initialized {
            oldest_index = index_updated;
        }

        let average_tick = self.average_tick(
            block_timestamp,
            tick,
            index,
            oldest_index,
            last.block_timestamp,
            last.tick_cumulative,
        )?;
        let prev_tick = self.previous_interval_tick(tick, index, oldest_index, &last);

        let created = Self::create_new_timepoint(
            &last,
            block_timestamp,
            tick,
            prev_tick,
            liquidity,
            average_tick,
            volume_per_liquidity,
        );
        self.timepoints.insert(index_updated, created);
        Ok(index_updated)
    }

    /// Sample at `time - seconds_ago`: the stored sample when the moment was
    /// written exactly, a synthesized one when it is newer than the last
    /// write, otherwise an interpolation between the two bracketing samples.
    pub fn get_single_timepoint(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
    ) -> Result<Timepoint> {
        let mut oldest_index = 0u16;
        let next_index = index.wrapping_add(1);
        if self.get(next_index).initialized {
            oldest_index = next_index;
        }
        self.single_timepoint_at(time, seconds_ago, tick, index, oldest_index, liquidity)
    }

    fn single_timepoint_at(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        oldest_index: u16,
        liquidity: u128,
    ) -> Result<Timepoint> {
        let target = time.wrapping_sub(seconds_ago);

        let last = self.get(index);
        if seconds_ago == 0 || lte_considering_overflow(last.block_timestamp, target, time) {
            // the target is at or after the last write
            if last.block_timestamp == target {
                return Ok(last);
            }
            let average_tick = self.average_tick(
                time,
                tick,
                index,
                oldest_index,
                last.block_timestamp,
                last.tick_cumulative,
            )?;
            let prev_tick = self.previous_interval_tick(tick, index, oldest_index, &last);
            return Ok(Self::create_new_timepoint(
                &last,
                target,
                tick,
                prev_tick,
                liquidity,
                average_tick,
                U256::zero(),
            ));
        }

        if !lte_considering_overflow(self.get(oldest_index).block_timestamp, target, time) {
            return Err(PoolError::StaleOracleQuery);
        }
        let (mut before_or_at, at_or_after) = self.binary_search(time, target, index, oldest_index);

        if target == at_or_after.block_timestamp {
            return Ok(at_or_after);
        }

        if target != before_or_at.block_timestamp {
            // in the middle: interpolate every cumulative field linearly
            let timepoint_time_delta = at_or_after
                .block_timestamp
                .wrapping_sub(before_or_at.block_timestamp);
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp);
            if timepoint_time_delta != 0 {
                before_or_at.tick_cumulative += (at_or_after.tick_cumulative
                    - before_or_at.tick_cumulative)
                    / timepoint_time_delta as i64
                    * target_delta as i64;
                before_or_at.seconds_per_liquidity_cumulative = before_or_at
                    .seconds_per_liquidity_cumulative
                    .overflowing_add(
                        at_or_after
                            .seconds_per_liquidity_cumulative
                            .overflowing_sub(before_or_at.seconds_per_liquidity_cumulative)
                            .0
                            * U256::from(target_delta)
                            / U256::from(timepoint_time_delta),
                    )
                    .0;
                before_or_at.volatility_cumulative = before_or_at.volatility_cumulative.wrapping_add(
                    at_or_after
                        .volatility_cumulative
                        .wrapping_sub(before_or_at.volatility_cumulative)
                        / timepoint_time_delta as u128
                        * target_delta as u128,
                );
                before_or_at.volume_per_liquidity_cumulative = before_or_at
                    .volume_per_liquidity_cumulative
                    .overflowing_add(
                        at_or_after
                            .volume_per_liquidity_cumulative
                            .overflowing_sub(before_or_at.volume_per_liquidity_cumulative)
                            .0
                            / U256::from(timepoint_time_delta)
                            * U256::from(target_delta),
                    )
                    .0;
            }
        }

        // at the left boundary or in the middle
        Ok(before_or_at)
    }

    /// Average volatility and average volume per liquidity over the trailing
    /// window (or since genesis when the pool is younger than the window).
    pub fn get_averages(
        &self,
        time: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
    ) -> Result<(u128, U256)> {
        let mut oldest_index = 0u16;
        let mut oldest = self.get(0);
        let next_index = index.wrapping_add(1);
        let candidate = self.get(next_index);
        if candidate.initialized {
            oldest_index = next_index;
            oldest = candidate;
        }

        let end_of_window =
            self.single_timepoint_at(time, 0, tick, index, oldest_index, liquidity)?;
        let oldest_timestamp = oldest.block_timestamp;

        if lte_considering_overflow(oldest_timestamp, time.wrapping_sub(WINDOW), time) {
            let start_of_window =
                self.single_timepoint_at(time, WINDOW, tick, index, oldest_index, liquidity)?;
            Ok((
                end_of_window
                    .volatility_cumulative
                    .wrapping_sub(start_of_window.volatility_cumulative)
                    / WINDOW as u128,
                end_of_window
                    .volume_per_liquidity_cumulative
                    .overflowing_sub(start_of_window.volume_per_liquidity_cumulative)
                    .0
                    >> 57,
            ))
        } else if time != oldest_timestamp {
            Ok((
                end_of_window
                    .volatility_cumulative
                    .wrapping_sub(oldest.volatility_cumulative)
                    / time.wrapping_sub(oldest_timestamp) as u128,
                end_of_window
                    .volume_per_liquidity_cumulative
                    .overflowing_sub(oldest.volume_per_liquidity_cumulative)
                    .0
                    >> 57,
            ))
        } else {
            Err(PoolError::EmptyAverageWindow)
        }
    }

    /// Dynamic fee in ppm for the current state, from the trailing averages.
    pub fn get_fee(
        &self,
        time: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        config: &FeeConfiguration,
    ) -> Result<u16> {
        let (volatility_average, volume_per_liquidity_average) =
            self.get_averages(time, tick, index, liquidity)?;
        Ok(adaptive_fee::get_fee(
            U256::from(volatility_average / 15),
            volume_per_liquidity_average,
            config,
        ))
    }

    /// Per-swap volume contribution:
    /// `sqrt(|amount0|) * sqrt(|amount1|) << 64 / max(1, liquidity)`, capped.
    pub fn calculate_volume_per_liquidity(
        liquidity: u128,
        amount0: I256,
        amount1: I256,
    ) -> U256 {
        let volume =
            amount0.unsigned_abs().integer_sqrt() * amount1.unsigned_abs().integer_sqrt();
        let denominator = U256::from(liquidity.max(1));
        let volume_shifted = if volume >= (U256::one() << 192) {
            U256::MAX / denominator
        } else {
            (volume << 64) / denominator
        };
        volume_shifted.min(MAX_VOLUME_PER_LIQUIDITY)
    }

    /// Instantaneous tick of the previous interval, derived from the two
    /// most recent samples.
    fn previous_interval_tick(
        &self,
        tick: i32,
        index: u16,
        oldest_index: u16,
        last: &Timepoint,
    ) -> i64 {
        if index == oldest_index {
            return tick as i64;
        }
        let prev_last = self.get(index.wrapping_sub(1));
        let dt = last.block_timestamp.wrapping_sub(prev_last.block_timestamp);
        if dt == 0 {
            return tick as i64;
        }
        (last.tick_cumulative - prev_last.tick_cumulative) / dt as i64
    }

    /// Average tick over the trailing window ending at `time`. The result is
    /// guaranteed to fit int24.
    fn average_tick(
        &self,
        time: u32,
        tick: i32,
        index: u16,
        oldest_index: u16,
        last_timestamp: u32,
        last_tick_cumulative: i64,
    ) -> Result<i64> {
        let oldest = self.get(oldest_index);
        let oldest_timestamp = oldest.block_timestamp;
        let window_start = time.wrapping_sub(WINDOW);

        if lte_considering_overflow(oldest_timestamp, window_start, time) {
            if lte_considering_overflow(last_timestamp, window_start, time) {
                // the last write is itself older than the window
                let start = self.get(index.wrapping_sub(1));
                if !start.initialized {
                    return Ok(tick as i64);
                }
                let dt = last_timestamp.wrapping_sub(start.block_timestamp);
                if dt == 0 {
                    return Ok(tick as i64);
                }
                Ok((last_tick_cumulative - start.tick_cumulative) / dt as i64)
            } else {
                //    time-WINDOW    last    time
                // _________*___________*______*_
                //           |||||||||||
                let start_of_window =
                    self.get_single_timepoint(time, WINDOW, tick, index, 0)?;
                let dt = WINDOW.wrapping_sub(time.wrapping_sub(last_timestamp));
                Ok((last_tick_cumulative - start_of_window.tick_cumulative) / dt as i64)
            }
        } else if last_timestamp == oldest_timestamp {
            Ok(tick as i64)
        } else {
            Ok((last_tick_cumulative - oldest.tick_cumulative)
                / last_timestamp.wrapping_sub(oldest_timestamp) as i64)
        }
    }

    /// Bracketing binary search over the ring, bounded by the oldest and the
    /// last written index with overflow-aware ordering.
    fn binary_search(
        &self,
        time: u32,
        target: u32,
        last_index: u16,
        oldest_index: u16,
    ) -> (Timepoint, Timepoint) {
        let mut left = oldest_index as u32;
        // newest timepoint, considering a single index wrap
        let mut right = if last_index >= oldest_index {
            last_index as u32
        } else {
            last_index as u32 + UINT16_MODULO
        };
        let mut current = (left + right) >> 1;

        loop {
            let before_or_at = self.get((current % UINT16_MODULO) as u16);
            if !before_or_at.initialized {
                // landed on an uninitialized slot, keep searching higher;
                // unreachable when the boundaries and target are correct
                left = current + 1;
                current = (left + right) >> 1;
                continue;
            }
            if lte_considering_overflow(before_or_at.block_timestamp, target, time) {
                let at_or_after = self.get(((current + 1) % UINT16_MODULO) as u16);
                if at_or_after.initialized {
                    if lte_considering_overflow(target, at_or_after.block_timestamp, time) {
                        // the only fully correct way to finish
                        return (before_or_at, at_or_after);
                    }
                    // the next sample is still before the target
                    left = current + 1;
                } else {
                    // unreachable when the boundaries and target are correct;
                    // kept for behavioral parity with the mirrored storage
                    warn!(
                        target_time = target,
                        slot = current,
                        "oracle binary search hit an uninitialized upper slot"
                    );
                    return (before_or_at.clone(), before_or_at);
                }
            } else {
                right = current.saturating_sub(1);
            }
            current = (left + right) >> 1;
        }
    }

    fn create_new_timepoint(
        last: &Timepoint,
        block_timestamp: u32,
        tick: i32,
        prev_tick: i64,
        liquidity: u128,
        average_tick: i64,
        volume_per_liquidity: U256,
    ) -> Timepoint {
        let delta = block_timestamp.wrapping_sub(last.block_timestamp);
        Timepoint {
            initialized: true,
            block_timestamp,
            tick_cumulative: last.tick_cumulative + tick as i64 * delta as i64,
            // just the time delta when liquidity is zero
            seconds_per_liquidity_cumulative: last
                .seconds_per_liquidity_cumulative
                .overflowing_add(
                    (U256::from(delta) << 128) / U256::from(liquidity.max(1)),
                )
                .0,
            // always fits 88 bits; wrapping after ~34800 years is accepted
            volatility_cumulative: last.volatility_cumulative.wrapping_add(volatility_on_range(
                delta,
                prev_tick,
                tick as i64,
                last.average_tick as i64,
                average_tick,
            )),
            average_tick: average_tick as i32,
            volume_per_liquidity_cumulative: last
                .volume_per_liquidity_cumulative
                .overflowing_add(volume_per_liquidity)
                .0,
        }
    }
}

/// Sum of `(tick(t) - avg_tick(t))^2` for `t` in `(0; dt]`, with both series
/// interpolated linearly across the interval.
///
/// With `tick = k*t + b` and `avg_tick = p*t + q`, the summand expands to
/// `(k-p)^2 t^2 + 2(k-p)(b-q) t + (b-q)^2`, so the whole sum reduces to the
/// first- and second-power progressions and is O(1) in `dt`.
pub(crate) fn volatility_on_range(
    dt: u32,
    tick0: i64,
    tick1: i64,
    avg_tick0: i64,
    avg_tick1: i64,
) -> u128 {
    if dt == 0 {
        return 0;
    }
    let dt = I256::from(dt as i64);
    let six = I256::from(6);
    let k = I256::from(tick1 - tick0 - (avg_tick1 - avg_tick0)); // (k - p) * dt
    let b = I256::from(tick0 - avg_tick0) * dt; // (b - q) * dt
    let sum_of_squares = dt * (dt + I256::one()) * (I256::from(2) * dt + I256::one()); // 6 * sum(t^2)
    let sum_of_sequence = dt * (dt + I256::one()); // 2 * sum(t)
    let volatility =
        (k * k * sum_of_squares + six * b * k * sum_of_sequence + six * dt * b * b) / (six * dt * dt);
    volatility.into_raw().low_u128()
}
