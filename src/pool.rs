//! The pool state machine.
//!
//! [`PoolModel`] owns a [`Storage`] snapshot and replays mutating events
//! against it with the same deterministic arithmetic as the mirrored
//! contract, so the snapshot can be diffed field-for-field against the
//! live storage after every event. Timestamps are always supplied by the
//! caller from the replayed event's block; nothing here reads a clock.
//!
//! Every operation stages its mutations on a copy of the storage and only
//! commits on success, so a failing event leaves no partial state behind.

use ethers::types::{Address, I256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adaptive_fee::FeeConfiguration;
use crate::constants::{BASE_FEE, COMMUNITY_FEE_DENOMINATOR, Q128, TICK_SPACING};
use crate::error::{PoolError, Result};
use crate::events::{BurnEvent, InitializeEvent, MintEvent, PoolEvent, SwapEvent};
use crate::full_math::mul_div;
use crate::liquidity_math::add_delta;
use crate::oracle::Oracle;
use crate::price_movement_math::move_price_towards_target;
use crate::tick_math::{
    get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO,
    MIN_TICK,
};
use crate::tick_registry::TickRegistry;
use crate::tick_table::TickTable;

/// Frequently-accessed pool state, the mirror of the contract's packed
/// global slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    /// Current Q64.96 sqrt price.
    pub price: U256,
    /// Current tick; the price is always the exact sqrt price of this tick
    /// except transiently inside a swap step.
    pub tick: i32,
    /// Current dynamic fee in parts per million.
    pub fee: u16,
    /// Index of the last written oracle timepoint.
    pub timepoint_index: u16,
    /// Protocol's share of token0 fees, out of 1000.
    pub community_fee_token0: u8,
    /// Protocol's share of token1 fees, out of 1000.
    pub community_fee_token1: u8,
    /// Reentrancy lock; set once the pool is initialized.
    pub unlocked: bool,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            price: U256::zero(),
            tick: 0,
            fee: BASE_FEE,
            timepoint_index: 0,
            community_fee_token0: 0,
            community_fee_token1: 0,
            unlocked: false,
        }
    }
}

/// Full pool storage: the snapshot that must match the live contract
/// field-for-field after replaying the same events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub global_state: GlobalState,
    /// Liquidity active at the current tick.
    pub liquidity: u128,
    /// All-time fee growth per unit of liquidity, Q128.
    pub total_fee_growth0_token: U256,
    pub total_fee_growth1_token: U256,
    /// Volume-per-liquidity accumulated since the last oracle write.
    pub volume_per_liquidity_in_block: U256,
    pub liquidity_cooldown: u32,
    /// Incentive hook address; inert in this model.
    pub active_incentive: Address,
    pub ticks: TickRegistry,
    pub tick_table: TickTable,
    pub timepoints: Oracle,
    pub fee_config: FeeConfiguration,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            token0: Address::zero(),
            token1: Address::zero(),
            tick_spacing: TICK_SPACING,
            global_state: GlobalState::default(),
            liquidity: 0,
            total_fee_growth0_token: U256::zero(),
            total_fee_growth1_token: U256::zero(),
            volume_per_liquidity_in_block: U256::zero(),
            liquidity_cooldown: 0,
            active_incentive: Address::zero(),
            ticks: TickRegistry::default(),
            tick_table: TickTable::default(),
            timepoints: Oracle::default(),
            fee_config: FeeConfiguration::default(),
        }
    }
}

/// Outcome of a swap, signed from the pool's perspective: positive amounts
/// enter the pool, negative amounts leave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapResult {
    pub amount0: I256,
    pub amount1: I256,
    pub current_price: U256,
    pub current_tick: i32,
    pub current_liquidity: u128,
    /// Portion of the collected fees routed to the protocol.
    pub community_fee_amount: U256,
}

/// Deterministic replay model of one pool. Owns its storage exclusively;
/// clone the model to fork a what-if line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolModel {
    pub storage: Storage,
}

impl PoolModel {
    /// Fresh, uninitialized pool for a token pair.
    pub fn new(token0: Address, token1: Address) -> Self {
        let mut storage = Storage::default();
        storage.token0 = token0;
        storage.token1 = token1;
        Self { storage }
    }

    /// Pool with explicit starting storage, e.g. a snapshot read from the
    /// live contract.
    pub fn with_storage(storage: Storage) -> Self {
        Self { storage }
    }

    /// Applies one decoded event at its block timestamp.
    pub fn apply(&mut self, timestamp: u32, event: &PoolEvent) -> Result<()> {
        match event {
            PoolEvent::Initialize(e) => self.on_initialize(timestamp, e),
            PoolEvent::Mint(e) => self.on_mint(timestamp, e),
            PoolEvent::Burn(e) => self.on_burn(timestamp, e),
            PoolEvent::Swap(e) => self.on_swap(timestamp, e).map(|_| ()),
        }
    }

    /// Pool creation: stamps the starting price and the genesis timepoint.
    pub fn on_initialize(&mut self, timestamp: u32, event: &InitializeEvent) -> Result<()> {
        validate_price(event.price)?;
        validate_tick(event.tick)?;
        debug!("initialize at tick {}", event.tick);

        self.storage.global_state.price = event.price;
        self.storage.global_state.tick = event.tick;
        self.storage.global_state.unlocked = true;
        self.storage.timepoints.init_genesis(timestamp, event.tick);
        Ok(())
    }

    /// Liquidity added to a position.
    pub fn on_mint(&mut self, timestamp: u32, event: &MintEvent) -> Result<()> {
        let delta =
            i128::try_from(event.liquidity_amount).map_err(|_| PoolError::LiquidityOverflow)?;
        debug!(
            "mint {} into [{}, {}]",
            event.liquidity_amount, event.bottom_tick, event.top_tick
        );
        self.update_position(timestamp, event.bottom_tick, event.top_tick, delta)?;
        Ok(())
    }

    /// Liquidity removed from a position.
    pub fn on_burn(&mut self, timestamp: u32, event: &BurnEvent) -> Result<()> {
        let delta =
            i128::try_from(event.liquidity_amount).map_err(|_| PoolError::LiquidityOverflow)?;
        debug!(
            "burn {} from [{}, {}]",
            event.liquidity_amount, event.bottom_tick, event.top_tick
        );
        self.update_position(timestamp, event.bottom_tick, event.top_tick, -delta)?;
        Ok(())
    }

    /// A swap replayed from its event: the reported amount of the sold token
    /// is treated as an exact input against the full-range price limit, and
    /// the event's closing price and tick are taken as authoritative.
    pub fn on_swap(&mut self, timestamp: u32, event: &SwapEvent) -> Result<SwapResult> {
        validate_price(event.price)?;
        validate_tick(event.tick)?;

        let zero_to_one = event.amount1 < I256::zero();
        let amount_required = if zero_to_one { event.amount0 } else { event.amount1 };
        let limit_sqrt_price = if zero_to_one {
            MIN_SQRT_RATIO + 1
        } else {
            MAX_SQRT_RATIO - 1
        };

        let result = self.calculate_swap(timestamp, zero_to_one, amount_required, limit_sqrt_price)?;
        self.storage.global_state.tick = event.tick;
        self.storage.global_state.price = event.price;
        Ok(result)
    }

    /// Executes a swap against the model, walking the price across
    /// initialized ticks until the requested amount is spent or the limit
    /// price is reached.
    pub fn calculate_swap(
        &mut self,
        timestamp: u32,
        zero_to_one: bool,
        mut amount_required: I256,
        limit_sqrt_price: U256,
    ) -> Result<SwapResult> {
        let mut storage = self.storage.clone();

        let amount_required_initial = amount_required;
        let exact_input = amount_required > I256::zero();

        let mut fee = storage.global_state.fee;
        let mut timepoint_index = storage.global_state.timepoint_index;
        let mut volume_per_liquidity_in_block = storage.volume_per_liquidity_in_block;
        let (mut total_fee_growth, community_fee) = if zero_to_one {
            (
                storage.total_fee_growth0_token,
                storage.global_state.community_fee_token0,
            )
        } else {
            (
                storage.total_fee_growth1_token,
                storage.global_state.community_fee_token1,
            )
        };

        let mut current_price = storage.global_state.price;
        let mut current_tick = storage.global_state.tick;
        let start_tick = current_tick;
        let mut current_liquidity = storage.liquidity;

        let mut amount_calculated = I256::zero();
        let mut community_fee_amount = U256::zero();

        // fetched lazily, at most once per swap, for tick crossings
        let mut computed_latest_timepoint = false;
        let mut cached_tick_cumulative = 0i64;
        let mut cached_seconds_per_liquidity = U256::zero();
        let mut total_fee_growth_b = U256::zero();

        // a new timepoint appears only for the first swap in a block, and
        // only then is the dynamic fee recalculated
        let new_timepoint_index = storage.timepoints.write(
            timepoint_index,
            timestamp,
            start_tick,
            current_liquidity,
            volume_per_liquidity_in_block,
        )?;
        if new_timepoint_index != timepoint_index {
            timepoint_index = new_timepoint_index;
            volume_per_liquidity_in_block = U256::zero();
            fee = storage.timepoints.get_fee(
                timestamp,
                current_tick,
                new_timepoint_index,
                current_liquidity,
                &storage.fee_config,
            )?;
            debug!("first swap in block, dynamic fee refreshed to {} ppm", fee);
        }

        loop {
            let step_sqrt_price = current_price;
            let (next_tick, initialized) = storage.tick_table.next_tick_in_same_row(
                current_tick,
                storage.tick_spacing,
                zero_to_one,
            );
            let next_tick_price = get_sqrt_ratio_at_tick(next_tick)?;

            // move to the next tick's price or to the limit, whichever comes
            // first in the swap direction
            let target_price = if zero_to_one == (next_tick_price < limit_sqrt_price) {
                limit_sqrt_price
            } else {
                next_tick_price
            };
            let step = move_price_towards_target(
                zero_to_one,
                current_price,
                target_price,
                current_liquidity,
                amount_required,
                fee as u32,
            )?;
            current_price = step.result_price;

            if exact_input {
                amount_required -= I256::from_raw(step.input + step.fee_amount);
                amount_calculated -= I256::from_raw(step.output);
            } else {
                // amount_required is negative here
                amount_required += I256::from_raw(step.output);
                amount_calculated += I256::from_raw(step.input + step.fee_amount);
            }

            let mut step_fee = step.fee_amount;
            if community_fee > 0 {
                let delta = step_fee * U256::from(community_fee)
                    / U256::from(COMMUNITY_FEE_DENOMINATOR);
                step_fee -= delta;
                community_fee_amount += delta;
            }
            if current_liquidity > 0 {
                // a zero-liquidity gap earns fees with no one to credit;
                // the amount is dropped, as on-chain
                total_fee_growth = total_fee_growth
                    .overflowing_add(mul_div(step_fee, Q128, U256::from(current_liquidity))?)
                    .0;
            }

            if current_price == next_tick_price {
                if initialized {
                    // the cumulative snapshot is fetched once per swap
                    if !computed_latest_timepoint {
                        let timepoint = storage.timepoints.get_single_timepoint(
                            timestamp,
                            0,
                            start_tick,
                            timepoint_index,
                            current_liquidity,
                        )?;
                        cached_tick_cumulative = timepoint.tick_cumulative;
                        cached_seconds_per_liquidity =
                            timepoint.seconds_per_liquidity_cumulative;
                        computed_latest_timepoint = true;
                        total_fee_growth_b = if zero_to_one {
                            storage.total_fee_growth1_token
                        } else {
                            storage.total_fee_growth0_token
                        };
                    }
                    let liquidity_delta = if zero_to_one {
                        -storage.ticks.cross(
                            next_tick,
                            total_fee_growth,
                            total_fee_growth_b,
                            cached_seconds_per_liquidity,
                            cached_tick_cumulative,
                            timestamp,
                        )
                    } else {
                        storage.ticks.cross(
                            next_tick,
                            total_fee_growth_b,
                            total_fee_growth,
                            cached_seconds_per_liquidity,
                            cached_tick_cumulative,
                            timestamp,
                        )
                    };
                    current_liquidity = add_delta(current_liquidity, liquidity_delta)?;
                }
                current_tick = if zero_to_one { next_tick - 1 } else { next_tick };
            } else if current_price != step_sqrt_price {
                // the budget ran out between ticks; resolve the exact tick
                // and stop
                current_tick = get_tick_at_sqrt_ratio(current_price)?;
                break;
            }

            if amount_required.is_zero() || current_price == limit_sqrt_price {
                break;
            }
        }

        // the amount to provide or receive can be less than requested when
        // the limit was reached
        let (amount0, amount1) = if zero_to_one == exact_input {
            (amount_required_initial - amount_required, amount_calculated)
        } else {
            (amount_calculated, amount_required_initial - amount_required)
        };

        storage.global_state.price = current_price;
        storage.global_state.tick = current_tick;
        storage.global_state.fee = fee;
        storage.global_state.timepoint_index = timepoint_index;
        storage.liquidity = current_liquidity;
        storage.volume_per_liquidity_in_block = volume_per_liquidity_in_block
            .overflowing_add(Oracle::calculate_volume_per_liquidity(
                current_liquidity,
                amount0,
                amount1,
            ))
            .0;
        if zero_to_one {
            storage.total_fee_growth0_token = total_fee_growth;
        } else {
            storage.total_fee_growth1_token = total_fee_growth;
        }

        self.storage = storage;
        Ok(SwapResult {
            amount0,
            amount1,
            current_price,
            current_tick,
            current_liquidity,
            community_fee_amount,
        })
    }

    /// Applies a position's liquidity delta to its boundary ticks and, when
    /// the range contains the current tick, to the pool-wide liquidity.
    /// Returns the fee growth accrued inside the range, per unit of
    /// liquidity, in both tokens.
    pub fn update_position(
        &mut self,
        timestamp: u32,
        bottom_tick: i32,
        top_tick: i32,
        liquidity_delta: i128,
    ) -> Result<(U256, U256)> {
        if bottom_tick >= top_tick {
            return Err(PoolError::InvalidTick(bottom_tick));
        }
        validate_tick(bottom_tick)?;
        validate_tick(top_tick)?;

        let mut storage = self.storage.clone();
        let tick = storage.global_state.tick;
        let timepoint_index = storage.global_state.timepoint_index;
        let total_fee_growth0_token = storage.total_fee_growth0_token;
        let total_fee_growth1_token = storage.total_fee_growth1_token;
        let liquidity = storage.liquidity;

        let mut toggled_bottom = false;
        let mut toggled_top = false;
        if liquidity_delta != 0 {
            // alignment is what the bitmap toggle would enforce; checking it
            // first keeps a failing update from committing anything
            if bottom_tick % storage.tick_spacing != 0 {
                return Err(PoolError::UnalignedTick(bottom_tick, storage.tick_spacing));
            }
            if top_tick % storage.tick_spacing != 0 {
                return Err(PoolError::UnalignedTick(top_tick, storage.tick_spacing));
            }

            let timepoint = storage.timepoints.get_single_timepoint(
                timestamp,
                0,
                tick,
                timepoint_index,
                liquidity,
            )?;

            if storage.ticks.update(
                bottom_tick,
                tick,
                liquidity_delta,
                total_fee_growth0_token,
                total_fee_growth1_token,
                timepoint.seconds_per_liquidity_cumulative,
                timepoint.tick_cumulative,
                timestamp,
                false,
            )? {
                toggled_bottom = true;
                storage.tick_table.toggle_tick(bottom_tick, storage.tick_spacing)?;
            }

            if storage.ticks.update(
                top_tick,
                tick,
                liquidity_delta,
                total_fee_growth0_token,
                total_fee_growth1_token,
                timepoint.seconds_per_liquidity_cumulative,
                timepoint.tick_cumulative,
                timestamp,
                true,
            )? {
                toggled_top = true;
                storage.tick_table.toggle_tick(top_tick, storage.tick_spacing)?;
            }
        }

        let inner_fee_growth = storage.ticks.inner_fee_growth(
            bottom_tick,
            top_tick,
            tick,
            total_fee_growth0_token,
            total_fee_growth1_token,
        );

        if liquidity_delta != 0 {
            // a toggled tick on a negative delta is no longer initialized
            if liquidity_delta < 0 {
                if toggled_bottom {
                    storage.ticks.remove(bottom_tick);
                }
                if toggled_top {
                    storage.ticks.remove(top_tick);
                }
            }

            // pool-wide liquidity only changes while the range is active
            let in_range = tick >= bottom_tick && tick < top_tick;
            if in_range {
                let liquidity_before = liquidity;
                let new_timepoint_index = storage.timepoints.write(
                    timepoint_index,
                    timestamp,
                    tick,
                    liquidity_before,
                    storage.volume_per_liquidity_in_block,
                )?;
                if timepoint_index != new_timepoint_index {
                    storage.global_state.fee = storage.timepoints.get_fee(
                        timestamp,
                        tick,
                        new_timepoint_index,
                        liquidity_before,
                        &storage.fee_config,
                    )?;
                    storage.global_state.timepoint_index = new_timepoint_index;
                    storage.volume_per_liquidity_in_block = U256::zero();
                }
                storage.liquidity = add_delta(liquidity_before, liquidity_delta)?;
            }
        }

        self.storage = storage;
        Ok(inner_fee_growth)
    }
}

fn validate_tick(tick: i32) -> Result<()> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(PoolError::InvalidTick(tick));
    }
    Ok(())
}

fn validate_price(price: U256) -> Result<()> {
    if price < MIN_SQRT_RATIO || price >= MAX_SQRT_RATIO {
        return Err(PoolError::InvalidPrice);
    }
    Ok(())
}
