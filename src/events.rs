//! Decoded pool events and the replay driver.
//!
//! These mirror the contract's event ABI field-for-field; a verification
//! harness decodes raw logs into them, stamps each with its block number and
//! timestamp, and feeds the ordered sequence to [`replay`].

use std::fs;
use std::path::Path;

use anyhow::Context;
use ethers::types::{Address, I256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::pool::PoolModel;

/// `Initialize(uint160 price, int24 tick)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeEvent {
    pub price: U256,
    pub tick: i32,
}

/// `Mint(address sender, address owner, int24 bottomTick, int24 topTick,
/// uint128 liquidityAmount, uint256 amount0, uint256 amount1)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintEvent {
    pub sender: Address,
    pub owner: Address,
    pub bottom_tick: i32,
    pub top_tick: i32,
    pub liquidity_amount: u128,
    pub amount0: U256,
    pub amount1: U256,
}

/// `Burn(address owner, int24 bottomTick, int24 topTick,
/// uint128 liquidityAmount, uint256 amount0, uint256 amount1)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    pub owner: Address,
    pub bottom_tick: i32,
    pub top_tick: i32,
    pub liquidity_amount: u128,
    pub amount0: U256,
    pub amount1: U256,
}

/// `Swap(address sender, address recipient, int256 amount0, int256 amount1,
/// uint160 price, uint128 liquidity, int24 tick)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub sender: Address,
    pub recipient: Address,
    pub amount0: I256,
    pub amount1: I256,
    pub price: U256,
    pub liquidity: u128,
    pub tick: i32,
}

/// Any mutating pool event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    Initialize(InitializeEvent),
    Mint(MintEvent),
    Burn(BurnEvent),
    Swap(SwapEvent),
}

/// One log entry of the replayed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub block_number: u64,
    /// The block's timestamp; every state mutation is stamped with it.
    pub timestamp: u32,
    pub event: PoolEvent,
}

/// Reads an event log previously captured as JSON, e.g. by a harness that
/// decoded and dumped the raw chain logs.
pub fn read_event_log(path: impl AsRef<Path>) -> anyhow::Result<Vec<EventRecord>> {
    let raw = fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading event log {}", path.as_ref().display()))?;
    serde_json::from_str(&raw).context("decoding event log")
}

/// Applies an ordered event log to the model. Stops at the first failing
/// event, leaving the model at the state before that event.
pub fn replay(model: &mut PoolModel, records: &[EventRecord]) -> Result<()> {
    for record in records {
        debug!(
            "replaying block {} (timestamp {})",
            record.block_number, record.timestamp
        );
        model.apply(record.timestamp, &record.event)?;
    }
    Ok(())
}
