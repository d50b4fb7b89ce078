//! Configuration for instantiating a pool model.
//!
//! Loaded from `Pool.toml` with environment-variable overrides, so a
//! verification harness can point the model at a concrete deployment
//! without recompiling. Every field has a default matching the reference
//! deployment; an empty file yields a usable model.

use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::env;

use crate::adaptive_fee::FeeConfiguration;
use crate::constants::{MAX_COMMUNITY_FEE, MAX_LIQUIDITY_COOLDOWN, TICK_SPACING};
use crate::error::{PoolError, Result};
use crate::pool::PoolModel;

#[derive(Debug, Deserialize, Clone)]
pub struct Tokens {
    #[serde(default)]
    pub token0: Address,
    #[serde(default)]
    pub token1: Address,
}

impl Default for Tokens {
    fn default() -> Self {
        // zero addresses are fine for pure replay; verification harnesses
        // override them from the deployment
        Self {
            token0: Address::zero(),
            token1: Address::zero(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Pool {
    #[serde(default = "default_tick_spacing")]
    pub tick_spacing: i32,
    #[serde(default)]
    pub community_fee_token0: u8,
    #[serde(default)]
    pub community_fee_token1: u8,
    #[serde(default)]
    pub liquidity_cooldown: u32,
}

fn default_tick_spacing() -> i32 {
    TICK_SPACING
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            tick_spacing: default_tick_spacing(),
            community_fee_token0: 0,
            community_fee_token1: 0,
            liquidity_cooldown: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub tokens: Tokens,
    #[serde(default)]
    pub pool: Pool,
    #[serde(default)]
    pub fee: FeeConfiguration,
}

impl Settings {
    /// Loads `Pool.toml` (optional) and applies environment overrides
    /// `POOL_TOKEN0` / `POOL_TOKEN1`.
    pub fn new() -> std::result::Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Pool.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        if let Ok(raw) = env::var("POOL_TOKEN0") {
            if let Ok(address) = raw.trim().parse() {
                settings.tokens.token0 = address;
            }
        }
        if let Ok(raw) = env::var("POOL_TOKEN1") {
            if let Ok(address) = raw.trim().parse() {
                settings.tokens.token1 = address;
            }
        }

        Ok(settings)
    }

    /// Checks the tunables against the protocol's hard limits.
    pub fn validate(&self) -> Result<()> {
        if self.pool.tick_spacing <= 0 {
            return Err(PoolError::InvalidTick(self.pool.tick_spacing));
        }
        if self.pool.community_fee_token0 > MAX_COMMUNITY_FEE
            || self.pool.community_fee_token1 > MAX_COMMUNITY_FEE
        {
            return Err(PoolError::InvalidFeeConfiguration);
        }
        if self.pool.liquidity_cooldown > MAX_LIQUIDITY_COOLDOWN {
            return Err(PoolError::InvalidFeeConfiguration);
        }
        self.fee.validate()
    }

    /// Builds a fresh model from the validated settings.
    pub fn build_model(&self) -> Result<PoolModel> {
        self.validate()?;
        let mut model = PoolModel::new(self.tokens.token0, self.tokens.token1);
        model.storage.tick_spacing = self.pool.tick_spacing;
        model.storage.global_state.community_fee_token0 = self.pool.community_fee_token0;
        model.storage.global_state.community_fee_token1 = self.pool.community_fee_token1;
        model.storage.liquidity_cooldown = self.pool.liquidity_cooldown;
        model.storage.fee_config = self.fee;
        model.storage.global_state.fee = self.fee.base_fee;
        Ok(model)
    }
}
