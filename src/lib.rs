//! # CLMM Replay SDK
//!
//! A deterministic Rust library for bit-exact off-chain replay and
//! verification of concentrated-liquidity AMM pool state with dynamic fees.
//!
//! ## Overview
//!
//! The SDK reconstructs and predicts the exact on-chain storage of a
//! tick-based liquidity pool by replaying its mutating events (initialize,
//! mint, burn, swap) through the same fixed-point arithmetic the contract
//! uses. After every event the model's [`pool::Storage`] can be diffed
//! field-for-field against the live contract via [`snapshot::diff`].
//!
//! Determinism is load-bearing: given the same ordered event sequence and
//! starting storage, every replay produces bit-identical results. There is
//! no I/O, no clock and no randomness in the core; timestamps always come
//! from the replayed event's block.
//!
//! ## Architecture
//!
//! The crate is organized in layers, leaves first:
//!
//! ### Numeric Layer
//! Full-precision 256-bit multiply-divide, tick/price conversion and the
//! per-step swap math with exact on-chain rounding directions.
//!
//! ### Bookkeeping Layer
//! The compressed tick bitmap, the per-tick liquidity and fee-growth
//! registry, and the time-weighted oracle ring buffer feeding the adaptive
//! fee curve.
//!
//! ### State Machine Layer
//! [`pool::PoolModel`] orchestrates the above: the tick-walking swap loop,
//! position updates and the event replay entry points.
//!
//! ### Verification Layer
//! Snapshot diffing and serde-serializable storage for comparing the model
//! against a pinned-block read of the live contract.

// Numeric Layer
/// Fixed-point scales and protocol constants
pub mod constants;
/// Full-precision multiply-divide primitives
pub mod full_math;
/// Signed liquidity-delta arithmetic
pub mod liquidity_math;
/// Tick to sqrt-price conversion and back
pub mod tick_math;
/// Token amounts implied by liquidity between prices
pub mod token_delta_math;
/// Per-step price movement under a token budget
pub mod price_movement_math;

// Bookkeeping Layer
/// Compressed bitmap of initialized ticks
pub mod tick_table;
/// Per-tick liquidity and fee-growth registry
pub mod tick_registry;
/// Time-weighted oracle ring buffer
pub mod oracle;
/// Sigmoid-based dynamic fee curve
pub mod adaptive_fee;

// State Machine Layer
/// The pool state machine and its storage
pub mod pool;
/// Decoded pool events and the replay driver
pub mod events;

// Verification & Configuration
/// Field-by-field snapshot comparison
pub mod snapshot;
/// Pool configuration loading
pub mod settings;
/// Unified error type
pub mod error;

// Re-exports for convenience
pub use error::{PoolError, Result};
pub use events::{EventRecord, PoolEvent};
pub use pool::{PoolModel, Storage, SwapResult};
pub use settings::Settings;
