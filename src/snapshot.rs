//! Field-by-field comparison of two storage snapshots.
//!
//! Verification reads the live contract's storage at a pinned block and
//! diffs it against the model after replaying the same events. The diff
//! walks every scalar field, the global state, every tick, every bitmap
//! row and every initialized timepoint, reporting each mismatch by path so
//! a divergence points directly at the responsible subsystem.

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

use crate::pool::Storage;

/// One mismatching field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    /// Dotted path of the field, e.g. `global_state.price` or `ticks[-60].liquidity_total`.
    pub path: String,
    pub model: String,
    pub reference: String,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: model={} reference={}",
            self.path, self.model, self.reference
        )
    }
}

fn push_if_differs<T: PartialEq + fmt::Debug>(
    diffs: &mut Vec<FieldDiff>,
    path: impl Into<String>,
    model: &T,
    reference: &T,
) {
    if model != reference {
        diffs.push(FieldDiff {
            path: path.into(),
            model: format!("{model:?}"),
            reference: format!("{reference:?}"),
        });
    }
}

/// Compares two snapshots and returns every mismatch. An empty result means
/// the model tracked the reference exactly.
pub fn diff(model: &Storage, reference: &Storage) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();

    push_if_differs(&mut diffs, "token0", &model.token0, &reference.token0);
    push_if_differs(&mut diffs, "token1", &model.token1, &reference.token1);
    push_if_differs(
        &mut diffs,
        "tick_spacing",
        &model.tick_spacing,
        &reference.tick_spacing,
    );
    push_if_differs(&mut diffs, "liquidity", &model.liquidity, &reference.liquidity);
    push_if_differs(
        &mut diffs,
        "total_fee_growth0_token",
        &model.total_fee_growth0_token,
        &reference.total_fee_growth0_token,
    );
    push_if_differs(
        &mut diffs,
        "total_fee_growth1_token",
        &model.total_fee_growth1_token,
        &reference.total_fee_growth1_token,
    );
    push_if_differs(
        &mut diffs,
        "volume_per_liquidity_in_block",
        &model.volume_per_liquidity_in_block,
        &reference.volume_per_liquidity_in_block,
    );
    push_if_differs(
        &mut diffs,
        "liquidity_cooldown",
        &model.liquidity_cooldown,
        &reference.liquidity_cooldown,
    );
    push_if_differs(
        &mut diffs,
        "active_incentive",
        &model.active_incentive,
        &reference.active_incentive,
    );
    push_if_differs(
        &mut diffs,
        "fee_config",
        &model.fee_config,
        &reference.fee_config,
    );

    let mg = &model.global_state;
    let rg = &reference.global_state;
    push_if_differs(&mut diffs, "global_state.price", &mg.price, &rg.price);
    push_if_differs(&mut diffs, "global_state.tick", &mg.tick, &rg.tick);
    push_if_differs(&mut diffs, "global_state.fee", &mg.fee, &rg.fee);
    push_if_differs(
        &mut diffs,
        "global_state.timepoint_index",
        &mg.timepoint_index,
        &rg.timepoint_index,
    );
    push_if_differs(
        &mut diffs,
        "global_state.community_fee_token0",
        &mg.community_fee_token0,
        &rg.community_fee_token0,
    );
    push_if_differs(
        &mut diffs,
        "global_state.community_fee_token1",
        &mg.community_fee_token1,
        &rg.community_fee_token1,
    );
    push_if_differs(&mut diffs, "global_state.unlocked", &mg.unlocked, &rg.unlocked);

    // ticks: compare over the union of touched indices, missing reads as zero
    let tick_keys: BTreeSet<i32> = model
        .ticks
        .iter()
        .map(|(k, _)| *k)
        .chain(reference.ticks.iter().map(|(k, _)| *k))
        .collect();
    for key in tick_keys {
        push_if_differs(
            &mut diffs,
            format!("ticks[{key}]"),
            &model.ticks.get(key),
            &reference.ticks.get(key),
        );
    }

    // bitmap rows, same union treatment
    let row_keys: BTreeSet<i16> = model
        .tick_table
        .rows()
        .map(|(k, _)| *k)
        .chain(reference.tick_table.rows().map(|(k, _)| *k))
        .collect();
    for key in row_keys {
        push_if_differs(
            &mut diffs,
            format!("tick_table[{key}]"),
            &model.tick_table.row(key),
            &reference.tick_table.row(key),
        );
    }

    // every timepoint either side has written
    let timepoint_keys: BTreeSet<u16> = model
        .timepoints
        .iter()
        .map(|(k, _)| *k)
        .chain(reference.timepoints.iter().map(|(k, _)| *k))
        .collect();
    for key in timepoint_keys {
        push_if_differs(
            &mut diffs,
            format!("timepoints[{key}]"),
            &model.timepoints.get(key),
            &reference.timepoints.get(key),
        );
    }

    if !diffs.is_empty() {
        warn!(mismatches = diffs.len(), "storage snapshots diverge");
    }
    diffs
}

/// Whether two snapshots match exactly.
pub fn matches(model: &Storage, reference: &Storage) -> bool {
    diff(model, reference).is_empty()
}
