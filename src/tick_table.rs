//! Compressed bitmap of initialized ticks.
//!
//! Ticks are compressed by the pool's tick spacing and packed 256 per row;
//! bit `b` of row `r` is set iff tick `(r * 256 + b) * spacing` is
//! initialized. Rows are stored sparsely and read as zero when absent, which
//! several call sites rely on. The search never leaves the row of the
//! starting tick; the swap loop simply calls it again from the row boundary.

use std::collections::BTreeMap;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::tick_math::{MAX_TICK, MIN_TICK};

/// Sparse `row -> 256-bit word` bitmap over compressed tick positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickTable {
    rows: BTreeMap<i16, U256>,
}

impl TickTable {
    /// Word for `row`, zero when the row has never been written.
    pub fn row(&self, row: i16) -> U256 {
        self.rows.get(&row).copied().unwrap_or_default()
    }

    /// Rows that currently hold at least one set bit.
    pub fn rows(&self) -> impl Iterator<Item = (&i16, &U256)> {
        self.rows.iter()
    }

    /// Flips the bit for `tick`. The tick must be aligned to `tick_spacing`.
    pub fn toggle_tick(&mut self, tick: i32, tick_spacing: i32) -> Result<()> {
        if tick % tick_spacing != 0 {
            return Err(PoolError::UnalignedTick(tick, tick_spacing));
        }
        let compressed = tick / tick_spacing;
        let bit_number = (compressed & 0xff) as usize;
        let row_number = (compressed >> 8) as i16;
        let word = self.row(row_number) ^ (U256::one() << bit_number);
        if word.is_zero() {
            self.rows.remove(&row_number);
        } else {
            self.rows.insert(row_number, word);
        }
        Ok(())
    }

    /// Whether the bitmap currently marks `tick` as initialized.
    pub fn is_initialized(&self, tick: i32, tick_spacing: i32) -> bool {
        if tick % tick_spacing != 0 {
            return false;
        }
        let compressed = tick / tick_spacing;
        self.row((compressed >> 8) as i16).bit((compressed & 0xff) as usize)
    }

    /// Next initialized tick within the word of `tick`, searching toward
    /// lower ticks when `lte` is set and strictly higher ticks otherwise.
    ///
    /// Returns the found tick and whether it is initialized; when no bit is
    /// set in the remainder of the word, returns the word boundary with
    /// `initialized = false` so the caller can resume from the next row.
    pub fn next_tick_in_same_row(&self, tick: i32, tick_spacing: i32, lte: bool) -> (i32, bool) {
        // compress, rounding toward negative infinity
        let mut compressed = if tick < 0 && tick % tick_spacing != 0 {
            tick / tick_spacing - 1
        } else {
            tick / tick_spacing
        };

        if lte {
            let bit_number = (compressed & 0xff) as usize;
            let row_number = (compressed >> 8) as i16;
            // keep only the bits at or below the starting position
            let row = self.row(row_number) << (255 - bit_number);
            if !row.is_zero() {
                compressed -= 255 - most_significant_bit(row);
                (uncompress_and_bound(compressed, tick_spacing), true)
            } else {
                compressed -= bit_number as i32;
                (uncompress_and_bound(compressed, tick_spacing), false)
            }
        } else {
            // start one position to the right; the current tick's own state
            // does not matter when searching upward
            compressed += 1;
            let bit_number = (compressed & 0xff) as usize;
            let row_number = (compressed >> 8) as i16;
            let row = self.row(row_number) >> bit_number;
            if !row.is_zero() {
                compressed += least_significant_bit(row);
                (uncompress_and_bound(compressed, tick_spacing), true)
            } else {
                compressed += 255 - bit_number as i32;
                (uncompress_and_bound(compressed, tick_spacing), false)
            }
        }
    }
}

/// Position of the highest set bit. `word` must be nonzero.
fn most_significant_bit(word: U256) -> i32 {
    (255 - word.leading_zeros()) as i32
}

/// Position of the lowest set bit. `word` must be nonzero.
fn least_significant_bit(word: U256) -> i32 {
    word.trailing_zeros() as i32
}

/// Decompresses a tick position and clamps it into the valid tick range.
fn uncompress_and_bound(compressed: i32, tick_spacing: i32) -> i32 {
    (compressed * tick_spacing).clamp(MIN_TICK, MAX_TICK)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACING: i32 = 60;

    #[test]
    fn toggle_requires_alignment() {
        let mut table = TickTable::default();
        assert_eq!(
            table.toggle_tick(61, SPACING),
            Err(PoolError::UnalignedTick(61, SPACING))
        );
        table.toggle_tick(120, SPACING).unwrap();
        assert!(table.is_initialized(120, SPACING));
    }

    #[test]
    fn toggle_twice_clears() {
        let mut table = TickTable::default();
        table.toggle_tick(-180, SPACING).unwrap();
        assert!(table.is_initialized(-180, SPACING));
        table.toggle_tick(-180, SPACING).unwrap();
        assert!(!table.is_initialized(-180, SPACING));
        // the row itself is garbage-collected
        assert_eq!(table.rows().count(), 0);
    }

    #[test]
    fn searches_left_to_self_and_below() {
        let mut table = TickTable::default();
        table.toggle_tick(0, SPACING).unwrap();
        table.toggle_tick(-240, SPACING).unwrap();

        // a tick finds itself when searching left
        assert_eq!(table.next_tick_in_same_row(0, SPACING, true), (0, true));
        // anything between -240 and 0 finds -240
        assert_eq!(table.next_tick_in_same_row(-1, SPACING, true), (-240, true));
        assert_eq!(
            table.next_tick_in_same_row(-239, SPACING, true),
            (-240, true)
        );
    }

    #[test]
    fn searches_right_strictly_above() {
        let mut table = TickTable::default();
        table.toggle_tick(0, SPACING).unwrap();
        table.toggle_tick(300, SPACING).unwrap();

        // the search starts one position to the right of the given tick
        assert_eq!(table.next_tick_in_same_row(0, SPACING, false), (300, true));
        assert_eq!(table.next_tick_in_same_row(-1, SPACING, false), (0, true));
        assert_eq!(
            table.next_tick_in_same_row(299, SPACING, false),
            (300, true)
        );
    }

    #[test]
    fn empty_word_returns_boundary_uninitialized() {
        let table = TickTable::default();
        let (tick, initialized) = table.next_tick_in_same_row(0, SPACING, true);
        assert!(!initialized);
        // word start for compressed position 0 is compressed 0 - 0 = 0
        assert_eq!(tick, 0);

        let (tick, initialized) = table.next_tick_in_same_row(0, SPACING, false);
        assert!(!initialized);
        // word end for compressed position 1 is compressed 255
        assert_eq!(tick, 255 * SPACING);
    }

    #[test]
    fn negative_unaligned_ticks_round_toward_negative_infinity() {
        let mut table = TickTable::default();
        table.toggle_tick(-120, SPACING).unwrap();
        // -61 compresses to -2 (floor), whose word still contains -120
        assert_eq!(
            table.next_tick_in_same_row(-61, SPACING, true),
            (-120, true)
        );
    }

    #[test]
    fn bounds_are_clamped() {
        let table = TickTable::default();
        let (tick, initialized) = table.next_tick_in_same_row(MIN_TICK + 5, 1, true);
        assert!(!initialized);
        assert!(tick >= MIN_TICK);
        let (tick, initialized) = table.next_tick_in_same_row(MAX_TICK - 5, 1, false);
        assert!(!initialized);
        assert!(tick <= MAX_TICK);
    }

    #[test]
    fn bitmap_tracks_an_arbitrary_toggle_sequence() {
        let mut table = TickTable::default();
        let ticks = [-887220, -600, -60, 0, 60, 600, 887220];
        for t in ticks {
            table.toggle_tick(t, SPACING).unwrap();
        }
        for t in ticks {
            assert!(table.is_initialized(t, SPACING), "tick {t}");
        }
        for t in ticks {
            table.toggle_tick(t, SPACING).unwrap();
        }
        for t in ticks {
            assert!(!table.is_initialized(t, SPACING), "tick {t}");
        }
    }
}
