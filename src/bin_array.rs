// Bin-array and position-window geometry
use crate::distribution::BinRange;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Bins per on-chain bin-array account. Overridable through `[batch].bin_array_size`.
pub const BIN_ARRAY_SIZE: u32 = 256;

/// Index of the bin array holding `bin_id` (floor division, so negative ids work).
pub fn bin_array_index(bin_id: i32, size: u32) -> i32 {
    bin_id.div_euclid(size as i32)
}

/// Two consecutive bin arrays; a position must fit inside one such pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinArrayPair {
    pub lower_index: i32,
    pub upper_index: i32,
}

impl BinArrayPair {
    pub fn starting_at(lower_index: i32) -> Self {
        Self {
            lower_index,
            upper_index: lower_index + 1,
        }
    }

    pub fn covers(&self, range: BinRange, size: u32) -> bool {
        let size = i64::from(size);
        i64::from(self.lower_index) * size <= i64::from(range.lower)
            && (i64::from(self.upper_index) + 1) * size > i64::from(range.upper)
    }
}

/// Every bin-array pair needed to serve positions inside `range`.
pub fn bin_array_pairs(range: BinRange, size: u32) -> Vec<BinArrayPair> {
    let first = bin_array_index(range.lower, size);
    let last = bin_array_index(range.upper, size);
    (first..=last).map(BinArrayPair::starting_at).collect()
}

/// The first pair whose span contains the whole `window`.
pub fn find_bin_array_pair(pairs: &[BinArrayPair], window: BinRange, size: u32) -> Result<BinArrayPair> {
    pairs
        .iter()
        .copied()
        .find(|pair| pair.covers(window, size))
        .ok_or_else(|| {
            EngineError::validation(format!(
                "no matching bin array for position range [{}, {}]",
                window.lower, window.upper
            ))
        })
}

/// One fixed-width position slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionWindow {
    /// Bin ids relative to the active bin
    pub relative: (i32, i32),
    pub absolute: BinRange,
}

/// Splits a relative bin range into position windows aligned on multiples of `width`.
pub fn position_windows(relative_range: (i32, i32), active_bin_id: i32, width: u32) -> Result<Vec<PositionWindow>> {
    let (left, right) = relative_range;
    if left > right {
        return Err(EngineError::validation(format!(
            "invalid relative range [{}, {}]",
            left, right
        )));
    }
    if width == 0 {
        return Err(EngineError::validation("position width must be positive"));
    }

    let width = width as i32;
    let first = left.div_euclid(width);
    let last = right.div_euclid(width);

    (first..=last)
        .map(|slot| {
            let rel_left = slot * width;
            let rel_right = rel_left + width - 1;
            Ok(PositionWindow {
                relative: (rel_left, rel_right),
                absolute: BinRange::new(active_bin_id + rel_left, active_bin_id + rel_right)?,
            })
        })
        .collect()
}

/// Smallest absolute range spanning all windows.
pub fn windows_span(windows: &[PositionWindow]) -> Option<BinRange> {
    let lower = windows.iter().map(|w| w.absolute.lower).min()?;
    let upper = windows.iter().map(|w| w.absolute.upper).max()?;
    BinRange::new(lower, upper).ok()
}
