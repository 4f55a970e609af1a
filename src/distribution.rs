//! # Liquidity Distribution
//!
//! Computes per-bin token allocations for the named deposit strategies. Pure:
//! no network or storage access.
//!
//! - **spot**: `total / binCount` per bin, split evenly between X and Y.
//! - **curve**: weight `max(0.1, 1 - 0.3 * |i - floor(n/2)|)`, normalized over
//!   all bins, split evenly between X and Y.
//! - **bid-ask**: bins strictly below the midpoint take 80% X / 20% Y, bins
//!   strictly above take the inverse, and the exact midpoint (odd counts only)
//!   is balanced.
//!
//! A position window only ever needs a slice of the full-range distribution, so
//! callers compute it once and cut it with [`select_sub_range`].

use crate::error::{EngineError, Result};
use crate::types::conversions::decimal_to_base_units;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CURVE_DECAY: f64 = 0.3;
const CURVE_MIN_WEIGHT: f64 = 0.1;
const BID_ASK_HEAVY: f64 = 0.8;
const BID_ASK_LIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Spot,
    Curve,
    BidAsk,
}

impl FromStr for Strategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Strategy::Spot),
            "curve" => Ok(Strategy::Curve),
            "bid-ask" | "bid_ask" | "bidask" => Ok(Strategy::BidAsk),
            other => Err(EngineError::validation(format!(
                "unknown distribution strategy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Spot => "spot",
            Strategy::Curve => "curve",
            Strategy::BidAsk => "bid-ask",
        })
    }
}

/// Inclusive range of absolute bin ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinRange {
    pub lower: i32,
    pub upper: i32,
}

impl BinRange {
    pub fn new(lower: i32, upper: i32) -> Result<Self> {
        if lower > upper {
            return Err(EngineError::validation(format!(
                "invalid bin range [{}, {}]",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn len(&self) -> usize {
        (i64::from(self.upper) - i64::from(self.lower) + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }

    pub fn contains(&self, bin_id: i32) -> bool {
        (self.lower..=self.upper).contains(&bin_id)
    }

    /// The same range expressed relative to the active bin.
    pub fn relative_to(&self, active_bin_id: i32) -> (i32, i32) {
        (self.lower - active_bin_id, self.upper - active_bin_id)
    }
}

/// A range of `width` bins centred on the active bin.
pub fn centered_range(active_bin_id: i32, width: usize) -> Result<BinRange> {
    if width == 0 {
        return Err(EngineError::validation("bin range width must be positive"));
    }
    let half = (width / 2) as i32;
    let lower = active_bin_id - half;
    let upper = active_bin_id + (width as i32 - half - 1);
    BinRange::new(lower, upper)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinAllocation {
    pub bin_id: i32,
    pub relative_bin_id: i32,
    pub x_amount: f64,
    pub y_amount: f64,
}

impl BinAllocation {
    pub fn total(&self) -> f64 {
        self.x_amount + self.y_amount
    }
}

/// Allocates `total_amount` over every bin of `range`.
pub fn compute_distribution(
    strategy: Strategy,
    range: BinRange,
    active_bin_id: i32,
    total_amount: f64,
) -> Result<Vec<BinAllocation>> {
    if range.is_empty() {
        return Err(EngineError::validation("empty bin range"));
    }
    if !total_amount.is_finite() || total_amount < 0.0 {
        return Err(EngineError::validation(format!(
            "invalid deposit amount {}",
            total_amount
        )));
    }

    let bin_count = range.len();
    let amount_per_bin = total_amount / bin_count as f64;
    let allocate = |index: usize, x_amount: f64, y_amount: f64| {
        let bin_id = range.lower + index as i32;
        BinAllocation {
            bin_id,
            relative_bin_id: bin_id - active_bin_id,
            x_amount,
            y_amount,
        }
    };

    let allocations = match strategy {
        Strategy::Spot => (0..bin_count)
            .map(|i| allocate(i, amount_per_bin / 2.0, amount_per_bin / 2.0))
            .collect(),
        Strategy::Curve => {
            let center = bin_count / 2;
            let weight = |i: usize| {
                let distance = i.abs_diff(center) as f64;
                (1.0 - CURVE_DECAY * distance).max(CURVE_MIN_WEIGHT)
            };
            let weight_sum: f64 = (0..bin_count).map(weight).sum();
            (0..bin_count)
                .map(|i| {
                    let weighted = total_amount * weight(i) / weight_sum;
                    allocate(i, weighted / 2.0, weighted / 2.0)
                })
                .collect()
        }
        Strategy::BidAsk => {
            // Compare 2*i against (n-1) so the midpoint stays exact for even counts
            let doubled_mid = bin_count - 1;
            (0..bin_count)
                .map(|i| match (2 * i).cmp(&doubled_mid) {
                    std::cmp::Ordering::Less => allocate(
                        i,
                        amount_per_bin * BID_ASK_HEAVY,
                        amount_per_bin * BID_ASK_LIGHT,
                    ),
                    std::cmp::Ordering::Greater => allocate(
                        i,
                        amount_per_bin * BID_ASK_LIGHT,
                        amount_per_bin * BID_ASK_HEAVY,
                    ),
                    std::cmp::Ordering::Equal => {
                        allocate(i, amount_per_bin / 2.0, amount_per_bin / 2.0)
                    }
                })
                .collect()
        }
    };

    Ok(allocations)
}

/// Cuts the window `[left, right]` (relative bin ids) out of a precomputed
/// full-range distribution.
///
/// A missing `left` starts at the beginning, a missing `right` runs to the end.
pub fn select_sub_range(distribution: &[BinAllocation], left: i32, right: i32) -> Vec<BinAllocation> {
    let start = distribution
        .iter()
        .position(|d| d.relative_bin_id == left)
        .unwrap_or(0);
    let end = distribution
        .iter()
        .position(|d| d.relative_bin_id == right)
        .map(|i| i + 1)
        .unwrap_or(distribution.len());

    if start >= end {
        return Vec::new();
    }
    distribution[start..end].to_vec()
}

/// Converts a UI amount into integer base units for `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u64> {
    Ok(decimal_to_base_units(amount, u32::from(decimals))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn total(allocations: &[BinAllocation]) -> f64 {
        allocations.iter().map(BinAllocation::total).sum()
    }

    #[test]
    fn test_spot_even_split() {
        let range = BinRange::new(0, 3).unwrap();
        let dist = compute_distribution(Strategy::Spot, range, 0, 100.0).unwrap();
        assert_eq!(dist.len(), 4);
        for bin in &dist {
            assert_eq!(bin.x_amount, 12.5);
            assert_eq!(bin.y_amount, 12.5);
        }
    }

    #[test]
    fn test_bid_ask_odd_count() {
        let range = BinRange::new(10, 14).unwrap();
        let dist = compute_distribution(Strategy::BidAsk, range, 12, 100.0).unwrap();
        let pairs: Vec<(f64, f64)> = dist.iter().map(|d| (d.x_amount, d.y_amount)).collect();
        assert_eq!(
            pairs,
            vec![(16.0, 4.0), (16.0, 4.0), (10.0, 10.0), (4.0, 16.0), (4.0, 16.0)]
        );
        assert_eq!(dist[2].relative_bin_id, 0);
    }

    #[test]
    fn test_bid_ask_even_count_has_no_balanced_bin() {
        let range = BinRange::new(0, 3).unwrap();
        let dist = compute_distribution(Strategy::BidAsk, range, 0, 100.0).unwrap();
        assert!(dist.iter().all(|d| (d.x_amount - d.y_amount).abs() > EPSILON));
        assert!((total(&dist) - 100.0).abs() < EPSILON);
    }

    #[test]
    fn test_curve_peaks_at_center_and_sums_to_total() {
        let range = BinRange::new(-5, 5).unwrap();
        let dist = compute_distribution(Strategy::Curve, range, 0, 250.0).unwrap();
        assert!((total(&dist) - 250.0).abs() < EPSILON);
        let center = dist[5].total();
        assert!(dist.iter().all(|d| d.total() <= center + EPSILON));
        // Far bins bottom out at the minimum weight
        assert!((dist[0].total() - dist[1].total()).abs() < EPSILON);
    }

    #[test]
    fn test_all_strategies_sum_to_total() {
        for strategy in [Strategy::Spot, Strategy::Curve, Strategy::BidAsk] {
            for width in 1..=9 {
                let range = centered_range(1000, width).unwrap();
                let dist = compute_distribution(strategy, range, 1000, 77.7).unwrap();
                assert_eq!(dist.len(), width);
                assert!((total(&dist) - 77.7).abs() < 1e-9, "{} width {}", strategy, width);
            }
        }
    }

    #[test]
    fn test_unknown_strategy_is_validation_error() {
        assert!(matches!(
            "gaussian".parse::<Strategy>(),
            Err(EngineError::Validation(_))
        ));
        assert_eq!("Bid-Ask".parse::<Strategy>().unwrap(), Strategy::BidAsk);
    }

    #[test]
    fn test_centered_range() {
        assert_eq!(centered_range(100, 5).unwrap(), BinRange { lower: 98, upper: 102 });
        assert_eq!(centered_range(100, 4).unwrap(), BinRange { lower: 98, upper: 101 });
        assert!(centered_range(100, 0).is_err());
    }

    #[test]
    fn test_select_sub_range() {
        let range = BinRange::new(-10, 10).unwrap();
        let dist = compute_distribution(Strategy::Spot, range, 0, 21.0).unwrap();

        let window = select_sub_range(&dist, -3, 2);
        assert_eq!(window.len(), 6);
        assert_eq!(window.first().unwrap().relative_bin_id, -3);
        assert_eq!(window.last().unwrap().relative_bin_id, 2);

        // Left edge outside the distribution falls back to the start
        let clipped = select_sub_range(&dist, -40, -9);
        assert_eq!(clipped.len(), 2);

        // Right edge outside runs to the end
        let tail = select_sub_range(&dist, 9, 40);
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(Decimal::from(10), 9).unwrap(), 10_000_000_000);
    }
}
