// Bin price model: price(binId) = basePrice * (1 + binStep)^(binId - activeBinId)
use serde::Serialize;

/// Price of a single bin relative to the active bin.
///
/// `bin_step` is fractional (0.001 = 10 bps). Bins below the active bin get
/// negative exponents and therefore prices below `base_price`.
pub fn price_at(base_price: f64, active_bin_id: i32, bin_step: f64, bin_id: i32) -> f64 {
    let exponent = i64::from(bin_id) - i64::from(active_bin_id);
    // powi takes i32; bin distances beyond that are meaningless anyway
    let exponent = exponent.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    base_price * (1.0 + bin_step).powi(exponent)
}

/// Prices of `count` consecutive bins starting at `lower_bin_id`.
pub fn bin_prices(
    base_price: f64,
    active_bin_id: i32,
    lower_bin_id: i32,
    count: usize,
    bin_step: f64,
) -> Vec<(i32, f64)> {
    (0..count)
        .map(|i| {
            let bin_id = lower_bin_id + i as i32;
            (bin_id, price_at(base_price, active_bin_id, bin_step, bin_id))
        })
        .collect()
}

/// Spot price of base in quote units from pool reserves.
pub fn spot_price_from_reserves(base_reserve: f64, quote_reserve: f64) -> Option<f64> {
    if base_reserve > 0.0 && quote_reserve.is_finite() {
        Some(quote_reserve / base_reserve)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinPricePoint {
    pub bin_id: i32,
    pub price: f64,
    pub liquidity: f64,
}

/// Per-bin price and liquidity view of one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPriceProfile {
    pub lower_bin_id: i32,
    pub upper_bin_id: i32,
    pub active_bin_id: i32,
    pub base_price: f64,
    pub bin_step: f64,
    pub total_liquidity: f64,
    pub non_zero_bins: usize,
    /// Only bins holding liquidity
    pub bins: Vec<BinPricePoint>,
}

impl PositionPriceProfile {
    pub fn build(
        base_price: f64,
        active_bin_id: i32,
        bin_step: f64,
        lower_bin_id: i32,
        shares: &[f64],
    ) -> Self {
        let bins: Vec<BinPricePoint> = bin_prices(base_price, active_bin_id, lower_bin_id, shares.len(), bin_step)
            .into_iter()
            .zip(shares.iter().copied())
            .filter(|(_, liquidity)| *liquidity > 0.0)
            .map(|((bin_id, price), liquidity)| BinPricePoint {
                bin_id,
                price,
                liquidity,
            })
            .collect();

        Self {
            lower_bin_id,
            upper_bin_id: lower_bin_id + shares.len() as i32 - 1,
            active_bin_id,
            base_price,
            bin_step,
            total_liquidity: shares.iter().sum(),
            non_zero_bins: bins.len(),
            bins,
        }
    }
}
