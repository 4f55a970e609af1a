// Q64.64 fixed-point decoding for on-chain liquidity shares
use crate::types::LiquidityShare;

/// 2^64, the Q64.64 scale factor
pub const Q64: f64 = 18_446_744_073_709_551_616.0;

/// Sentinel the SDK emits for empty bins
const ZERO_SENTINEL: &str = "00";

/// Decodes one hex-encoded Q64.64 value into a real number.
///
/// Empty strings, the `"00"` sentinel and anything that is not a hex integer
/// decode to `0.0`. Values wider than 128 bits lose precision but keep their
/// magnitude. Never fails.
pub fn decode_q64(encoded: &str) -> f64 {
    let trimmed = encoded.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits == ZERO_SENTINEL {
        return 0.0;
    }

    match u128::from_str_radix(digits, 16) {
        Ok(raw) => raw as f64 / Q64,
        Err(_) => decode_wide_hex(digits).map(|raw| raw / Q64).unwrap_or(0.0),
    }
}

// Digit-by-digit accumulation for hex integers past u128
fn decode_wide_hex(digits: &str) -> Option<f64> {
    digits.chars().try_fold(0.0f64, |acc, c| {
        c.to_digit(16).map(|d| acc * 16.0 + f64::from(d))
    })
}

/// Decodes a sequence element by element; output has the same length as input.
pub fn decode_shares<S: AsRef<str>>(encoded: &[S]) -> Vec<f64> {
    encoded.iter().map(|v| decode_q64(v.as_ref())).collect()
}

/// Same as [`decode_shares`] but keeps the raw token next to its value.
pub fn decode_liquidity_shares<S: AsRef<str>>(encoded: &[S]) -> Vec<LiquidityShare> {
    encoded
        .iter()
        .map(|v| LiquidityShare {
            raw: v.as_ref().to_string(),
            value: decode_q64(v.as_ref()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_decode_to_zero() {
        assert_eq!(decode_q64("00"), 0.0);
        assert_eq!(decode_q64(""), 0.0);
        assert_eq!(decode_q64("0"), 0.0);
    }

    #[test]
    fn test_one_in_q64() {
        assert_eq!(decode_q64("10000000000000000"), 1.0);
        assert_eq!(decode_q64("0x8000000000000000"), 0.5);
    }

    #[test]
    fn test_malformed_elements_are_isolated() {
        let decoded = decode_shares(&["10000000000000000", "zz-not-hex", "", "20000000000000000"]);
        assert_eq!(decoded, vec![1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_values_wider_than_128_bits_keep_magnitude() {
        // 2^128 in Q64.64 is 2^64
        let two_pow_128 = format!("1{}", "0".repeat(32));
        assert_eq!(decode_q64(&two_pow_128), 18_446_744_073_709_551_616.0);

        let wide = decode_q64(&"1".repeat(33));
        let expected = 2f64.powi(132) / 15.0 / Q64;
        assert!((wide - expected).abs() / expected < 1e-12);

        assert_eq!(decode_q64(&format!("{}g", "f".repeat(40))), 0.0);
    }

    #[test]
    fn test_keeps_raw_tokens() {
        let shares = decode_liquidity_shares(&["00", "10000000000000000"]);
        assert_eq!(shares[0].raw, "00");
        assert_eq!(shares[1].value, 1.0);
    }
}
