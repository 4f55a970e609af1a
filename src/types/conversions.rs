use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Parses a base58 account key; anything that does not decode to exactly 32 bytes is rejected.
pub fn string_to_pubkey(s: &str) -> Result<Pubkey, ConversionError> {
    let trimmed = s.trim();
    Pubkey::from_str(trimmed)
        .map_err(|e| ConversionError::InvalidAddress(format!("{}: {}", trimmed, e)))
}

/// Parses an integer-like amount as delivered by the protocol SDK (decimal string,
/// possibly larger than u64) into an f64. Empty strings are zero.
pub fn amount_str_to_f64(value: &str) -> Result<f64, ConversionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    let parsed = f64::from_str(trimmed)
        .map_err(|e| ConversionError::InvalidNumber(format!("{}: {}", trimmed, e)))?;
    if !parsed.is_finite() {
        return Err(ConversionError::InvalidNumber(trimmed.to_string()));
    }
    Ok(parsed)
}

/// Scales a UI amount (e.g. `10.5` tokens) into integer base units.
pub fn decimal_to_base_units(amount: Decimal, decimals: u32) -> Result<u64, ConversionError> {
    if amount.is_sign_negative() {
        return Err(ConversionError::InvalidDecimal(format!(
            "negative amount {}",
            amount
        )));
    }
    let multiplier = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or(ConversionError::Overflow)?;
    let scaled = amount
        .checked_mul(multiplier)
        .ok_or(ConversionError::Overflow)?
        .trunc();
    u64::from_str(&scaled.to_string()).map_err(|_| ConversionError::Overflow)
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Inconsistent record: {0}")]
    Inconsistent(String),
}
