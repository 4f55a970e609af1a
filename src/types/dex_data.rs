use crate::fixed_point::decode_liquidity_shares;
use crate::types::conversions::{amount_str_to_f64, string_to_pubkey, ConversionError};
use crate::types::{BinReserve, Position, Pubkey};
use serde::Deserialize;

// Raw pair account as returned by the protocol SDK
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairAccountDto {
    pub active_id: Option<i32>,
    /// Basis points
    pub bin_step: Option<u16>,
    pub token_mint_x: Option<String>,
    pub token_mint_y: Option<String>,
}

/// Validated pair parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PairState {
    pub active_bin_id: i32,
    pub bin_step_bps: u16,
    pub token_mint_x: Pubkey,
    pub token_mint_y: Pubkey,
}

impl PairState {
    pub fn bin_step_fraction(&self) -> f64 {
        f64::from(self.bin_step_bps) / 10_000.0
    }
}

impl TryFrom<PairAccountDto> for PairState {
    type Error = ConversionError;

    fn try_from(raw: PairAccountDto) -> Result<Self, Self::Error> {
        Ok(PairState {
            active_bin_id: raw.active_id.ok_or(ConversionError::MissingField("activeId"))?,
            bin_step_bps: raw.bin_step.ok_or(ConversionError::MissingField("binStep"))?,
            token_mint_x: string_to_pubkey(
                raw.token_mint_x
                    .as_deref()
                    .ok_or(ConversionError::MissingField("tokenMintX"))?,
            )?,
            token_mint_y: string_to_pubkey(
                raw.token_mint_y
                    .as_deref()
                    .ok_or(ConversionError::MissingField("tokenMintY"))?,
            )?,
        })
    }
}

// Raw user position (liquidity shares are hex Q64.64 strings)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPositionDto {
    pub position: Option<String>,
    pub position_mint: Option<String>,
    pub lower_bin_id: Option<i32>,
    pub upper_bin_id: Option<i32>,
    #[serde(default)]
    pub liquidity_shares: Vec<String>,
}

impl TryFrom<UserPositionDto> for Position {
    type Error = ConversionError;

    fn try_from(raw: UserPositionDto) -> Result<Self, Self::Error> {
        let address: Pubkey = string_to_pubkey(
            raw.position
                .as_deref()
                .ok_or(ConversionError::MissingField("position"))?,
        )?;
        let position_mint = raw
            .position_mint
            .as_deref()
            .map(string_to_pubkey)
            .transpose()?;
        let lower_bin_id = raw
            .lower_bin_id
            .ok_or(ConversionError::MissingField("lowerBinId"))?;
        let upper_bin_id = raw
            .upper_bin_id
            .ok_or(ConversionError::MissingField("upperBinId"))?;

        if lower_bin_id > upper_bin_id {
            return Err(ConversionError::Inconsistent(format!(
                "position {}: lowerBinId {} > upperBinId {}",
                address, lower_bin_id, upper_bin_id
            )));
        }
        let expected = (i64::from(upper_bin_id) - i64::from(lower_bin_id) + 1) as usize;
        if raw.liquidity_shares.len() != expected {
            return Err(ConversionError::Inconsistent(format!(
                "position {}: {} liquidity shares for {} bins",
                address,
                raw.liquidity_shares.len(),
                expected
            )));
        }

        Ok(Position {
            address,
            position_mint,
            lower_bin_id,
            upper_bin_id,
            liquidity_shares: decode_liquidity_shares(&raw.liquidity_shares),
        })
    }
}

// Raw per-bin reserve information for a position (integer amounts as decimal strings)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinReserveDto {
    pub bin_id: Option<i32>,
    pub liquidity_share: Option<String>,
    pub total_supply: Option<String>,
    pub reserve_x: Option<String>,
    pub reserve_y: Option<String>,
}

impl TryFrom<BinReserveDto> for BinReserve {
    type Error = ConversionError;

    fn try_from(raw: BinReserveDto) -> Result<Self, Self::Error> {
        let parse = |v: &Option<String>| v.as_deref().map(amount_str_to_f64).unwrap_or(Ok(0.0));
        Ok(BinReserve {
            bin_id: raw.bin_id.unwrap_or_default(),
            liquidity_share: parse(&raw.liquidity_share)?,
            total_supply: parse(&raw.total_supply)?,
            reserve_x: parse(&raw.reserve_x)?,
            reserve_y: parse(&raw.reserve_y)?,
        })
    }
}
