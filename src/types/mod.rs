//! Core data types shared across the engine.
//!
//! Raw responses from the protocol SDK live in [`dex_data`] and are converted
//! into the validated types below with `TryFrom`.

pub mod conversions;
pub mod dex_data;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use solana_sdk::commitment_config::CommitmentLevel;
pub use solana_sdk::hash::Hash;
pub use solana_sdk::instruction::{AccountMeta, Instruction};
pub use solana_sdk::pubkey::Pubkey;
pub use solana_sdk::signature::Signature;

/// Pool row as stored by the seeding job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRow {
    pub id: i32,
    pub pool_address: Pubkey,
    pub token_base: Pubkey,
    pub token_quote: Pubkey,
    pub token_base_decimal: u8,
    pub token_quote_decimal: u8,
    pub base_reserve: String,
    pub quote_reserve: String,
    pub trade_fee: Option<f64>,
}

/// A pool with its live on-chain parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub id: i32,
    pub address: Pubkey,
    pub token_base: Pubkey,
    pub token_quote: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Fractional geometric increment between adjacent bins (25 bps = 0.0025).
    pub bin_step: f64,
    pub active_bin_id: i32,
    pub base_reserve: String,
    pub quote_reserve: String,
}

impl Pool {
    pub fn from_parts(row: &PoolRow, pair: &dex_data::PairState) -> Self {
        Self {
            id: row.id,
            address: row.pool_address,
            token_base: pair.token_mint_x,
            token_quote: pair.token_mint_y,
            base_decimals: row.token_base_decimal,
            quote_decimals: row.token_quote_decimal,
            bin_step: pair.bin_step_fraction(),
            active_bin_id: pair.active_bin_id,
            base_reserve: row.base_reserve.clone(),
            quote_reserve: row.quote_reserve.clone(),
        }
    }
}

/// One fixed-point liquidity share and its decoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityShare {
    pub raw: String,
    pub value: f64,
}

/// A validated on-chain position.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub address: Pubkey,
    pub position_mint: Option<Pubkey>,
    pub lower_bin_id: i32,
    pub upper_bin_id: i32,
    pub liquidity_shares: Vec<LiquidityShare>,
}

impl Position {
    pub fn bin_count(&self) -> usize {
        (self.upper_bin_id - self.lower_bin_id + 1) as usize
    }

    pub fn share_values(&self) -> Vec<f64> {
        self.liquidity_shares.iter().map(|s| s.value).collect()
    }

    pub fn liquidity_amount(&self) -> f64 {
        self.liquidity_shares.iter().map(|s| s.value).sum()
    }

    /// Key used by add-liquidity instructions; falls back to the position account.
    pub fn mint_or_address(&self) -> &Pubkey {
        self.position_mint.as_ref().unwrap_or(&self.address)
    }
}

/// Reserve information of one bin, scoped to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinReserve {
    pub bin_id: i32,
    pub liquidity_share: f64,
    pub total_supply: f64,
    pub reserve_x: f64,
    pub reserve_y: f64,
}

impl BinReserve {
    /// Fraction of the bin owned by the position; zero when the bin is empty.
    pub fn ownership_ratio(&self) -> f64 {
        if self.total_supply > 0.0 {
            self.liquidity_share / self.total_supply
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRecord {
    pub id: i32,
    pub owner_address: Pubkey,
}

/// Persisted position row, keyed by `position_address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    pub position_address: Pubkey,
    pub wallet_id: i32,
    pub pool_id: i32,
    pub lower_bin_id: i32,
    pub upper_bin_id: i32,
    pub liquidity_shares: Vec<f64>,
    pub liquidity_amount: f64,
    pub token_base_amount: f64,
    pub token_quote_amount: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A position row joined to its pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPosition {
    pub row: PositionRow,
    pub pool_address: Pubkey,
}

/// What a wallet sync hands back to callers.
///
/// An empty list together with `last_synced_at == None` means the wallet was never
/// synchronized; it does not mean "confirmed zero positions".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub position_address: Pubkey,
    pub pool_address: Pubkey,
    pub lower_bin_id: i32,
    pub upper_bin_id: i32,
    pub liquidity_amount: f64,
    pub token_base_amount: f64,
    pub token_quote_amount: f64,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<&StoredPosition> for PositionSummary {
    fn from(stored: &StoredPosition) -> Self {
        Self {
            position_address: stored.row.position_address,
            pool_address: stored.pool_address,
            lower_bin_id: stored.row.lower_bin_id,
            upper_bin_id: stored.row.upper_bin_id,
            liquidity_amount: stored.row.liquidity_amount,
            token_base_amount: stored.row.token_base_amount,
            token_quote_amount: stored.row.token_quote_amount,
            is_active: stored.row.is_active,
            last_synced_at: Some(stored.row.updated_at),
        }
    }
}
