//! # Chain Client Trait
//!
//! The engine never talks to an RPC node directly. Everything it needs from the
//! blockchain and from the DLMM protocol SDK goes through [`DlmmChain`], which is
//! injected into the reconciler and the batch runner at construction time.
//!
//! Reads return the raw DTOs from [`crate::types::dex_data`]; validation into
//! domain types happens on the engine side so a misbehaving SDK cannot push
//! malformed state past the boundary.
//!
//! Implementations should map timeouts, connection resets and rate-limit
//! responses to [`crate::error::EngineError::TransientNetwork`]; only those are
//! retried.

use crate::error::Result;
use crate::submitter::BlockhashEpoch;
use crate::types::dex_data::{BinReserveDto, PairAccountDto, UserPositionDto};
use crate::types::{CommitmentLevel, Instruction, Pubkey, Signature};
use crate::distribution::BinAllocation;
use async_trait::async_trait;

/// Mint of wrapped SOL; deposits on this side are funded from the native balance.
pub const NATIVE_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

/// Terminal answer of a confirmation wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    /// Landed but the program returned an error.
    Failed(String),
    /// The blockhash expired before the transaction was seen.
    Expired,
}

/// Parameters of a create-position instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePositionParams {
    pub pair: Pubkey,
    pub payer: Pubkey,
    pub position_mint: Pubkey,
    pub relative_bin_id_left: i32,
    pub relative_bin_id_right: i32,
    pub bin_array_index: i32,
}

/// Parameters of an add-liquidity instruction. Amounts are integer base units.
#[derive(Debug, Clone, PartialEq)]
pub struct AddLiquidityParams {
    pub pair: Pubkey,
    pub payer: Pubkey,
    pub position_mint: Pubkey,
    pub bin_array_lower: Pubkey,
    pub bin_array_upper: Pubkey,
    pub amount_x: u64,
    pub amount_y: u64,
    pub distribution: Vec<BinAllocation>,
}

#[async_trait]
pub trait DlmmChain: Send + Sync {
    /// Recent blockhash and the last block height at which it is valid.
    async fn get_latest_blockhash(&self) -> Result<BlockhashEpoch>;

    async fn get_block_height(&self) -> Result<u64>;

    async fn send_raw_transaction(&self, bytes: Vec<u8>) -> Result<Signature>;

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        epoch: &BlockhashEpoch,
        commitment: CommitmentLevel,
    ) -> Result<ConfirmationOutcome>;

    async fn get_pair_account(&self, pair: &Pubkey) -> Result<PairAccountDto>;

    async fn get_user_positions(&self, owner: &Pubkey, pair: &Pubkey) -> Result<Vec<UserPositionDto>>;

    /// Pubkey of the bin-array account at `index` for `pair`.
    async fn get_bin_array(&self, pair: &Pubkey, index: i32) -> Result<Pubkey>;

    async fn get_bins_reserve_information(
        &self,
        owner: &Pubkey,
        position: &Pubkey,
        pair: &Pubkey,
    ) -> Result<Vec<BinReserveDto>>;

    /// `None` when the bin array already exists on chain.
    async fn prepare_bin_array(&self, pair: &Pubkey, payer: &Pubkey, index: i32) -> Result<Option<Instruction>>;

    async fn prepare_pair_vault(&self, pair: &Pubkey, payer: &Pubkey, mint: &Pubkey) -> Result<Option<Instruction>>;

    async fn prepare_user_vault(&self, payer: &Pubkey, mint: &Pubkey) -> Result<Option<Instruction>>;

    /// Moves `lamports` from the payer's native balance into its wrapped-SOL
    /// account and syncs it. Empty when the wrapped balance already covers it.
    async fn prepare_native_wrap(&self, payer: &Pubkey, lamports: u64) -> Result<Vec<Instruction>>;

    async fn create_position_instruction(&self, params: &CreatePositionParams) -> Result<Instruction>;

    async fn add_liquidity_instruction(&self, params: &AddLiquidityParams) -> Result<Instruction>;
}
