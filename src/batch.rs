//! # Transaction Batch Builder
//!
//! Turns a liquidity deposit request into at most three ordered phases:
//!
//! 1. **Account preparation**: idempotent "ensure exists" instructions for bin
//!    arrays and vaults, plus a native SOL wrap when one side is wrapped SOL, packed into as few transactions as the per-transaction
//!    instruction limit allows.
//! 2. **Create position**: one transaction per position window that has no
//!    position yet, signed by the wallet and a fresh position key.
//! 3. **Add liquidity**: one wallet-signed transaction per window.
//!
//! Phases with no transactions are left out of the plan. Nothing here signs or
//! sends; see [`crate::submitter`].

use crate::bin_array::{bin_array_pairs, find_bin_array_pair, position_windows, windows_span, BinArrayPair, PositionWindow};
use crate::chain::{AddLiquidityParams, CreatePositionParams, DlmmChain, NATIVE_MINT};
use crate::distribution::{compute_distribution, select_sub_range, to_base_units, BinAllocation, BinRange, Strategy};
use crate::error::{EngineError, Result};
use crate::settings::BatchSettings;
use crate::signer::{KeyGenerator, SharedSigner, Signer};
use crate::types::{Pubkey, Instruction, Pool, Position};
use futures::future::try_join_all;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// Distribution weights are computed as percentages of the deposit
const DISTRIBUTION_TOTAL: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    AccountPreparation,
    CreatePosition,
    AddLiquidity,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AccountPreparation => "account_preparation",
            Phase::CreatePosition => "create_position",
            Phase::AddLiquidity => "add_liquidity",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI amounts of each token to deposit across the whole range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiquidityAmounts {
    pub amount_x: Decimal,
    pub amount_y: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityRequest {
    /// Absolute bin ids to fund
    pub range: BinRange,
    pub strategy: Strategy,
    pub amounts: LiquidityAmounts,
}

/// An unsigned transaction: instructions plus the keys that must sign it.
#[derive(Clone)]
pub struct PlannedTransaction {
    pub phase: Phase,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub signers: Vec<SharedSigner>,
}

impl fmt::Debug for PlannedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedTransaction")
            .field("phase", &self.phase)
            .field("label", &self.label)
            .field("instructions", &self.instructions.len())
            .field(
                "signers",
                &self.signers.iter().map(|s| s.pubkey()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub phase: Phase,
    pub transactions: Vec<PlannedTransaction>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub fee_payer: Option<Pubkey>,
    pub phases: Vec<PhasePlan>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn transaction_count(&self) -> usize {
        self.phases.iter().map(|p| p.transactions.len()).sum()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhasePlan> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

// Per-window outcome of the planning pass
struct WindowPlan {
    create: Option<PlannedTransaction>,
    add: PlannedTransaction,
}

pub struct BatchPlanner {
    chain: Arc<dyn DlmmChain>,
    wallet: SharedSigner,
    keys: Arc<dyn KeyGenerator>,
    settings: BatchSettings,
}

impl BatchPlanner {
    pub fn new(
        chain: Arc<dyn DlmmChain>,
        wallet: SharedSigner,
        keys: Arc<dyn KeyGenerator>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            chain,
            wallet,
            keys,
            settings,
        }
    }

    /// Builds the phased plan for `request` against `pool`.
    ///
    /// `existing` are the wallet's on-chain positions in this pool; a window whose
    /// bounds match one of them gets liquidity without a create-position step.
    pub async fn plan(&self, pool: &Pool, request: &LiquidityRequest, existing: &[Position]) -> Result<BatchPlan> {
        let active = pool.active_bin_id;
        let windows = position_windows(
            request.range.relative_to(active),
            active,
            self.settings.position_width,
        )?;
        let span = windows_span(&windows)
            .ok_or_else(|| EngineError::validation("bin range produced no position windows"))?;
        let pairs = bin_array_pairs(span, self.settings.bin_array_size);
        let distribution = compute_distribution(request.strategy, request.range, active, DISTRIBUTION_TOTAL)?;

        debug!(
            "Planning {} windows over [{}, {}] for pool {}",
            windows.len(),
            span.lower,
            span.upper,
            pool.address
        );

        let preparation = self.preparation_instructions(pool, request, &pairs).await?;
        let window_plans = try_join_all(
            windows
                .iter()
                .map(|w| self.plan_window(pool, request, *w, &pairs, &distribution, existing)),
        )
        .await?;

        let mut creates = Vec::new();
        let mut adds = Vec::with_capacity(window_plans.len());
        for plan in window_plans {
            creates.extend(plan.create);
            adds.push(plan.add);
        }

        let prep_txs: Vec<PlannedTransaction> = preparation
            .chunks(self.settings.max_instructions_per_transaction.max(1))
            .enumerate()
            .map(|(i, chunk)| PlannedTransaction {
                phase: Phase::AccountPreparation,
                label: format!("prepare-{}", i),
                instructions: chunk.to_vec(),
                signers: vec![self.wallet.clone()],
            })
            .collect();

        let phases = [
            (Phase::AccountPreparation, prep_txs),
            (Phase::CreatePosition, creates),
            (Phase::AddLiquidity, adds),
        ]
        .into_iter()
        .filter(|(_, txs)| !txs.is_empty())
        .map(|(phase, transactions)| PhasePlan { phase, transactions })
        .collect();

        Ok(BatchPlan {
            fee_payer: Some(self.wallet.pubkey()),
            phases,
        })
    }

    async fn preparation_instructions(
        &self,
        pool: &Pool,
        request: &LiquidityRequest,
        pairs: &[BinArrayPair],
    ) -> Result<Vec<Instruction>> {
        let payer = self.wallet.pubkey();
        let indices: BTreeSet<i32> = pairs.iter().flat_map(|p| [p.lower_index, p.upper_index]).collect();

        let bin_arrays = try_join_all(
            indices
                .iter()
                .map(|index| self.chain.prepare_bin_array(&pool.address, &payer, *index)),
        );
        let pair_vaults = try_join_all(
            [&pool.token_base, &pool.token_quote]
                .into_iter()
                .map(|mint| self.chain.prepare_pair_vault(&pool.address, &payer, mint)),
        );
        let user_vaults = try_join_all(
            [&pool.token_base, &pool.token_quote]
                .into_iter()
                .map(|mint| self.chain.prepare_user_vault(&payer, mint)),
        );
        let (bin_arrays, pair_vaults, user_vaults) = futures::try_join!(bin_arrays, pair_vaults, user_vaults)?;

        let mut instructions: Vec<Instruction> = Vec::new();
        for ix in bin_arrays.into_iter().chain(pair_vaults).chain(user_vaults).flatten() {
            if !instructions.contains(&ix) {
                instructions.push(ix);
            }
        }

        // Wrap after the user vaults so the wrapped-SOL account exists
        let lamports = native_lamports(pool, &request.amounts)?;
        if lamports > 0 {
            debug!("Wrapping {} lamports for pool {}", lamports, pool.address);
            instructions.extend(self.chain.prepare_native_wrap(&payer, lamports).await?);
        }
        Ok(instructions)
    }

    async fn plan_window(
        &self,
        pool: &Pool,
        request: &LiquidityRequest,
        window: PositionWindow,
        pairs: &[BinArrayPair],
        distribution: &[BinAllocation],
        existing: &[Position],
    ) -> Result<WindowPlan> {
        let payer = self.wallet.pubkey();
        let pair = find_bin_array_pair(pairs, window.absolute, self.settings.bin_array_size)?;
        let (bin_array_lower, bin_array_upper) = futures::try_join!(
            self.chain.get_bin_array(&pool.address, pair.lower_index),
            self.chain.get_bin_array(&pool.address, pair.upper_index),
        )?;

        let current = existing
            .iter()
            .find(|p| p.lower_bin_id == window.absolute.lower && p.upper_bin_id == window.absolute.upper);

        let (position_mint, create) = match current {
            Some(position) => (*position.mint_or_address(), None),
            None => {
                let key = self.keys.generate()?;
                let mint = key.pubkey();
                let ix = self
                    .chain
                    .create_position_instruction(&CreatePositionParams {
                        pair: pool.address,
                        payer,
                        position_mint: mint,
                        relative_bin_id_left: window.relative.0,
                        relative_bin_id_right: window.relative.1,
                        bin_array_index: pair.lower_index,
                    })
                    .await?;
                let tx = PlannedTransaction {
                    phase: Phase::CreatePosition,
                    label: format!("create-{}..{}", window.absolute.lower, window.absolute.upper),
                    instructions: vec![ix],
                    signers: vec![self.wallet.clone(), key],
                };
                (mint, Some(tx))
            }
        };

        let slice = select_sub_range(distribution, window.relative.0, window.relative.1);
        let (share_x, share_y) = window_shares(distribution, &slice);
        let amount_x = scaled_amount(request.amounts.amount_x, share_x, pool.base_decimals)?;
        let amount_y = scaled_amount(request.amounts.amount_y, share_y, pool.quote_decimals)?;

        let ix = self
            .chain
            .add_liquidity_instruction(&AddLiquidityParams {
                pair: pool.address,
                payer,
                position_mint,
                bin_array_lower,
                bin_array_upper,
                amount_x,
                amount_y,
                distribution: slice,
            })
            .await?;

        Ok(WindowPlan {
            create,
            add: PlannedTransaction {
                phase: Phase::AddLiquidity,
                label: format!("add-{}..{}", window.absolute.lower, window.absolute.upper),
                instructions: vec![ix],
                signers: vec![self.wallet.clone()],
            },
        })
    }
}

/// Fraction of the full distribution's X and Y weight that falls in `slice`.
fn window_shares(distribution: &[BinAllocation], slice: &[BinAllocation]) -> (f64, f64) {
    let ratio = |part: f64, whole: f64| if whole > 0.0 { part / whole } else { 0.0 };
    let total_x: f64 = distribution.iter().map(|d| d.x_amount).sum();
    let total_y: f64 = distribution.iter().map(|d| d.y_amount).sum();
    let slice_x: f64 = slice.iter().map(|d| d.x_amount).sum();
    let slice_y: f64 = slice.iter().map(|d| d.y_amount).sum();
    (ratio(slice_x, total_x), ratio(slice_y, total_y))
}

/// Lamports to wrap: the full deposit of whichever side is wrapped SOL.
fn native_lamports(pool: &Pool, amounts: &LiquidityAmounts) -> Result<u64> {
    let mut lamports = 0u64;
    if pool.token_base == NATIVE_MINT {
        lamports += to_base_units(amounts.amount_x, pool.base_decimals)?;
    }
    if pool.token_quote == NATIVE_MINT {
        lamports += to_base_units(amounts.amount_y, pool.quote_decimals)?;
    }
    Ok(lamports)
}

fn scaled_amount(amount: Decimal, share: f64, decimals: u8) -> Result<u64> {
    let share = Decimal::from_f64(share)
        .ok_or_else(|| EngineError::validation(format!("invalid window share {}", share)))?;
    to_base_units(amount * share, decimals)
}
