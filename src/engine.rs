//! Public entry point wiring the chain client, the position store, and the
//! batch machinery together.

use crate::batch::{BatchPlanner, LiquidityRequest};
use crate::chain::DlmmChain;
use crate::distribution::{self, BinAllocation, BinRange, Strategy};
use crate::error::{EngineError, Result};
use crate::rate_limiter::{pacer_from_settings, Pacer};
use crate::reconciler::{Reconciler, SyncOutcome};
use crate::retry::{with_retry, RetryPolicy};
use crate::settings::Settings;
use crate::signer::{KeyGenerator, SharedSigner, Signer};
use crate::store::PositionStore;
use crate::submitter::BatchSubmitter;
use crate::types::dex_data::PairState;
use crate::types::{Pubkey, Pool, Position, PositionSummary, Signature};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct PositionEngine {
    chain: Arc<dyn DlmmChain>,
    store: Arc<dyn PositionStore>,
    keys: Arc<dyn KeyGenerator>,
    reconciler: Reconciler,
    submitter: BatchSubmitter,
    retry: RetryPolicy,
    settings: Settings,
}

impl PositionEngine {
    pub fn new(
        chain: Arc<dyn DlmmChain>,
        store: Arc<dyn PositionStore>,
        keys: Arc<dyn KeyGenerator>,
        settings: Settings,
    ) -> Result<Self> {
        let pacer = pacer_from_settings(&settings.sync)?;
        Ok(Self::with_pacer(chain, store, keys, pacer, settings))
    }

    pub fn with_pacer(
        chain: Arc<dyn DlmmChain>,
        store: Arc<dyn PositionStore>,
        keys: Arc<dyn KeyGenerator>,
        pacer: Arc<dyn Pacer>,
        settings: Settings,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&settings.retry);
        Self {
            reconciler: Reconciler::new(chain.clone(), store.clone(), pacer, retry),
            submitter: BatchSubmitter::new(chain.clone(), settings.rpc.commitment, retry),
            chain,
            store,
            keys,
            retry,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn sync_wallet_positions(&self, wallet: &Pubkey) -> Result<Vec<PositionSummary>> {
        Ok(self.reconciler.sync_wallet(wallet).await?.positions)
    }

    /// Like [`Self::sync_wallet_positions`] but also reports where the data came
    /// from and when the wallet was last synchronized.
    pub async fn sync_wallet(&self, wallet: &Pubkey) -> Result<SyncOutcome> {
        self.reconciler.sync_wallet(wallet).await
    }

    pub async fn refresh_wallet_positions(&self, wallet: &Pubkey) -> Result<SyncOutcome> {
        self.reconciler.refresh_wallet(wallet).await
    }

    pub async fn wallet_pool_positions(&self, wallet: &Pubkey, pool: &Pubkey) -> Result<Vec<PositionSummary>> {
        let stored = self.store.positions_by_pool(wallet, pool).await?;
        Ok(stored.iter().map(PositionSummary::from).collect())
    }

    pub async fn last_synced_at(&self, wallet: &Pubkey) -> Result<Option<DateTime<Utc>>> {
        let record = self.store.get_or_create_wallet(wallet).await?;
        self.store.last_synced_at(record.id).await
    }

    pub fn compute_distribution(
        &self,
        strategy: &str,
        range: BinRange,
        active_bin_id: i32,
        total_amount: f64,
    ) -> Result<Vec<BinAllocation>> {
        let strategy: Strategy = strategy.parse()?;
        distribution::compute_distribution(strategy, range, active_bin_id, total_amount)
    }

    /// Plans and submits a deposit into `pool`.
    ///
    /// Returns confirmed signatures in submission order. An unknown pool yields
    /// an empty list.
    pub async fn submit_liquidity_batch(
        &self,
        wallet: SharedSigner,
        pool: &Pubkey,
        request: &LiquidityRequest,
    ) -> Result<Vec<Signature>> {
        let run_id = Uuid::new_v4();
        let span = info_span!("liquidity_batch", %run_id, pool = %pool);

        async move {
            let Some(row) = self.store.find_pool(pool).await? else {
                warn!("Pool {} not found in store, nothing to submit", pool);
                return Ok(Vec::new());
            };

            let pair = with_retry(&self.retry, "get_pair_account", || self.chain.get_pair_account(pool)).await?;
            let pair = PairState::try_from(pair).map_err(EngineError::from)?;
            let pool_state = Pool::from_parts(&row, &pair);

            let owner = wallet.pubkey();
            let existing: Vec<Position> = with_retry(&self.retry, "get_user_positions", || {
                self.chain.get_user_positions(&owner, pool)
            })
            .await?
            .into_iter()
            .filter_map(|dto| match Position::try_from(dto) {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!("Skipping malformed position of {} in pool {}: {}", owner, pool, e);
                    None
                }
            })
            .collect();

            let planner = BatchPlanner::new(
                self.chain.clone(),
                wallet.clone(),
                self.keys.clone(),
                self.settings.batch.clone(),
            );
            let plan = planner.plan(&pool_state, request, &existing).await?;
            if plan.is_empty() {
                info!("Nothing to submit for pool {}", pool);
                return Ok(Vec::new());
            }

            info!(
                "Submitting {} transactions in {} phases",
                plan.transaction_count(),
                plan.phases.len()
            );
            self.submitter.submit(&plan, run_id).await.into_result()
        }
        .instrument(span)
        .await
    }
}
