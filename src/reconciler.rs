//! # Position Reconciler
//!
//! Synchronizes a wallet's positions between the chain and the position cache:
//!
//! 1. **Cache lookup**: cached rows for the wallet short-circuit the sync with no
//!    network calls.
//! 2. **Pool enumeration**: on a miss, every pool known to the store is visited
//!    in list order.
//! 3. **Per-pool fetch**: user positions for the pool, retried with backoff. A
//!    pool that still fails is logged and skipped.
//! 4. **Reserve attribution**: the position's share of each bin's reserves,
//!    `ratio = liquidityShare / totalSupply` (0 for an empty bin).
//! 5. **Upsert**: one row per position keyed by address.
//! 6. **Pacing**: every pool fetch start goes through the [`Pacer`].
//!
//! The wallet is only stamped as synced when at least one pool answered.
//!
//! A position is persisted whole or not at all; if its reserve fetch fails the
//! position is skipped while its siblings in the same pool are still written.

use crate::chain::DlmmChain;
use crate::error::{EngineError, Result};
use crate::metrics;
use crate::rate_limiter::Pacer;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::PositionStore;
use crate::types::{BinReserve, PoolRow, Position, PositionRow, PositionSummary, Pubkey, StoredPosition, WalletRecord};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncSource {
    Cache,
    Chain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub source: SyncSource,
    pub positions: Vec<PositionSummary>,
    /// `None` means the wallet has never been synchronized from chain.
    pub last_synced_at: Option<DateTime<Utc>>,
}

// What a single pool contributed to a chain pass
struct PoolSync {
    pool_address: Pubkey,
    fetched: bool,
    stored: Vec<StoredPosition>,
}

/// Token amounts owned by a position, summed over its bins.
pub fn attribute_reserves(reserves: &[BinReserve]) -> (f64, f64) {
    reserves.iter().fold((0.0, 0.0), |(base, quote), bin| {
        let ratio = bin.ownership_ratio();
        (base + bin.reserve_x * ratio, quote + bin.reserve_y * ratio)
    })
}

pub struct Reconciler {
    chain: Arc<dyn DlmmChain>,
    store: Arc<dyn PositionStore>,
    pacer: Arc<dyn Pacer>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        chain: Arc<dyn DlmmChain>,
        store: Arc<dyn PositionStore>,
        pacer: Arc<dyn Pacer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            chain,
            store,
            pacer,
            retry,
        }
    }

    /// Cache-first sync of `owner`'s positions.
    pub async fn sync_wallet(&self, owner: &Pubkey) -> Result<SyncOutcome> {
        let wallet = self.store.get_or_create_wallet(owner).await?;

        let cached = self.store.find_wallet_positions(wallet.id).await?;
        if !cached.is_empty() {
            info!("✅ Found {} cached positions for wallet {}", cached.len(), owner);
            metrics::increment_sync_cache_hit();
            let last_synced_at = match self.store.last_synced_at(wallet.id).await? {
                Some(at) => Some(at),
                None => cached.iter().map(|p| p.row.updated_at).max(),
            };
            return Ok(SyncOutcome {
                source: SyncSource::Cache,
                positions: cached.iter().map(PositionSummary::from).collect(),
                last_synced_at,
            });
        }

        let (stored, _, synced_at) = self.chain_pass(&wallet).await?;
        Ok(SyncOutcome {
            source: SyncSource::Chain,
            positions: stored.iter().map(PositionSummary::from).collect(),
            last_synced_at: synced_at,
        })
    }

    /// Forces a chain pass. Cached positions that a successfully fetched pool no
    /// longer reports are marked inactive.
    pub async fn refresh_wallet(&self, owner: &Pubkey) -> Result<SyncOutcome> {
        let wallet = self.store.get_or_create_wallet(owner).await?;
        let previous = self.store.find_wallet_positions(wallet.id).await?;

        let (stored, fetched_pools, synced_at) = self.chain_pass(&wallet).await?;

        let seen: HashSet<&Pubkey> = stored.iter().map(|p| &p.row.position_address).collect();
        for gone in previous.iter().filter(|p| {
            p.row.is_active
                && fetched_pools.contains(&p.pool_address)
                && !seen.contains(&p.row.position_address)
        }) {
            info!(
                "Position {} no longer reported in pool {}, marking inactive",
                gone.row.position_address, gone.pool_address
            );
            if let Err(e) = self.store.mark_position_inactive(&gone.row.position_address).await {
                warn!("⚠️ Failed to deactivate {}: {}", gone.row.position_address, e);
            }
        }

        let current = self.store.find_wallet_positions(wallet.id).await?;
        Ok(SyncOutcome {
            source: SyncSource::Chain,
            positions: current.iter().map(PositionSummary::from).collect(),
            last_synced_at: synced_at,
        })
    }

    // Returns the written rows, the pools that answered, and the sync timestamp
    async fn chain_pass(
        &self,
        wallet: &WalletRecord,
    ) -> Result<(Vec<StoredPosition>, HashSet<Pubkey>, Option<DateTime<Utc>>)> {
        let started = Instant::now();
        let pools = self.store.list_pools().await?;
        if pools.is_empty() {
            warn!("⚠️ No pools found in store; nothing to sync for {}", wallet.owner_address);
            let last = self.store.last_synced_at(wallet.id).await?;
            return Ok((Vec::new(), HashSet::new(), last));
        }

        info!(
            "⚙️ Syncing wallet {} across {} pools",
            wallet.owner_address,
            pools.len()
        );

        let pacer = &self.pacer;
        let in_flight = pools.len();
        let results: Vec<PoolSync> = stream::iter(pools.iter())
            .then(|pool| async move {
                pacer.pace().await;
                pool
            })
            .map(|pool| self.sync_pool(wallet, pool))
            .buffer_unordered(in_flight)
            .collect()
            .await;

        let mut stored = Vec::new();
        let mut fetched_pools = HashSet::new();
        for result in results {
            if result.fetched {
                fetched_pools.insert(result.pool_address);
            }
            stored.extend(result.stored);
        }

        metrics::increment_positions_upserted(stored.len() as u64);
        metrics::record_sync_duration(started.elapsed());

        if fetched_pools.is_empty() {
            warn!(
                "⚠️ None of {} pools answered for {}; keeping previous sync time",
                pools.len(),
                wallet.owner_address
            );
            let last = self.store.last_synced_at(wallet.id).await?;
            return Ok((stored, fetched_pools, last));
        }

        let synced_at = Utc::now();
        self.store.mark_wallet_synced(wallet.id, synced_at).await?;

        info!(
            "🎉 Synced {} positions for {} in {:?}",
            stored.len(),
            wallet.owner_address,
            started.elapsed()
        );
        Ok((stored, fetched_pools, Some(synced_at)))
    }

    async fn sync_pool(&self, wallet: &WalletRecord, pool: &PoolRow) -> PoolSync {
        let owner = &wallet.owner_address;
        let label = format!("get_user_positions({})", pool.pool_address);
        let raw = match with_retry(&self.retry, &label, || {
            self.chain.get_user_positions(owner, &pool.pool_address)
        })
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ Skipping pool {}: {}", pool.pool_address, e);
                metrics::increment_pool_fetch_failures();
                return PoolSync {
                    pool_address: pool.pool_address,
                    fetched: false,
                    stored: Vec::new(),
                };
            }
        };

        let positions: Vec<Position> = raw
            .into_iter()
            .filter_map(|dto| match Position::try_from(dto) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("⚠️ Dropping malformed position in pool {}: {}", pool.pool_address, e);
                    metrics::increment_position_skipped("malformed");
                    None
                }
            })
            .collect();

        let stored: Vec<StoredPosition> = join_all(
            positions
                .iter()
                .map(|position| self.attribute_and_store(wallet, pool, position)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        if !stored.is_empty() {
            debug!("💾 Saved {} positions from pool {}", stored.len(), pool.pool_address);
        }
        PoolSync {
            pool_address: pool.pool_address,
            fetched: true,
            stored,
        }
    }

    async fn attribute_and_store(
        &self,
        wallet: &WalletRecord,
        pool: &PoolRow,
        position: &Position,
    ) -> Option<StoredPosition> {
        match self.build_row(wallet, pool, position).await {
            Ok(row) => match self.store.upsert_position(&row).await {
                Ok(saved) => Some(StoredPosition {
                    row: saved,
                    pool_address: pool.pool_address,
                }),
                Err(e) => {
                    warn!("⚠️ Failed to persist position {}: {}", position.address, e);
                    metrics::increment_position_skipped("storage");
                    None
                }
            },
            Err(e) => {
                warn!("⚠️ Unable to attribute reserves for position {}: {}", position.address, e);
                metrics::increment_position_skipped("reserves");
                None
            }
        }
    }

    async fn build_row(&self, wallet: &WalletRecord, pool: &PoolRow, position: &Position) -> Result<PositionRow> {
        let label = format!("get_bins_reserve_information({})", position.address);
        let raw = with_retry(&self.retry, &label, || {
            self.chain
                .get_bins_reserve_information(&wallet.owner_address, &position.address, &pool.pool_address)
        })
        .await?;

        let reserves = raw
            .into_iter()
            .map(BinReserve::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(EngineError::from)?;
        let (token_base_amount, token_quote_amount) = attribute_reserves(&reserves);

        let now = Utc::now();
        Ok(PositionRow {
            position_address: position.address,
            wallet_id: wallet.id,
            pool_id: pool.id,
            lower_bin_id: position.lower_bin_id,
            upper_bin_id: position.upper_bin_id,
            liquidity_shares: position.share_values(),
            liquidity_amount: position.liquidity_amount(),
            token_base_amount,
            token_quote_amount,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(share: f64, supply: f64, x: f64, y: f64) -> BinReserve {
        BinReserve {
            bin_id: 0,
            liquidity_share: share,
            total_supply: supply,
            reserve_x: x,
            reserve_y: y,
        }
    }

    #[test]
    fn test_attribute_reserves_sums_owned_fraction() {
        let reserves = vec![bin(50.0, 100.0, 10.0, 20.0), bin(25.0, 100.0, 40.0, 0.0)];
        let (base, quote) = attribute_reserves(&reserves);
        assert!((base - 15.0).abs() < 1e-12);
        assert!((quote - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_bin_contributes_nothing() {
        let reserves = vec![bin(5.0, 0.0, 1_000.0, 1_000.0)];
        assert_eq!(attribute_reserves(&reserves), (0.0, 0.0));
    }
}
