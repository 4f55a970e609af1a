//! Persistent position cache.
//!
//! [`PositionStore`] is what the reconciler and the engine see; [`PgPositionStore`]
//! backs it with the Postgres layer in [`crate::database`]. Rows are upserted by
//! unique address column, so concurrent syncs for different wallets never
//! duplicate or clobber each other's rows.

use crate::database::{self, DbPool};
use crate::error::Result;
use crate::types::{PoolRow, PositionRow, Pubkey, StoredPosition, WalletRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get_or_create_wallet(&self, owner: &Pubkey) -> Result<WalletRecord>;

    /// Cached positions of a wallet joined to their pool address.
    async fn find_wallet_positions(&self, wallet_id: i32) -> Result<Vec<StoredPosition>>;

    async fn list_pools(&self) -> Result<Vec<PoolRow>>;

    async fn find_pool(&self, pool: &Pubkey) -> Result<Option<PoolRow>>;

    async fn upsert_pool(&self, pool: &PoolRow) -> Result<PoolRow>;

    /// Insert or update keyed by position address; returns the stored row.
    async fn upsert_position(&self, row: &PositionRow) -> Result<PositionRow>;

    async fn mark_position_inactive(&self, position: &Pubkey) -> Result<()>;

    async fn positions_by_pool(&self, owner: &Pubkey, pool: &Pubkey) -> Result<Vec<StoredPosition>>;

    async fn last_synced_at(&self, wallet_id: i32) -> Result<Option<DateTime<Utc>>>;

    async fn mark_wallet_synced(&self, wallet_id: i32, at: DateTime<Utc>) -> Result<()>;
}

/// Postgres-backed store. Cloning shares the connection pool.
#[derive(Clone)]
pub struct PgPositionStore {
    pool: DbPool,
}

impl PgPositionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Connects using `DATABASE_URL` and bootstraps the schema.
    pub async fn connect() -> Result<Self> {
        Ok(Self::new(database::connect().await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn get_or_create_wallet(&self, owner: &Pubkey) -> Result<WalletRecord> {
        Ok(database::get_or_create_wallet(&self.pool, &owner.to_string()).await?)
    }

    async fn find_wallet_positions(&self, wallet_id: i32) -> Result<Vec<StoredPosition>> {
        Ok(database::load_wallet_positions(&self.pool, wallet_id).await?)
    }

    async fn list_pools(&self) -> Result<Vec<PoolRow>> {
        Ok(database::load_all_pools(&self.pool).await?)
    }

    async fn find_pool(&self, pool: &Pubkey) -> Result<Option<PoolRow>> {
        Ok(database::load_pool_by_address(&self.pool, &pool.to_string()).await?)
    }

    async fn upsert_pool(&self, pool: &PoolRow) -> Result<PoolRow> {
        Ok(database::upsert_pool(&self.pool, pool).await?)
    }

    async fn upsert_position(&self, row: &PositionRow) -> Result<PositionRow> {
        Ok(database::upsert_position(&self.pool, row).await?)
    }

    async fn mark_position_inactive(&self, position: &Pubkey) -> Result<()> {
        Ok(database::set_position_inactive(&self.pool, &position.to_string()).await?)
    }

    async fn positions_by_pool(&self, owner: &Pubkey, pool: &Pubkey) -> Result<Vec<StoredPosition>> {
        Ok(database::load_positions_by_pool(&self.pool, &owner.to_string(), &pool.to_string()).await?)
    }

    async fn last_synced_at(&self, wallet_id: i32) -> Result<Option<DateTime<Utc>>> {
        Ok(database::get_wallet_last_synced(&self.pool, wallet_id).await?)
    }

    async fn mark_wallet_synced(&self, wallet_id: i32, at: DateTime<Utc>) -> Result<()> {
        Ok(database::set_wallet_synced(&self.pool, wallet_id, at).await?)
    }
}
