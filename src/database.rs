use crate::types::conversions::string_to_pubkey;
use crate::types::{PoolRow, PositionRow, StoredPosition, WalletRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, Pool, Postgres, Row};
use std::env;
use std::time::Duration;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "dlmm";

const POSITION_COLUMNS: &str = "pos.position_address, pos.wallet_id, pos.pool_id, pos.lower_bin_id, \
     pos.upper_bin_id, pos.liquidity_shares, pos.liquidity_amount, pos.token_base_amount, \
     pos.token_quote_amount, pos.is_active, pos.created_at, pos.updated_at, p.pool_address";

pub async fn connect() -> Result<DbPool> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    connect_with_url(&database_url).await
}

pub async fn connect_with_url(database_url: &str) -> Result<DbPool> {
    // Bounded exponential backoff
    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                match initialize_database(&pool).await {
                    Ok(()) => return Ok(pool),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        let delay_ms = (1u64 << attempt.min(6)) * 200;
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x444C4D4D504F53; // "DLMMPOS"

    let mut tx = pool.begin().await?;

    log::info!("Acquiring database migration lock...");
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;

    create_tables(&mut tx).await?;

    tx.commit().await?;
    log::info!("Database initialization complete, transaction committed.");
    Ok(())
}

async fn create_tables(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    // Pools table; rows come from the seeding job
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.pools (
            id SERIAL PRIMARY KEY,
            pool_address VARCHAR(44) UNIQUE NOT NULL,
            token_base VARCHAR(44) NOT NULL,
            token_quote VARCHAR(44) NOT NULL,
            token_base_decimal SMALLINT NOT NULL DEFAULT 0,
            token_quote_decimal SMALLINT NOT NULL DEFAULT 0,
            base_reserve TEXT NOT NULL DEFAULT '0',
            quote_reserve TEXT NOT NULL DEFAULT '0',
            trade_fee DOUBLE PRECISION,
            created_at TIMESTAMPTZ DEFAULT NOW(),
            updated_at TIMESTAMPTZ DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.wallets (
            id SERIAL PRIMARY KEY,
            owner_address VARCHAR(44) UNIQUE NOT NULL,
            nickname VARCHAR(64),
            last_synced_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ DEFAULT NOW(),
            updated_at TIMESTAMPTZ DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {schema}.position (
            id SERIAL PRIMARY KEY,
            position_address VARCHAR(44) UNIQUE NOT NULL,
            wallet_id INTEGER NOT NULL REFERENCES {schema}.wallets(id),
            pool_id INTEGER NOT NULL REFERENCES {schema}.pools(id),
            lower_bin_id INTEGER NOT NULL,
            upper_bin_id INTEGER NOT NULL,
            liquidity_shares DOUBLE PRECISION[] NOT NULL DEFAULT '{{}}',
            liquidity_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
            token_base_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
            token_quote_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
            is_active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (lower_bin_id <= upper_bin_id)
        )",
        schema = SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_position_wallet ON {}.position(wallet_id)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_position_pool ON {}.position(pool_id)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    Ok(())
}

fn parse_address(row: &PgRow, column: &str) -> Result<crate::types::Pubkey> {
    let raw: String = row.try_get(column)?;
    string_to_pubkey(&raw)
        .with_context(|| format!("column {} holds an invalid address", column))
}

fn pool_from_row(row: &PgRow) -> Result<PoolRow> {
    let base_decimal: i16 = row.try_get("token_base_decimal")?;
    let quote_decimal: i16 = row.try_get("token_quote_decimal")?;
    Ok(PoolRow {
        id: row.try_get("id")?,
        pool_address: parse_address(row, "pool_address")?,
        token_base: parse_address(row, "token_base")?,
        token_quote: parse_address(row, "token_quote")?,
        token_base_decimal: u8::try_from(base_decimal).context("token_base_decimal out of range")?,
        token_quote_decimal: u8::try_from(quote_decimal).context("token_quote_decimal out of range")?,
        base_reserve: row.try_get("base_reserve")?,
        quote_reserve: row.try_get("quote_reserve")?,
        trade_fee: row.try_get("trade_fee")?,
    })
}

fn position_from_row(row: &PgRow) -> Result<PositionRow> {
    Ok(PositionRow {
        position_address: parse_address(row, "position_address")?,
        wallet_id: row.try_get("wallet_id")?,
        pool_id: row.try_get("pool_id")?,
        lower_bin_id: row.try_get("lower_bin_id")?,
        upper_bin_id: row.try_get("upper_bin_id")?,
        liquidity_shares: row.try_get("liquidity_shares")?,
        liquidity_amount: row.try_get("liquidity_amount")?,
        token_base_amount: row.try_get("token_base_amount")?,
        token_quote_amount: row.try_get("token_quote_amount")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn stored_from_row(row: &PgRow) -> Result<StoredPosition> {
    Ok(StoredPosition {
        row: position_from_row(row)?,
        pool_address: parse_address(row, "pool_address")?,
    })
}

pub async fn get_or_create_wallet(pool: &DbPool, owner_address: &str) -> Result<WalletRecord> {
    let row = sqlx::query(&format!(
        "INSERT INTO {}.wallets (owner_address, created_at, updated_at)
         VALUES ($1, NOW(), NOW())
         ON CONFLICT (owner_address) DO UPDATE SET updated_at = NOW()
         RETURNING id, owner_address",
        SCHEMA
    ))
    .bind(owner_address)
    .fetch_one(pool)
    .await?;

    Ok(WalletRecord {
        id: row.try_get("id")?,
        owner_address: parse_address(&row, "owner_address")?,
    })
}

pub async fn set_wallet_synced(pool: &DbPool, wallet_id: i32, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {}.wallets SET last_synced_at = $2, updated_at = NOW() WHERE id = $1",
        SCHEMA
    ))
    .bind(wallet_id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_wallet_last_synced(pool: &DbPool, wallet_id: i32) -> Result<Option<DateTime<Utc>>> {
    let row = sqlx::query(&format!(
        "SELECT last_synced_at FROM {}.wallets WHERE id = $1",
        SCHEMA
    ))
    .bind(wallet_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row.try_get("last_synced_at")?),
        None => Ok(None),
    }
}

pub async fn load_all_pools(pool: &DbPool) -> Result<Vec<PoolRow>> {
    let rows = sqlx::query(&format!(
        "SELECT id, pool_address, token_base, token_quote, token_base_decimal, token_quote_decimal,
                base_reserve, quote_reserve, trade_fee
         FROM {}.pools ORDER BY id",
        SCHEMA
    ))
    .fetch_all(pool)
    .await?;

    let mut pools = Vec::with_capacity(rows.len());
    for row in &rows {
        match pool_from_row(row) {
            Ok(p) => pools.push(p),
            Err(e) => log::warn!("Skipping malformed pool row: {:#}", e),
        }
    }
    Ok(pools)
}

pub async fn load_pool_by_address(pool: &DbPool, pool_address: &str) -> Result<Option<PoolRow>> {
    let row = sqlx::query(&format!(
        "SELECT id, pool_address, token_base, token_quote, token_base_decimal, token_quote_decimal,
                base_reserve, quote_reserve, trade_fee
         FROM {}.pools WHERE pool_address = $1",
        SCHEMA
    ))
    .bind(pool_address)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(pool_from_row).transpose()
}

pub async fn upsert_pool(pool: &DbPool, row: &PoolRow) -> Result<PoolRow> {
    let saved = sqlx::query(&format!(
        "INSERT INTO {}.pools (
            pool_address, token_base, token_quote, base_reserve, quote_reserve,
            trade_fee, token_base_decimal, token_quote_decimal, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
         ON CONFLICT (pool_address) DO UPDATE SET
            token_base = EXCLUDED.token_base,
            token_quote = EXCLUDED.token_quote,
            base_reserve = EXCLUDED.base_reserve,
            quote_reserve = EXCLUDED.quote_reserve,
            trade_fee = EXCLUDED.trade_fee,
            token_base_decimal = EXCLUDED.token_base_decimal,
            token_quote_decimal = EXCLUDED.token_quote_decimal,
            updated_at = NOW()
         RETURNING id, pool_address, token_base, token_quote, token_base_decimal, token_quote_decimal,
                   base_reserve, quote_reserve, trade_fee",
        SCHEMA
    ))
    .bind(row.pool_address.to_string())
    .bind(row.token_base.to_string())
    .bind(row.token_quote.to_string())
    .bind(&row.base_reserve)
    .bind(&row.quote_reserve)
    .bind(row.trade_fee)
    .bind(i16::from(row.token_base_decimal))
    .bind(i16::from(row.token_quote_decimal))
    .fetch_one(pool)
    .await?;

    pool_from_row(&saved)
}

/// Insert-or-update keyed by `position_address`. `created_at` survives updates.
pub async fn upsert_position(pool: &DbPool, position: &PositionRow) -> Result<PositionRow> {
    let row = sqlx::query(&format!(
        "INSERT INTO {}.position (
            position_address, wallet_id, pool_id,
            lower_bin_id, upper_bin_id,
            liquidity_shares, liquidity_amount,
            token_base_amount, token_quote_amount,
            is_active, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (position_address) DO UPDATE SET
            lower_bin_id = EXCLUDED.lower_bin_id,
            upper_bin_id = EXCLUDED.upper_bin_id,
            liquidity_shares = EXCLUDED.liquidity_shares,
            liquidity_amount = EXCLUDED.liquidity_amount,
            token_base_amount = EXCLUDED.token_base_amount,
            token_quote_amount = EXCLUDED.token_quote_amount,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at
         RETURNING position_address, wallet_id, pool_id, lower_bin_id, upper_bin_id,
                   liquidity_shares, liquidity_amount, token_base_amount, token_quote_amount,
                   is_active, created_at, updated_at",
        SCHEMA
    ))
    .bind(position.position_address.to_string())
    .bind(position.wallet_id)
    .bind(position.pool_id)
    .bind(position.lower_bin_id)
    .bind(position.upper_bin_id)
    .bind(&position.liquidity_shares)
    .bind(position.liquidity_amount)
    .bind(position.token_base_amount)
    .bind(position.token_quote_amount)
    .bind(position.is_active)
    .bind(position.created_at)
    .bind(position.updated_at)
    .fetch_one(pool)
    .await?;

    position_from_row(&row)
}

pub async fn set_position_inactive(pool: &DbPool, position_address: &str) -> Result<()> {
    let result = sqlx::query(&format!(
        "UPDATE {}.position SET is_active = false, updated_at = NOW() WHERE position_address = $1",
        SCHEMA
    ))
    .bind(position_address)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        log::debug!("No position row {} to deactivate", position_address);
    }
    Ok(())
}

pub async fn load_wallet_positions(pool: &DbPool, wallet_id: i32) -> Result<Vec<StoredPosition>> {
    let rows = sqlx::query(&format!(
        "SELECT {cols}
         FROM {schema}.position pos
         JOIN {schema}.pools p ON pos.pool_id = p.id
         WHERE pos.wallet_id = $1
         ORDER BY pos.created_at DESC",
        cols = POSITION_COLUMNS,
        schema = SCHEMA
    ))
    .bind(wallet_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(stored_from_row).collect()
}

pub async fn load_positions_by_pool(
    pool: &DbPool,
    owner_address: &str,
    pool_address: &str,
) -> Result<Vec<StoredPosition>> {
    let rows = sqlx::query(&format!(
        "SELECT {cols}
         FROM {schema}.position pos
         JOIN {schema}.pools p ON pos.pool_id = p.id
         JOIN {schema}.wallets w ON pos.wallet_id = w.id
         WHERE w.owner_address = $1
           AND p.pool_address = $2
         ORDER BY pos.created_at DESC",
        cols = POSITION_COLUMNS,
        schema = SCHEMA
    ))
    .bind(owner_address)
    .bind(pool_address)
    .fetch_all(pool)
    .await?;

    rows.iter().map(stored_from_row).collect()
}
