//! Shared test doubles: an in-memory chain, an in-memory position store, and
//! deterministic signers.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dlmm_position_sdk::chain::{AddLiquidityParams, ConfirmationOutcome, CreatePositionParams, DlmmChain};
use dlmm_position_sdk::error::{EngineError, Result};
use dlmm_position_sdk::signer::{KeyGenerator, Keypair, SharedSigner, Transaction};
use dlmm_position_sdk::store::PositionStore;
use dlmm_position_sdk::submitter::BlockhashEpoch;
use dlmm_position_sdk::types::dex_data::{BinReserveDto, PairAccountDto, UserPositionDto};
use dlmm_position_sdk::types::{
    AccountMeta, CommitmentLevel, Hash, Instruction, PoolRow, PositionRow, Pubkey, Signature, StoredPosition,
    WalletRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Deterministic account key unique per `(label, n)`.
pub fn address(label: &str, n: u32) -> Pubkey {
    let mut bytes = [0u8; 32];
    for (slot, b) in bytes.iter_mut().zip(label.bytes().take(28)) {
        *slot = b;
    }
    bytes[28..].copy_from_slice(&n.to_le_bytes());
    Pubkey::new_from_array(bytes)
}

/// Blockhash handed out by the `n`-th `get_latest_blockhash` call (1-based).
pub fn blockhash(n: usize) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&(n as u64).to_le_bytes());
    Hash::new_from_array(bytes)
}

/// `2^64 * value` as a hex string.
pub fn q64(value: u64) -> String {
    format!("{:x}", u128::from(value) << 64)
}

pub fn pool_row(id: i32) -> PoolRow {
    PoolRow {
        id,
        pool_address: address("Poo", id as u32),
        token_base: address("BaseMint", id as u32),
        token_quote: address("QuoteMint", id as u32),
        token_base_decimal: 6,
        token_quote_decimal: 9,
        base_reserve: "1000000000".to_string(),
        quote_reserve: "2000000000000".to_string(),
        trade_fee: Some(0.0025),
    }
}

pub fn position_dto(position: &Pubkey, lower: i32, shares: &[u64]) -> UserPositionDto {
    UserPositionDto {
        position: Some(position.to_string()),
        position_mint: Some(address("Mint", lower.unsigned_abs())).map(|a| a.to_string()),
        lower_bin_id: Some(lower),
        upper_bin_id: Some(lower + shares.len() as i32 - 1),
        liquidity_shares: shares.iter().map(|s| q64(*s)).collect(),
    }
}

pub fn reserve_dto(bin_id: i32, share: u64, supply: u64, x: u64, y: u64) -> BinReserveDto {
    BinReserveDto {
        bin_id: Some(bin_id),
        liquidity_share: Some(share.to_string()),
        total_supply: Some(supply.to_string()),
        reserve_x: Some(x.to_string()),
        reserve_y: Some(y.to_string()),
    }
}

#[derive(Default)]
pub struct CallCounters {
    pub user_positions: AtomicUsize,
    pub reserves: AtomicUsize,
    pub pair_accounts: AtomicUsize,
    pub blockhashes: AtomicUsize,
    pub sends: AtomicUsize,
    pub confirms: AtomicUsize,
}

impl CallCounters {
    pub fn network_fetches(&self) -> usize {
        self.user_positions.load(Ordering::SeqCst)
            + self.reserves.load(Ordering::SeqCst)
            + self.pair_accounts.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ChainState {
    pairs: HashMap<Pubkey, PairAccountDto>,
    positions: HashMap<(Pubkey, Pubkey), Vec<UserPositionDto>>,
    reserves: HashMap<Pubkey, Vec<BinReserveDto>>,
    // Remaining transient failures per pool; u32::MAX never recovers
    failing_pools: HashMap<Pubkey, u32>,
    failing_reserves: HashSet<Pubkey>,
    existing_bin_arrays: HashSet<i32>,
    vaults_exist: bool,
    block_height: u64,
    expire_first_epoch: bool,
    failing_confirms: HashSet<usize>,
    expiring_confirms: HashSet<usize>,
    failing_sends: HashSet<usize>,
    wrapped_lamports: u64,
    sent: Vec<Transaction>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    pub calls: CallCounters,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(&self, pair: &Pubkey, active_id: i32, bin_step_bps: u16, mint_x: &Pubkey, mint_y: &Pubkey) {
        self.state.lock().unwrap().pairs.insert(
            *pair,
            PairAccountDto {
                active_id: Some(active_id),
                bin_step: Some(bin_step_bps),
                token_mint_x: Some(mint_x.to_string()),
                token_mint_y: Some(mint_y.to_string()),
            },
        );
    }

    pub fn with_positions(&self, owner: &Pubkey, pool: &Pubkey, positions: Vec<UserPositionDto>) {
        self.state
            .lock()
            .unwrap()
            .positions
            .insert((*owner, *pool), positions);
    }

    pub fn with_reserves(&self, position: &Pubkey, reserves: Vec<BinReserveDto>) {
        self.state.lock().unwrap().reserves.insert(*position, reserves);
    }

    pub fn fail_pool(&self, pool: &Pubkey, times: u32) {
        self.state.lock().unwrap().failing_pools.insert(*pool, times);
    }

    pub fn fail_reserves(&self, position: &Pubkey) {
        self.state.lock().unwrap().failing_reserves.insert(*position);
    }

    pub fn with_existing_accounts(&self, bin_arrays: &[i32], vaults: bool) {
        let mut state = self.state.lock().unwrap();
        state.existing_bin_arrays.extend(bin_arrays.iter().copied());
        state.vaults_exist = vaults;
    }

    pub fn expire_first_epoch(&self) {
        let mut state = self.state.lock().unwrap();
        state.expire_first_epoch = true;
        state.block_height = 10;
    }

    /// Confirmation of the `index`-th sent transaction (0-based) fails on chain.
    pub fn fail_confirmation(&self, index: usize) {
        self.state.lock().unwrap().failing_confirms.insert(index);
    }

    /// The blockhash of the `index`-th sent transaction expires before it lands.
    pub fn expire_confirmation(&self, index: usize) {
        self.state.lock().unwrap().expiring_confirms.insert(index);
    }

    /// The `index`-th send attempt (0-based) is rejected by the node.
    pub fn fail_send(&self, index: usize) {
        self.state.lock().unwrap().failing_sends.insert(index);
    }

    /// Wrapped-SOL balance the payer already holds.
    pub fn with_wrapped_balance(&self, lamports: u64) {
        self.state.lock().unwrap().wrapped_lamports = lamports;
    }

    /// Transactions accepted by `send_raw_transaction`, decoded from their wire bytes.
    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_signatures(&self) -> Vec<Signature> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|tx| tx.signatures[0])
            .collect()
    }
}

fn marker(tag: &str) -> Instruction {
    marker_signed_by(tag, None)
}

fn marker_signed_by(tag: &str, signer: Option<Pubkey>) -> Instruction {
    let accounts = signer
        .map(|key| vec![AccountMeta::new(key, true)])
        .unwrap_or_default();
    Instruction::new_with_bytes(address("Program", 1), tag.as_bytes(), accounts)
}

#[async_trait]
impl DlmmChain for MockChain {
    async fn get_latest_blockhash(&self) -> Result<BlockhashEpoch> {
        let n = self.calls.blockhashes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        let last_valid = if state.expire_first_epoch && n == 1 {
            0
        } else {
            state.block_height + 150
        };
        state.block_height += 1;
        Ok(BlockhashEpoch::new(blockhash(n), last_valid))
    }

    async fn get_block_height(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().block_height)
    }

    async fn send_raw_transaction(&self, bytes: Vec<u8>) -> Result<Signature> {
        let n = self.calls.sends.fetch_add(1, Ordering::SeqCst);
        let tx: Transaction = bincode::deserialize(&bytes).unwrap();
        assert!(tx.verify().is_ok(), "submitted transaction carries invalid signatures");
        let mut state = self.state.lock().unwrap();
        if state.failing_sends.contains(&n) {
            return Err(EngineError::transient("send_raw_transaction", "node is behind"));
        }
        let signature = tx.signatures[0];
        state.sent.push(tx);
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        _epoch: &BlockhashEpoch,
        commitment: CommitmentLevel,
    ) -> Result<ConfirmationOutcome> {
        self.calls.confirms.fetch_add(1, Ordering::SeqCst);
        assert_eq!(commitment, CommitmentLevel::Finalized);
        let state = self.state.lock().unwrap();
        let index = state
            .sent
            .iter()
            .position(|tx| &tx.signatures[0] == signature)
            .expect("confirming a signature that was never sent");
        if state.failing_confirms.contains(&index) {
            return Ok(ConfirmationOutcome::Failed("custom program error: 0x1".into()));
        }
        if state.expiring_confirms.contains(&index) {
            return Ok(ConfirmationOutcome::Expired);
        }
        Ok(ConfirmationOutcome::Confirmed)
    }

    async fn get_pair_account(&self, pair: &Pubkey) -> Result<PairAccountDto> {
        self.calls.pair_accounts.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .pairs
            .get(pair)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                kind: "pair",
                address: *pair,
            })
    }

    async fn get_user_positions(&self, owner: &Pubkey, pair: &Pubkey) -> Result<Vec<UserPositionDto>> {
        self.calls.user_positions.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.failing_pools.get_mut(pair) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(EngineError::transient("get_user_positions", "connection reset"));
            }
        }
        Ok(state
            .positions
            .get(&(*owner, *pair))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_bin_array(&self, pair: &Pubkey, index: i32) -> Result<Pubkey> {
        let _ = pair;
        Ok(address("BinArray", index.unsigned_abs()))
    }

    async fn get_bins_reserve_information(
        &self,
        _owner: &Pubkey,
        position: &Pubkey,
        _pair: &Pubkey,
    ) -> Result<Vec<BinReserveDto>> {
        self.calls.reserves.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.failing_reserves.contains(position) {
            return Err(EngineError::transient("get_bins_reserve_information", "timeout"));
        }
        Ok(state.reserves.get(position).cloned().unwrap_or_default())
    }

    async fn prepare_bin_array(&self, _pair: &Pubkey, _payer: &Pubkey, index: i32) -> Result<Option<Instruction>> {
        let state = self.state.lock().unwrap();
        if state.existing_bin_arrays.contains(&index) {
            return Ok(None);
        }
        Ok(Some(marker(&format!("init-bin-array:{}", index))))
    }

    async fn prepare_pair_vault(&self, _pair: &Pubkey, _payer: &Pubkey, mint: &Pubkey) -> Result<Option<Instruction>> {
        if self.state.lock().unwrap().vaults_exist {
            return Ok(None);
        }
        Ok(Some(marker(&format!("init-pair-vault:{}", mint))))
    }

    async fn prepare_user_vault(&self, _payer: &Pubkey, mint: &Pubkey) -> Result<Option<Instruction>> {
        if self.state.lock().unwrap().vaults_exist {
            return Ok(None);
        }
        Ok(Some(marker(&format!("init-user-vault:{}", mint))))
    }

    async fn prepare_native_wrap(&self, _payer: &Pubkey, lamports: u64) -> Result<Vec<Instruction>> {
        if self.state.lock().unwrap().wrapped_lamports >= lamports {
            return Ok(Vec::new());
        }
        Ok(vec![
            marker(&format!("wrap-sol:{}", lamports)),
            marker("sync-native"),
        ])
    }

    async fn create_position_instruction(&self, params: &CreatePositionParams) -> Result<Instruction> {
        Ok(marker_signed_by(
            &format!(
                "create:{}:{}:{}",
                params.relative_bin_id_left, params.relative_bin_id_right, params.position_mint
            ),
            Some(params.position_mint),
        ))
    }

    async fn add_liquidity_instruction(&self, params: &AddLiquidityParams) -> Result<Instruction> {
        Ok(marker(&format!(
            "add:{}:{}:{}:{}",
            params.position_mint,
            params.amount_x,
            params.amount_y,
            params.distribution.len()
        )))
    }
}

#[derive(Default)]
struct StoreState {
    pools: Vec<PoolRow>,
    wallets: Vec<WalletRecord>,
    positions: BTreeMap<Pubkey, PositionRow>,
    synced: HashMap<i32, DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    pub upserts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_pools(pools: Vec<PoolRow>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().pools = pools;
        store
    }

    pub fn rows(&self) -> Vec<PositionRow> {
        self.state.lock().unwrap().positions.values().cloned().collect()
    }

    fn stored(state: &StoreState, row: &PositionRow) -> Option<StoredPosition> {
        let pool = state.pools.iter().find(|p| p.id == row.pool_id)?;
        Some(StoredPosition {
            row: row.clone(),
            pool_address: pool.pool_address,
        })
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn get_or_create_wallet(&self, owner: &Pubkey) -> Result<WalletRecord> {
        let mut state = self.state.lock().unwrap();
        if let Some(w) = state.wallets.iter().find(|w| &w.owner_address == owner) {
            return Ok(w.clone());
        }
        let record = WalletRecord {
            id: state.wallets.len() as i32 + 1,
            owner_address: *owner,
        };
        state.wallets.push(record.clone());
        Ok(record)
    }

    async fn find_wallet_positions(&self, wallet_id: i32) -> Result<Vec<StoredPosition>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions
            .values()
            .filter(|r| r.wallet_id == wallet_id)
            .filter_map(|r| Self::stored(&state, r))
            .collect())
    }

    async fn list_pools(&self) -> Result<Vec<PoolRow>> {
        Ok(self.state.lock().unwrap().pools.clone())
    }

    async fn find_pool(&self, pool: &Pubkey) -> Result<Option<PoolRow>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pools
            .iter()
            .find(|p| &p.pool_address == pool)
            .cloned())
    }

    async fn upsert_pool(&self, pool: &PoolRow) -> Result<PoolRow> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.pools.iter_mut().find(|p| p.pool_address == pool.pool_address) {
            let id = existing.id;
            *existing = PoolRow { id, ..pool.clone() };
            return Ok(existing.clone());
        }
        let saved = PoolRow {
            id: state.pools.len() as i32 + 1,
            ..pool.clone()
        };
        state.pools.push(saved.clone());
        Ok(saved)
    }

    async fn upsert_position(&self, row: &PositionRow) -> Result<PositionRow> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let saved = match state.positions.get(&row.position_address) {
            Some(existing) => PositionRow {
                created_at: existing.created_at,
                ..row.clone()
            },
            None => row.clone(),
        };
        state.positions.insert(row.position_address, saved.clone());
        Ok(saved)
    }

    async fn mark_position_inactive(&self, position: &Pubkey) -> Result<()> {
        if let Some(row) = self.state.lock().unwrap().positions.get_mut(position) {
            row.is_active = false;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn positions_by_pool(&self, owner: &Pubkey, pool: &Pubkey) -> Result<Vec<StoredPosition>> {
        let state = self.state.lock().unwrap();
        let Some(wallet) = state.wallets.iter().find(|w| &w.owner_address == owner) else {
            return Ok(Vec::new());
        };
        Ok(state
            .positions
            .values()
            .filter(|r| r.wallet_id == wallet.id)
            .filter_map(|r| Self::stored(&state, r))
            .filter(|s| &s.pool_address == pool)
            .collect())
    }

    async fn last_synced_at(&self, wallet_id: i32) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.lock().unwrap().synced.get(&wallet_id).copied())
    }

    async fn mark_wallet_synced(&self, wallet_id: i32, at: DateTime<Utc>) -> Result<()> {
        self.state.lock().unwrap().synced.insert(wallet_id, at);
        Ok(())
    }
}

/// Fresh wallet keypair.
pub fn wallet() -> SharedSigner {
    Arc::new(Keypair::new())
}

/// Random position keys, counting how many were handed out.
#[derive(Default)]
pub struct TestKeyGenerator {
    pub generated: AtomicU32,
}

impl KeyGenerator for TestKeyGenerator {
    fn generate(&self) -> Result<SharedSigner> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Keypair::new()))
    }
}
