//! In-memory port implementations shared by the service tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::{ClientError, ClientResult, QueueResult, StorageError, StorageResult};
use crate::models::{
    Balance, Block, ParsedEvent, Token, Transaction, Transfer, TxEvent, TxEventAttr,
};
use crate::ports::{
    BalanceRepository, BlockRepository, EventQueue, HeadHandler, HeadSubscription, RawBlock,
    RawTransaction, Repositories, TokenRepository, TransactionRepository, TransferRepository,
    TxEventRepository, UpstreamSource,
};

// =============================================================================
// In-memory repositories
// =============================================================================

#[derive(Default)]
pub struct MemoryRepositories {
    pub blocks: MemoryBlocks,
    pub transactions: MemoryTransactions,
    pub events: MemoryEvents,
    pub transfers: MemoryTransfers,
    pub balances: MemoryBalances,
    pub tokens: MemoryTokens,
}

impl Repositories for MemoryRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        &self.blocks
    }
    fn transactions(&self) -> &dyn TransactionRepository {
        &self.transactions
    }
    fn events(&self) -> &dyn TxEventRepository {
        &self.events
    }
    fn transfers(&self) -> &dyn TransferRepository {
        &self.transfers
    }
    fn balances(&self) -> &dyn BalanceRepository {
        &self.balances
    }
    fn tokens(&self) -> &dyn TokenRepository {
        &self.tokens
    }
}

#[derive(Default)]
pub struct MemoryBlocks {
    pub rows: Mutex<Vec<Block>>,
}

#[async_trait]
impl BlockRepository for MemoryBlocks {
    async fn insert_block(&self, block: &Block) -> StorageResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|b| b.hash == block.hash) {
            return Ok(());
        }
        rows.push(block.clone());
        Ok(())
    }

    async fn get_block(&self, height: u64) -> StorageResult<Option<Block>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|b| b.height == height).cloned())
    }

    async fn last_synced_height(&self) -> StorageResult<u64> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().map(|b| b.height).max().unwrap_or(1))
    }
}

#[derive(Default)]
pub struct MemoryTransactions {
    pub rows: Mutex<HashMap<String, Transaction>>,
}

#[async_trait]
impl TransactionRepository for MemoryTransactions {
    async fn insert_transaction(&self, tx: &Transaction) -> StorageResult<()> {
        self.rows
            .lock()
            .unwrap()
            .entry(tx.hash.clone())
            .or_insert_with(|| tx.clone());
        Ok(())
    }

    async fn get_transaction(&self, hash: &str) -> StorageResult<Option<Transaction>> {
        Ok(self.rows.lock().unwrap().get(hash).cloned())
    }
}

#[derive(Default)]
pub struct MemoryEvents {
    pub rows: Mutex<Vec<(i64, TxEvent)>>,
    pub attrs: Mutex<Vec<(i64, TxEventAttr)>>,
    next_id: AtomicI64,
}

#[async_trait]
impl TxEventRepository for MemoryEvents {
    async fn insert_event(&self, event: &TxEvent) -> StorageResult<i64> {
        let mut rows = self.rows.lock().unwrap();
        if let Some((id, _)) = rows
            .iter()
            .find(|(_, e)| e.tx_hash == event.tx_hash && e.event_index == event.event_index)
        {
            return Ok(*id);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        rows.push((id, event.clone()));
        Ok(id)
    }

    async fn insert_attrs(&self, event_id: i64, attrs: &[TxEventAttr]) -> StorageResult<()> {
        let mut stored = self.attrs.lock().unwrap();
        for attr in attrs {
            let exists = stored
                .iter()
                .any(|(id, a)| *id == event_id && a.attr_index == attr.attr_index);
            if !exists {
                stored.push((event_id, attr.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTransfers {
    pub rows: Mutex<Vec<Transfer>>,
}

#[async_trait]
impl TransferRepository for MemoryTransfers {
    async fn insert_transfer(&self, transfer: &Transfer) -> StorageResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let exists = rows
            .iter()
            .any(|t| t.tx_hash == transfer.tx_hash && t.event_index == transfer.event_index);
        if !exists {
            rows.push(transfer.clone());
        }
        Ok(())
    }

    async fn exists(&self, tx_hash: &str, event_index: u32) -> StorageResult<bool> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .any(|t| t.tx_hash == tx_hash && t.event_index == event_index))
    }

    async fn list_by_address(&self, address: &str, limit: u32) -> StorageResult<Vec<Transfer>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|t| t.from_address == address || t.to_address == address)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryBalances {
    pub rows: Mutex<HashMap<(String, String), Balance>>,
}

#[async_trait]
impl BalanceRepository for MemoryBalances {
    async fn get_balance(&self, token_path: &str, address: &str) -> StorageResult<Balance> {
        let rows = self.rows.lock().unwrap();
        rows.get(&(address.to_string(), token_path.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("balance {token_path}/{address}")))
    }

    async fn upsert_balance(&self, balance: &Balance) -> StorageResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let key = (balance.address.clone(), balance.token_path.clone());
        match rows.get_mut(&key) {
            Some(existing) => {
                existing.amount = balance.amount.clone();
                // Witness columns only move forward, as in the SQL upsert
                if balance.last_block_height > existing.last_block_height {
                    existing.last_block_height = balance.last_block_height;
                    existing.last_tx_hash = balance.last_tx_hash.clone();
                }
                existing.updated_at = balance.updated_at;
            }
            None => {
                rows.insert(key, balance.clone());
            }
        }
        Ok(())
    }

    async fn list_by_address(&self, address: &str) -> StorageResult<Vec<Balance>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|b| b.address == address)
            .cloned()
            .collect())
    }

    async fn list_by_token(&self, token_path: &str) -> StorageResult<Vec<Balance>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|b| b.token_path == token_path)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> StorageResult<Vec<Balance>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryTokens {
    pub rows: Mutex<HashMap<String, Token>>,
}

#[async_trait]
impl TokenRepository for MemoryTokens {
    async fn register_if_absent(&self, path: &str) -> StorageResult<()> {
        self.rows
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert_with(|| Token {
                path: path.to_string(),
                symbol: String::new(),
                decimals: 0,
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn get_token(&self, path: &str) -> StorageResult<Option<Token>> {
        Ok(self.rows.lock().unwrap().get(path).cloned())
    }
}

// =============================================================================
// In-memory queue
// =============================================================================

#[derive(Default)]
pub struct MemoryQueue {
    pub messages: Mutex<VecDeque<ParsedEvent>>,
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn send(&self, event: &ParsedEvent) -> QueueResult<()> {
        self.messages.lock().unwrap().push_back(event.clone());
        Ok(())
    }

    async fn receive(&self) -> QueueResult<Vec<ParsedEvent>> {
        Ok(self.messages.lock().unwrap().drain(..).collect())
    }

    async fn close(&self) {}
}

// =============================================================================
// Scripted upstream
// =============================================================================

/// Upstream fake serving preset blocks/transactions, with optional failure
/// injection per exclusive-bound window.
#[derive(Default)]
pub struct ScriptedUpstream {
    pub blocks: Vec<RawBlock>,
    pub transactions: Vec<RawTransaction>,
    /// `(gt, lt)` windows whose queries fail with a transport error.
    pub failing_windows: Vec<(u64, u64)>,
    /// Record of `(gt, lt)` pairs seen by block queries.
    pub seen_windows: Mutex<Vec<(u64, u64)>>,
}

impl ScriptedUpstream {
    pub fn with_heights(heights: &[u64]) -> Self {
        Self {
            blocks: heights.iter().map(|h| raw_block(*h)).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl UpstreamSource for ScriptedUpstream {
    async fn blocks(&self, gt: u64, lt: u64) -> ClientResult<Vec<RawBlock>> {
        self.seen_windows.lock().unwrap().push((gt, lt));
        if self.failing_windows.contains(&(gt, lt)) {
            return Err(ClientError::Transport("scripted failure".into()));
        }
        Ok(self
            .blocks
            .iter()
            .filter(|b| b.height > gt && b.height < lt)
            .cloned()
            .collect())
    }

    async fn transactions(
        &self,
        gt: u64,
        lt: u64,
        imax: u32,
    ) -> ClientResult<Vec<RawTransaction>> {
        if self.failing_windows.contains(&(gt, lt)) {
            return Err(ClientError::Transport("scripted failure".into()));
        }
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.block_height > gt && t.block_height < lt && t.index < imax)
            .cloned()
            .collect())
    }

    async fn latest_block(&self) -> ClientResult<Option<RawBlock>> {
        Ok(self
            .blocks
            .iter()
            .max_by_key(|b| b.height)
            .cloned())
    }
}

// =============================================================================
// Scripted head subscription
// =============================================================================

/// Head-subscription fake: persistent subscriptions replay `frames`
/// inline, one-shot subscriptions deliver a frame at `head`.
#[derive(Default)]
pub struct ScriptedHeads {
    pub frames: Vec<RawBlock>,
    pub head: u64,
    /// When set, `subscribe_heads_once` never completes (for cancel tests).
    pub hang_once: bool,
    pub stopped: Mutex<Vec<String>>,
    pub(crate) next_id: AtomicI64,
}

#[async_trait]
impl HeadSubscription for ScriptedHeads {
    async fn subscribe_heads(&self, handler: HeadHandler) -> ClientResult<String> {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        for frame in self.frames.clone() {
            let _ = handler(frame).await;
        }
        Ok(id)
    }

    async fn subscribe_heads_once(&self, handler: HeadHandler) -> ClientResult<()> {
        if self.hang_once {
            futures::future::pending::<()>().await;
        }
        let _ = handler(raw_block(self.head)).await;
        Ok(())
    }

    async fn stop(&self, id: &str) -> ClientResult<()> {
        self.stopped.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn close(&self) {}
}

// =============================================================================
// Builders
// =============================================================================

pub fn raw_block(height: u64) -> RawBlock {
    RawBlock {
        hash: format!("blockhash-{height}"),
        height,
        parent_hash: format!("blockhash-{}", height.saturating_sub(1)),
        time: Utc.timestamp_opt(1_700_000_000 + height as i64, 0).unwrap(),
        num_txs: 0,
        total_txs: height,
    }
}

pub fn token_event_json(func: &str, from: &str, to: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "Transfer",
        "func": func,
        "pkg_path": "gno.land/r/demo/foo",
        "attrs": [
            {"key": "from", "value": from},
            {"key": "to", "value": to},
            {"key": "value", "value": value},
        ],
    })
}

pub fn raw_transaction(hash: &str, height: u64, events: serde_json::Value) -> RawTransaction {
    RawTransaction {
        index: 0,
        hash: hash.to_string(),
        success: true,
        block_height: height,
        gas_wanted: 1000,
        gas_used: 900,
        memo: String::new(),
        content_raw: String::new(),
        gas_fee: serde_json::Value::Null,
        messages: serde_json::Value::Null,
        response: serde_json::json!({ "events": events }),
    }
}
