//! Pending transactions waiting for inclusion.
//!
//! Entries live in a flat map keyed by [`EntryId`], an arrival sequence
//! number, with two indices on top: sender to nonce-ordered ids and hash to
//! id. Hashes of included transactions are remembered in a bounded LRU set so
//! [`TxPool::get_transaction_status`] can tell mined transactions from unknown
//! ones.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    num::NonZeroUsize,
    sync::Arc,
};

use ethereum_types::{Address, H256, U256};
use itertools::Itertools;
use lru::LruCache;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn, Span};

use crate::{
    block::{Block, Header},
    clock::Clock,
    config::PoolConfig,
    state::Account,
    tx::{SignedTransaction, Transaction},
};

pub mod introspection;
mod ordering;

pub use ordering::TxsByPriceAndNonce;

/// Minimum fee increase, in percent, for a transaction replacing another one
/// at the same nonce.
pub const MIN_GAS_PRICE_BUMP_PERCENT: u64 = 10;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("transaction data is {size} bytes, exceeding the limit of {max}")]
    DataTooLarge { size: usize, max: usize },
    #[error("max priority fee {tip} exceeds max fee {max_fee}")]
    TipAboveMaxFee { tip: U256, max_fee: U256 },
    #[error("blob transaction without versioned hashes")]
    MissingBlobHashes,
    #[error("transaction chain id {got} does not match {expected}")]
    ChainIdMismatch { expected: u64, got: u64 },
    #[error("transaction pool is full ({0} transactions)")]
    PoolFull(usize),
    #[error("{sender:?} already has {count} pooled transactions")]
    SenderLimitReached { sender: Address, count: usize },
    #[error(
        "replacement gas too low, got tip {tip}, min: {min_tip}, got fee {max_fee}, min: {min_max_fee}"
    )]
    ReplacementUnderpriced {
        tip: U256,
        min_tip: U256,
        max_fee: U256,
        min_max_fee: U256,
    },
    #[error("replacement blob gas too low, got: {got}, min: {min}")]
    BlobReplacementUnderpriced { got: U256, min: U256 },
    #[error("{sender:?} sent nonce {nonce}, but the account nonce is {account_nonce}")]
    NonceTooLow {
        sender: Address,
        nonce: u64,
        account_nonce: u64,
    },
    #[error("{sender:?} has {balance} wei, needs {required} to cover the transaction")]
    InsufficientBalance {
        sender: Address,
        balance: U256,
        required: U256,
    },
    #[error("gas limit {gas_limit} exceeds the block gas limit {block_gas_limit}")]
    GasLimitExceeded { gas_limit: u64, block_gas_limit: u64 },
    #[error("max fee {max_fee} is not within 50% of the base fee {base_fee}")]
    FeeCapTooLow { max_fee: U256, base_fee: U256 },
}

/// Arrival sequence number of a pooled transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PooledTransaction {
    pub id: EntryId,
    /// The transaction as received, including any blob sidecar.
    pub tx: SignedTransaction,
    /// Arrival time in milliseconds.
    pub added_at: u64,
}

impl PooledTransaction {
    pub fn hash(&self) -> H256 {
        self.tx.hash()
    }

    pub fn sender(&self) -> Address {
        self.tx.sender()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The transaction took the nonce slot of `previous`.
    Replaced { previous: H256 },
    /// The exact transaction is already pooled.
    AlreadyKnown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Mined,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    Added(H256),
    Removed(H256),
}

pub struct TxPool {
    config: PoolConfig,
    chain_id: Option<u64>,
    clock: Arc<dyn Clock>,
    next_id: u64,
    entries: HashMap<EntryId, Arc<PooledTransaction>>,
    by_sender: HashMap<Address, BTreeMap<u64, EntryId>>,
    by_hash: HashMap<H256, EntryId>,
    /// Included transaction hashes and when they were included.
    handled: LruCache<H256, u64>,
    events: broadcast::Sender<PoolEvent>,
    span: Span,
}

impl std::fmt::Debug for TxPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxPool")
            .field("pending", &self.entries.len())
            .field("handled", &self.handled.len())
            .finish()
    }
}

impl TxPool {
    /// Creates an empty pool. Transactions carrying a chain id other than
    /// `chain_id` are rejected when it is set.
    pub fn new(
        config: PoolConfig,
        chain_id: Option<u64>,
        clock: Arc<dyn Clock>,
        span: Span,
    ) -> Self {
        let handled_capacity =
            NonZeroUsize::new(config.handled_capacity).unwrap_or(NonZeroUsize::MIN);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            chain_id,
            clock,
            next_id: 0,
            entries: HashMap::new(),
            by_sender: HashMap::new(),
            by_hash: HashMap::new(),
            handled: LruCache::new(handled_capacity),
            events,
            span,
        }
    }

    /// Admits `tx`, replacing a pooled transaction at the same sender and
    /// nonce if the fee bump allows it. On error the pool is unchanged.
    pub fn add(&mut self, tx: SignedTransaction) -> Result<AddOutcome, PoolError> {
        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) {
            return Ok(AddOutcome::AlreadyKnown);
        }
        self.validate(&tx)?;

        let sender = tx.sender();
        let existing = self
            .by_sender
            .get(&sender)
            .and_then(|nonces| nonces.get(&tx.nonce()))
            .and_then(|id| self.entries.get(id))
            .cloned();

        match &existing {
            Some(existing) => validate_tx_gas_bump(&existing.tx, &tx)?,
            None => {
                if self.entries.len() >= self.config.max_size {
                    return Err(PoolError::PoolFull(self.entries.len()));
                }
                let count = self.by_sender.get(&sender).map_or(0, BTreeMap::len);
                if count >= self.config.max_per_sender {
                    return Err(PoolError::SenderLimitReached { sender, count });
                }
            }
        }

        let previous = existing.and_then(|existing| self.remove_entry(existing.id));

        let id = EntryId(self.next_id);
        self.next_id += 1;
        let nonce = tx.nonce();
        self.entries.insert(
            id,
            Arc::new(PooledTransaction {
                id,
                tx,
                added_at: self.clock.now_millis(),
            }),
        );
        self.by_sender.entry(sender).or_default().insert(nonce, id);
        self.by_hash.insert(hash, id);
        self.emit(PoolEvent::Added(hash));

        match previous {
            Some(previous) => {
                debug!(parent: &self.span, ?hash, previous = ?previous.hash(), ?sender, nonce, "transaction replaced");
                Ok(AddOutcome::Replaced {
                    previous: previous.hash(),
                })
            }
            None => {
                debug!(parent: &self.span, ?hash, ?sender, nonce, "transaction added");
                Ok(AddOutcome::Added)
            }
        }
    }

    fn validate(&self, tx: &SignedTransaction) -> Result<(), PoolError> {
        let size = tx.data().len();
        if size > self.config.max_data_size {
            return Err(PoolError::DataTooLarge {
                size,
                max: self.config.max_data_size,
            });
        }

        let price = tx.gas_price();
        if price.tip > price.max_fee {
            return Err(PoolError::TipAboveMaxFee {
                tip: price.tip,
                max_fee: price.max_fee,
            });
        }

        if matches!(tx.transaction(), Transaction::Blob(_)) && tx.blob_versioned_hashes().is_empty()
        {
            return Err(PoolError::MissingBlobHashes);
        }

        match (self.chain_id, tx.chain_id()) {
            (Some(expected), Some(got)) if expected != got => {
                Err(PoolError::ChainIdMismatch { expected, got })
            }
            _ => Ok(()),
        }
    }

    fn remove_entry(&mut self, id: EntryId) -> Option<Arc<PooledTransaction>> {
        let entry = self.entries.remove(&id)?;
        let sender = entry.sender();
        self.by_hash.remove(&entry.hash());
        if let Some(nonces) = self.by_sender.get_mut(&sender) {
            nonces.remove(&entry.tx.nonce());
            if nonces.is_empty() {
                self.by_sender.remove(&sender);
            }
        }
        self.emit(PoolEvent::Removed(entry.hash()));
        Some(entry)
    }

    fn emit(&self, event: PoolEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub fn remove_by_hash(&mut self, hash: &H256) -> Option<Arc<PooledTransaction>> {
        let id = *self.by_hash.get(hash)?;
        self.remove_entry(id)
    }

    /// Drops the transactions of newly canonical `blocks` and remembers their
    /// hashes as handled.
    pub fn remove_new_block_txs<'a>(&mut self, blocks: impl IntoIterator<Item = &'a Block>) {
        let now = self.clock.now_millis();
        for block in blocks {
            for tx in &block.transactions {
                let hash = tx.hash();
                self.remove_by_hash(&hash);
                self.handled.put(hash, now);
            }
            debug!(parent: &self.span, number = block.number(), txs = block.transactions.len(), "removed block transactions");
        }
    }

    /// Returns the transactions of `removed` blocks to the pool, then drops
    /// those of `added` blocks. A transaction that is already pooled or that
    /// appears in any added block is not re-added.
    pub fn on_chain_reorganization(&mut self, removed: &[Block], added: &[Block]) {
        let in_added: HashSet<H256> = added
            .iter()
            .flat_map(|block| &block.transactions)
            .map(SignedTransaction::hash)
            .collect();

        for tx in removed.iter().flat_map(|block| &block.transactions) {
            let hash = tx.hash();
            if self.by_hash.contains_key(&hash) || in_added.contains(&hash) {
                continue;
            }
            self.handled.pop(&hash);
            if let Err(err) = self.add(tx.clone()) {
                warn!(parent: &self.span, ?hash, %err, "could not return transaction from removed block");
            }
        }

        self.remove_new_block_txs(added);
    }

    /// Transactions ready for inclusion, best paying first, each sender's in
    /// nonce order. The iterator works on a snapshot of the pool.
    ///
    /// Senders whose next transaction cannot pay `base_fee` are left out from
    /// that point on. With `allowed_blobs` set, a sender whose next blob
    /// transaction would not fit the remaining blob budget is left out too.
    pub fn txs_by_price_and_nonce(
        &self,
        base_fee: Option<U256>,
        allowed_blobs: Option<usize>,
    ) -> TxsByPriceAndNonce {
        let queues = self
            .by_sender
            .iter()
            .map(|(sender, nonces)| {
                let queue = nonces
                    .values()
                    .filter_map(|id| self.entries.get(id).cloned())
                    .collect();
                (*sender, queue)
            })
            .collect();
        TxsByPriceAndNonce::new(queues, base_fee, allowed_blobs)
    }

    pub fn get_by_sender_address(&self, address: &Address) -> Vec<Arc<PooledTransaction>> {
        self.by_sender
            .get(address)
            .map(|nonces| {
                nonces
                    .values()
                    .filter_map(|id| self.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_by_hash(&self, hash: &H256) -> Option<Arc<PooledTransaction>> {
        self.by_hash
            .get(hash)
            .and_then(|id| self.entries.get(id))
            .cloned()
    }

    /// Pooled transactions among `hashes`, in the given order. Unknown hashes
    /// are skipped.
    pub fn get_by_hashes(&self, hashes: &[H256]) -> Vec<Arc<PooledTransaction>> {
        hashes.iter().filter_map(|hash| self.get_by_hash(hash)).collect()
    }

    pub fn get_transaction_status(&self, hash: &H256) -> TxStatus {
        if self.by_hash.contains_key(hash) {
            TxStatus::Pending
        } else if self.handled.contains(hash) {
            TxStatus::Mined
        } else {
            TxStatus::Unknown
        }
    }

    /// Every pooled transaction in arrival order.
    pub fn pending_transactions(&self) -> Vec<Arc<PooledTransaction>> {
        self.entries
            .values()
            .cloned()
            .sorted_by_key(|entry| entry.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every pooled transaction. Handled hashes are kept.
    pub fn clear(&mut self) {
        let ids: Vec<_> = self.entries.keys().copied().collect();
        for id in ids {
            self.remove_entry(id);
        }
    }

    /// Drops transactions pooled for longer than the pooled storage time and
    /// forgets handled hashes older than the handled cleanup time.
    pub fn cleanup(&mut self) {
        let now = self.clock.now_millis();
        let pooled_cutoff =
            now.saturating_sub(self.config.pooled_storage_time.as_millis() as u64);
        let handled_cutoff =
            now.saturating_sub(self.config.handled_cleanup_time.as_millis() as u64);

        let expired: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.added_at < pooled_cutoff)
            .map(|entry| entry.id)
            .collect();
        for id in &expired {
            self.remove_entry(*id);
        }

        let forgotten: Vec<_> = self
            .handled
            .iter()
            .filter(|(_, at)| **at < handled_cutoff)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &forgotten {
            self.handled.pop(hash);
        }

        debug!(parent: &self.span, expired = expired.len(), forgotten = forgotten.len(), "pool cleanup");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }
}

/// Priority fee per gas above `base_fee`, used to order transactions. A
/// missing base fee counts as zero.
pub fn normalized_gas_price(tx: &Transaction, base_fee: Option<U256>) -> U256 {
    tx.effective_tip(base_fee)
}

/// Smallest value that is at least the minimum bump above `value`.
fn min_bumped(value: U256) -> U256 {
    value
        .checked_mul((100 + MIN_GAS_PRICE_BUMP_PERCENT).into())
        .and_then(|scaled| scaled.checked_add(99.into()))
        .map_or(U256::MAX, |scaled| scaled / 100)
}

/// Whether `new` is at least the minimum bump above `old`, compared exactly
/// as `new * 100 >= old * (100 + bump)`.
fn covers_bump(old: U256, new: U256) -> bool {
    new.full_mul(100.into()) >= old.full_mul((100 + MIN_GAS_PRICE_BUMP_PERCENT).into())
}

/// Checks that `incoming` pays enough more than `existing` to replace it.
/// Both the tip and the max fee must rise by the minimum bump, and so must
/// the blob fee cap when both are blob transactions.
pub fn validate_tx_gas_bump(existing: &Transaction, incoming: &Transaction) -> Result<(), PoolError> {
    let old = existing.gas_price();
    let new = incoming.gas_price();
    if !covers_bump(old.tip, new.tip) || !covers_bump(old.max_fee, new.max_fee) {
        return Err(PoolError::ReplacementUnderpriced {
            tip: new.tip,
            min_tip: min_bumped(old.tip),
            max_fee: new.max_fee,
            min_max_fee: min_bumped(old.max_fee),
        });
    }

    if let (Some(old), Some(got)) = (existing.max_fee_per_blob_gas(), incoming.max_fee_per_blob_gas())
    {
        if !covers_bump(old, got) {
            return Err(PoolError::BlobReplacementUnderpriced {
                got,
                min: min_bumped(old),
            });
        }
    }
    Ok(())
}

/// Admission checks that need the sender account and the canonical head.
/// The balance check is skipped with `skip_balance`.
pub fn validate_against_account(
    tx: &SignedTransaction,
    account: &Account,
    head: &Header,
    skip_balance: bool,
) -> Result<(), PoolError> {
    let price = tx.gas_price();
    if let Some(base_fee) = head.base_fee_per_gas.filter(|fee| !fee.is_zero()) {
        if price.max_fee < base_fee / 2 {
            return Err(PoolError::FeeCapTooLow {
                max_fee: price.max_fee,
                base_fee,
            });
        }
    }

    if tx.gas_limit() > head.gas_limit {
        return Err(PoolError::GasLimitExceeded {
            gas_limit: tx.gas_limit(),
            block_gas_limit: head.gas_limit,
        });
    }

    if account.nonce > tx.nonce() {
        return Err(PoolError::NonceTooLow {
            sender: tx.sender(),
            nonce: tx.nonce(),
            account_nonce: account.nonce,
        });
    }

    let required = price
        .max_fee
        .saturating_mul(tx.gas_limit().into())
        .saturating_add(tx.value());
    if !skip_balance && account.balance < required {
        return Err(PoolError::InsufficientBalance {
            sender: tx.sender(),
            balance: account.balance,
            required,
        });
    }
    Ok(())
}
