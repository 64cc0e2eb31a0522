//! Persistent receipts and the transaction hash and log indexes built on
//! them.
//!
//! Receipts of a block are stored as one RLP list under the block hash. Every
//! transaction hash maps to `rlp([block hash, transaction index])`. Blooms are
//! not stored; they are recomputed from the logs on request.

use std::sync::Arc;

use devnode_common::BlobParams;
use ethereum_types::{Address, H256};
use rlp::{DecoderError, Rlp, RlpStream};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, Span};

use crate::{
    block::Block,
    chain::{BlockId, ChainError, SharedChain},
    config::ReceiptsConfig,
    db::{DbError, DbNamespace, KeyValueStore},
    receipt::{Log, ReceiptOutcome, TxReceipt},
    tx::{Transaction, TxType},
};

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("corrupted {namespace:?} entry")]
    Corrupt {
        namespace: DbNamespace,
        #[source]
        source: DecoderError,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("could not measure log size")]
    Serialize(#[from] serde_json::Error),
}

/// One position of a topic filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TopicFilter {
    /// Matches any topic.
    #[default]
    Any,
    Exact(H256),
    /// Matches any of the listed topics. An empty list matches anything.
    OneOf(Vec<H256>),
}

impl TopicFilter {
    fn matches(&self, topic: &H256) -> bool {
        match self {
            TopicFilter::Any => true,
            TopicFilter::Exact(expected) => expected == topic,
            TopicFilter::OneOf(options) => options.is_empty() || options.contains(topic),
        }
    }
}

impl From<H256> for TopicFilter {
    fn from(topic: H256) -> Self {
        TopicFilter::Exact(topic)
    }
}

impl From<Option<H256>> for TopicFilter {
    fn from(topic: Option<H256>) -> Self {
        topic.map_or(TopicFilter::Any, TopicFilter::Exact)
    }
}

impl From<Vec<H256>> for TopicFilter {
    fn from(topics: Vec<H256>) -> Self {
        TopicFilter::OneOf(topics)
    }
}

/// Whether `log` satisfies every position of `filters`. A log with fewer
/// topics than filter positions never matches.
pub fn topics_match(filters: &[TopicFilter], log: &Log) -> bool {
    filters.len() <= log.topics.len()
        && filters
            .iter()
            .zip(&log.topics)
            .all(|(filter, topic)| filter.matches(topic))
}

/// A stored receipt, annotated with the type of its transaction when
/// requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptWithType {
    pub receipt: TxReceipt,
    pub tx_type: Option<TxType>,
}

/// Result of a transaction hash lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptLookup {
    pub receipt: TxReceipt,
    pub tx_type: Option<TxType>,
    pub block_hash: H256,
    pub tx_index: usize,
    /// Index in the block of the first log of this receipt.
    pub log_index: usize,
}

/// A log in the shape of an `eth_getLogs` result entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredLog {
    #[serde(flatten)]
    pub log: Log,
    pub block_hash: H256,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub transaction_index: usize,
    pub log_index: usize,
}

pub struct ReceiptsManager {
    db: Arc<dyn KeyValueStore>,
    chain: SharedChain,
    config: ReceiptsConfig,
    blob_params: BlobParams,
    span: Span,
}

impl std::fmt::Debug for ReceiptsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptsManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReceiptsManager {
    pub fn new(
        db: Arc<dyn KeyValueStore>,
        chain: SharedChain,
        config: ReceiptsConfig,
        blob_params: BlobParams,
        span: Span,
    ) -> Self {
        Self {
            db,
            chain,
            config,
            blob_params,
            span,
        }
    }

    /// Stores `receipts` under the hash of `block` and indexes every
    /// transaction of the block.
    pub fn save_receipts(&self, block: &Block, receipts: &[TxReceipt]) -> Result<(), ReceiptError> {
        let block_hash = block.hash();
        let mut s = RlpStream::new_list(receipts.len());
        for receipt in receipts {
            receipt.append_storage(&mut s);
        }
        self.db
            .put(DbNamespace::Receipts, block_hash.as_bytes(), s.out().to_vec())?;

        for (index, tx) in block.transactions.iter().enumerate() {
            let mut s = RlpStream::new_list(2);
            s.append(&block_hash);
            s.append(&(index as u64));
            self.db
                .put(DbNamespace::TxHash, tx.hash().as_bytes(), s.out().to_vec())?;
        }

        debug!(parent: &self.span, number = block.number(), hash = ?block_hash, receipts = receipts.len(), "saved receipts");
        Ok(())
    }

    /// Removes what [`ReceiptsManager::save_receipts`] stored for `block`.
    pub fn delete_receipts(&self, block: &Block) -> Result<(), ReceiptError> {
        let block_hash = block.hash();
        self.db.delete(DbNamespace::Receipts, block_hash.as_bytes())?;
        for tx in &block.transactions {
            self.db.delete(DbNamespace::TxHash, tx.hash().as_bytes())?;
        }

        debug!(parent: &self.span, number = block.number(), hash = ?block_hash, "deleted receipts");
        Ok(())
    }

    fn load(&self, block_hash: H256) -> Result<Vec<TxReceipt>, ReceiptError> {
        let Some(raw) = self.db.get(DbNamespace::Receipts, block_hash.as_bytes())? else {
            return Ok(Vec::new());
        };
        let corrupt = |source| ReceiptError::Corrupt {
            namespace: DbNamespace::Receipts,
            source,
        };

        let rlp = Rlp::new(&raw);
        if !rlp.is_list() {
            return Err(corrupt(DecoderError::RlpExpectedToBeList));
        }
        rlp.iter()
            .map(|item| TxReceipt::decode_storage(&item).map_err(corrupt))
            .collect()
    }

    /// Receipts of the block `block_hash`; empty if none are stored.
    ///
    /// With `calc_bloom` the bloom of each receipt is recomputed from its
    /// logs. With `include_tx_type` each receipt is annotated with its
    /// transaction type, and blob receipts get their blob gas fields back
    /// from the block.
    pub fn get_receipts(
        &self,
        block_hash: H256,
        calc_bloom: bool,
        include_tx_type: bool,
    ) -> Result<Vec<ReceiptWithType>, ReceiptError> {
        let mut receipts = self.load(block_hash)?;
        if calc_bloom {
            receipts = receipts.into_iter().map(TxReceipt::with_logs_bloom).collect();
        }
        if !include_tx_type {
            return Ok(receipts
                .into_iter()
                .map(|receipt| ReceiptWithType {
                    receipt,
                    tx_type: None,
                })
                .collect());
        }

        let Some(block) = self.chain.read().get_block(BlockId::Hash(block_hash))? else {
            return Ok(Vec::new());
        };
        let blob_gas_price = block
            .header
            .blob_base_fee(&self.blob_params)
            .unwrap_or_default();

        Ok(receipts
            .into_iter()
            .zip(&block.transactions)
            .map(|(mut receipt, tx)| {
                if let (Transaction::Blob(_), ReceiptOutcome::Status(status)) =
                    (tx.transaction(), &receipt.outcome)
                {
                    receipt.outcome = ReceiptOutcome::Blob {
                        status: *status,
                        blob_gas_used: tx.blob_gas(),
                        blob_gas_price,
                    };
                }
                ReceiptWithType {
                    receipt,
                    tx_type: Some(tx.tx_type()),
                }
            })
            .collect())
    }

    /// Finds the receipt of transaction `tx_hash`, with the position of the
    /// transaction and of its first log in the block.
    pub fn get_receipt_by_tx_hash(
        &self,
        tx_hash: H256,
    ) -> Result<Option<ReceiptLookup>, ReceiptError> {
        let Some(raw) = self.db.get(DbNamespace::TxHash, tx_hash.as_bytes())? else {
            return Ok(None);
        };
        let corrupt = |source| ReceiptError::Corrupt {
            namespace: DbNamespace::TxHash,
            source,
        };
        let rlp = Rlp::new(&raw);
        let block_hash: H256 = rlp.val_at(0).map_err(corrupt)?;
        let tx_index = rlp.val_at::<u64>(1).map_err(corrupt)? as usize;

        let mut receipts = self.get_receipts(block_hash, true, true)?;
        if tx_index >= receipts.len() {
            trace!(parent: &self.span, ?tx_hash, ?block_hash, tx_index, "indexed receipt is missing");
            return Ok(None);
        }
        let log_index = receipts[..tx_index]
            .iter()
            .map(|r| r.receipt.logs.len())
            .sum();
        let ReceiptWithType { receipt, tx_type } = receipts.swap_remove(tx_index);

        Ok(Some(ReceiptLookup {
            receipt,
            tx_type,
            block_hash,
            tx_index,
            log_index,
        }))
    }

    /// Logs of the canonical blocks `from..=to` emitted by one of `addresses`
    /// (any address if `None` or empty) and matching `topics`. Heights past
    /// the canonical head are ignored.
    ///
    /// The result is cut short, without error, after the first block that
    /// takes it to the configured count or size limit.
    pub fn get_logs(
        &self,
        from: u64,
        to: u64,
        addresses: Option<&[Address]>,
        topics: &[TopicFilter],
    ) -> Result<Vec<FilteredLog>, ReceiptError> {
        let addresses = addresses.filter(|addresses| !addresses.is_empty());
        let to = to.min(self.chain.read().canonical_head()?.number());
        let mut logs = Vec::new();
        let mut size = 0;

        for number in from..=to {
            let Some(block) = self.chain.read().get_block(BlockId::Number(number))? else {
                continue;
            };
            let block_hash = block.hash();
            let receipts = self.load(block_hash)?;

            let mut log_index = 0;
            for (tx_index, (receipt, tx)) in receipts.into_iter().zip(&block.transactions).enumerate() {
                for log in receipt.logs {
                    let index = log_index;
                    log_index += 1;

                    if addresses.is_some_and(|addresses| !addresses.contains(&log.address)) {
                        continue;
                    }
                    if !topics_match(topics, &log) {
                        continue;
                    }

                    let log = FilteredLog {
                        log,
                        block_hash,
                        block_number: number,
                        transaction_hash: tx.hash(),
                        transaction_index: tx_index,
                        log_index: index,
                    };
                    size += serde_json::to_vec(&log)?.len();
                    logs.push(log);
                }
            }

            if logs.len() >= self.config.logs_limit || size >= self.config.logs_size_limit {
                debug!(parent: &self.span, from, to, stopped_at = number, logs = logs.len(), size, "log query limit reached");
                break;
            }
        }
        Ok(logs)
    }
}
