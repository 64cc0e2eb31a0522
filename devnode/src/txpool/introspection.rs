//! Read-only views of the pool in the shape of the `txpool_content`,
//! `txpool_status` and `txpool_inspect` RPC methods.
//!
//! A transaction is pending when its nonce continues the sender's account
//! nonce without a gap, queued otherwise.

use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::Serialize;

use super::{PooledTransaction, TxPool};
use crate::tx::TxType;

/// Sender to nonce to value.
pub type BySenderAndNonce<T> = BTreeMap<Address, BTreeMap<u64, T>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSummary {
    pub hash: H256,
    pub nonce: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    /// Gas price of legacy transactions, max fee of the others.
    pub gas_price: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(rename = "type")]
    pub tx_type: u8,
    #[serde(serialize_with = "crate::hex::serialize")]
    pub input: Bytes,
}

impl From<&PooledTransaction> for TxSummary {
    fn from(entry: &PooledTransaction) -> Self {
        let tx = &entry.tx;
        let price = tx.gas_price();
        let tx_type = tx.tx_type();
        Self {
            hash: tx.hash(),
            nonce: tx.nonce(),
            from: tx.sender(),
            to: tx.to(),
            value: tx.value(),
            gas: tx.gas_limit(),
            gas_price: price.max_fee,
            max_priority_fee_per_gas: matches!(tx_type, TxType::FeeMarket | TxType::Blob)
                .then_some(price.tip),
            tx_type: tx_type as u8,
            input: tx.data().clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TxPoolContent {
    pub pending: BySenderAndNonce<TxSummary>,
    pub queued: BySenderAndNonce<TxSummary>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TxPoolStatus {
    pub pending: usize,
    pub queued: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TxPoolInspect {
    pub pending: BySenderAndNonce<String>,
    pub queued: BySenderAndNonce<String>,
}

type Partition = (
    BySenderAndNonce<Arc<PooledTransaction>>,
    BySenderAndNonce<Arc<PooledTransaction>>,
);

impl TxPool {
    fn partition(&self, account_nonce: impl Fn(&Address) -> u64) -> Partition {
        let mut pending = BySenderAndNonce::new();
        let mut queued = BySenderAndNonce::new();
        for (sender, nonces) in &self.by_sender {
            let mut expected = account_nonce(sender);
            for (nonce, id) in nonces {
                let Some(entry) = self.entries.get(id) else {
                    continue;
                };
                let target = if *nonce == expected {
                    expected += 1;
                    &mut pending
                } else {
                    &mut queued
                };
                target
                    .entry(*sender)
                    .or_insert_with(BTreeMap::new)
                    .insert(*nonce, entry.clone());
            }
        }
        (pending, queued)
    }

    pub fn content(&self, account_nonce: impl Fn(&Address) -> u64) -> TxPoolContent {
        let (pending, queued) = self.partition(account_nonce);
        TxPoolContent {
            pending: map_entries(pending, |entry| TxSummary::from(entry)),
            queued: map_entries(queued, |entry| TxSummary::from(entry)),
        }
    }

    pub fn status(&self, account_nonce: impl Fn(&Address) -> u64) -> TxPoolStatus {
        let (pending, queued) = self.partition(account_nonce);
        let count = |group: &BySenderAndNonce<Arc<PooledTransaction>>| -> usize {
            group.values().map(BTreeMap::len).sum()
        };
        TxPoolStatus {
            pending: count(&pending),
            queued: count(&queued),
        }
    }

    /// One line per transaction, e.g.
    /// `0x…: 1000 wei + 21000 gas × 20 wei`.
    pub fn inspect(&self, account_nonce: impl Fn(&Address) -> u64) -> TxPoolInspect {
        let (pending, queued) = self.partition(account_nonce);
        TxPoolInspect {
            pending: map_entries(pending, summarize),
            queued: map_entries(queued, summarize),
        }
    }
}

fn summarize(entry: &PooledTransaction) -> String {
    let tx = &entry.tx;
    let to = match tx.to() {
        Some(to) => format!("{to:?}"),
        None => "contract creation".to_owned(),
    };
    format!(
        "{to}: {} wei + {} gas × {} wei",
        tx.value(),
        tx.gas_limit(),
        tx.gas_price().max_fee
    )
}

fn map_entries<T>(
    group: BySenderAndNonce<Arc<PooledTransaction>>,
    f: impl Fn(&PooledTransaction) -> T,
) -> BySenderAndNonce<T> {
    group
        .into_iter()
        .map(|(sender, nonces)| {
            let nonces = nonces
                .into_iter()
                .map(|(nonce, entry)| (nonce, f(&entry)))
                .collect();
            (sender, nonces)
        })
        .collect()
}
