use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
    sync::Arc,
};

use ethereum_types::{Address, U256};

use super::{normalized_gas_price, PooledTransaction};

/// Head transaction of one sender, ranked by priority fee and then by
/// arrival.
#[derive(Debug)]
struct Candidate {
    priority: U256,
    entry: Arc<PooledTransaction>,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // Earlier arrival wins ties in a max-heap.
            .then_with(|| other.entry.id.cmp(&self.entry.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Iterator returned by
/// [`TxPool::txs_by_price_and_nonce`](super::TxPool::txs_by_price_and_nonce).
///
/// Only the lowest nonce transaction of every sender is a candidate. Yielding
/// it promotes the sender's next transaction.
#[derive(Debug)]
pub struct TxsByPriceAndNonce {
    base_fee: Option<U256>,
    blobs_left: Option<usize>,
    queues: HashMap<Address, VecDeque<Arc<PooledTransaction>>>,
    heap: BinaryHeap<Candidate>,
}

impl TxsByPriceAndNonce {
    pub(super) fn new(
        queues: HashMap<Address, VecDeque<Arc<PooledTransaction>>>,
        base_fee: Option<U256>,
        allowed_blobs: Option<usize>,
    ) -> Self {
        let senders: Vec<_> = queues.keys().copied().collect();
        let mut this = Self {
            base_fee,
            blobs_left: allowed_blobs,
            queues,
            heap: BinaryHeap::with_capacity(senders.len()),
        };
        for sender in senders {
            this.promote(sender);
        }
        this
    }

    /// Moves the next transaction of `sender` onto the heap, or drops the
    /// sender if it has none left or the next one cannot pay the base fee.
    fn promote(&mut self, sender: Address) {
        let Some(next) = self.queues.get_mut(&sender).and_then(VecDeque::pop_front) else {
            self.queues.remove(&sender);
            return;
        };

        if let Some(base_fee) = self.base_fee {
            if next.tx.gas_price().max_fee < base_fee {
                self.queues.remove(&sender);
                return;
            }
        }

        self.heap.push(Candidate {
            priority: normalized_gas_price(&next.tx, self.base_fee),
            entry: next,
        });
    }
}

impl Iterator for TxsByPriceAndNonce {
    type Item = Arc<PooledTransaction>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Candidate { entry, .. }) = self.heap.pop() {
            let sender = entry.sender();
            let blobs = entry.tx.blob_versioned_hashes().len();
            match self.blobs_left {
                Some(left) if blobs > left => {
                    self.queues.remove(&sender);
                    continue;
                }
                Some(left) => self.blobs_left = Some(left - blobs),
                None => {}
            }

            self.promote(sender);
            return Some(entry);
        }
        None
    }
}
