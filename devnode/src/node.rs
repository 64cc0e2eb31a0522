//! A development node: pool, state, chain and receipts behind one handle.
//!
//! Locks are always taken in the order state, chain, pool. Mining runs are
//! serialized by a flag; a second concurrent run fails fast.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use devnode_common::Eip;
use ethereum_types::{Address, H256};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::{debug, debug_span, info, info_span, warn, Span};

use crate::{
    block::{Block, Header},
    builder::{
        BlockBuilder, BuildBlockOptions, BuildStatus, BuilderContext, BuilderError,
        BuiltBlock, HeaderOverrides,
    },
    chain::{ChainError, MemoryBlockchain, SharedChain},
    clock::Clock,
    config::{MiningMode, NodeConfig},
    db::{KeyValueStore, MemoryDb},
    executor::{TransferExecutor, TxExecutor},
    receipts::{FilteredLog, ReceiptError, ReceiptLookup, ReceiptsManager, TopicFilter},
    state::{Account, MemoryState, StateError, StateManager},
    tx::{SignedTransaction, TxError},
    txpool::{
        introspection::{TxPoolContent, TxPoolInspect, TxPoolStatus},
        validate_against_account, AddOutcome, PoolError, TxPool, TxStatus,
    },
};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("a mining run is already in progress")]
    MiningInProgress,
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Receipts(#[from] ReceiptError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdmissionOptions {
    /// Admit transactions the sender cannot currently pay for.
    pub skip_balance: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MineOptions {
    pub block_count: u64,
    /// Seconds between consecutive block timestamps. Without it blocks are
    /// stamped with the clock, at least one second after their parent.
    pub interval: Option<u64>,
}

impl Default for MineOptions {
    fn default() -> Self {
        Self {
            block_count: 1,
            interval: None,
        }
    }
}

/// Clears the mining flag when a run ends, however it ends.
struct MiningGuard<'a>(&'a AtomicBool);

impl<'a> MiningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, NodeError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NodeError::MiningInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for MiningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Node {
    config: NodeConfig,
    state: Mutex<Box<dyn StateManager>>,
    chain: SharedChain,
    pool: RwLock<TxPool>,
    receipts: ReceiptsManager,
    executor: Box<dyn TxExecutor>,
    clock: Arc<dyn Clock>,
    mining: AtomicBool,
    span: Span,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("mining", &self.mining)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(
        config: NodeConfig,
        state: Box<dyn StateManager>,
        chain: SharedChain,
        db: Arc<dyn KeyValueStore>,
        executor: Box<dyn TxExecutor>,
        clock: Arc<dyn Clock>,
        span: Span,
    ) -> Self {
        let pool = TxPool::new(
            config.pool.clone(),
            Some(config.chain.chain_id),
            clock.clone(),
            debug_span!(parent: &span, "txpool"),
        );
        let receipts = ReceiptsManager::new(
            db,
            chain.clone(),
            config.receipts.clone(),
            config.chain.blob_params(),
            debug_span!(parent: &span, "receipts"),
        );
        Self {
            config,
            state: Mutex::new(state),
            chain,
            pool: RwLock::new(pool),
            receipts,
            executor,
            clock,
            mining: AtomicBool::new(false),
            span,
        }
    }

    /// A node keeping everything in memory, starting from the genesis block
    /// described by `config`.
    pub fn in_memory(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        Self::with_executor(config, Box::new(TransferExecutor), clock)
    }

    /// Like [`Node::in_memory`], with a custom transaction executor.
    pub fn with_executor(
        config: NodeConfig,
        executor: Box<dyn TxExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        let state = MemoryState::with_balances(
            config
                .genesis
                .alloc
                .iter()
                .map(|(address, balance)| (*address, *balance)),
        );
        let genesis = Block {
            header: Header::genesis(
                &config.chain,
                config.genesis.gas_limit,
                config.genesis.timestamp,
                state.state_root()?,
            ),
            transactions: Vec::new(),
            withdrawals: config
                .chain
                .is_activated_at(Eip::Eip4895, 0)
                .then(Vec::new),
        };
        let span = info_span!("devnode", chain_id = config.chain.chain_id);
        info!(parent: &span, genesis = ?genesis.hash(), hardfork = config.chain.hardfork.name(), accounts = config.genesis.alloc.len(), "starting in-memory node");

        let chain: SharedChain = Arc::new(RwLock::new(Box::new(MemoryBlockchain::new(genesis))));
        Ok(Self::new(
            config,
            Box::new(state),
            chain,
            Arc::new(MemoryDb::new()),
            executor,
            clock,
            span,
        ))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn receipts(&self) -> &ReceiptsManager {
        &self.receipts
    }

    pub fn pool(&self) -> RwLockReadGuard<'_, TxPool> {
        self.pool.read()
    }

    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::Acquire)
    }

    pub fn head(&self) -> Result<Block, NodeError> {
        Ok(self.chain.read().canonical_head()?)
    }

    pub fn account(&self, address: &Address) -> Result<Account, NodeError> {
        Ok(self.state.lock().account(address)?.unwrap_or_default())
    }

    /// Checks `tx` against its sender's account and the head block, then
    /// admits it to the pool. In auto mining mode a block is mined right
    /// away.
    pub fn add_transaction(
        &self,
        tx: SignedTransaction,
        options: AdmissionOptions,
    ) -> Result<AddOutcome, NodeError> {
        let account = self.account(&tx.sender())?;
        let head = self.head()?;
        validate_against_account(&tx, &account, &head.header, options.skip_balance)?;

        let outcome = self.pool.write().add(tx)?;
        if self.config.mining.mode == MiningMode::Auto && outcome != AddOutcome::AlreadyKnown {
            match self.mine(MineOptions::default()) {
                // The running miner will pick the transaction up.
                Ok(_) | Err(NodeError::MiningInProgress) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }

    /// Decodes a network encoded transaction and admits it.
    pub fn add_raw_transaction(
        &self,
        raw: &[u8],
        options: AdmissionOptions,
    ) -> Result<(H256, AddOutcome), NodeError> {
        let tx = SignedTransaction::decode(raw)?;
        let hash = tx.hash();
        Ok((hash, self.add_transaction(tx, options)?))
    }

    /// Mines `block_count` blocks on top of the canonical head, filling each
    /// with the best paying pooled transactions.
    pub fn mine(&self, options: MineOptions) -> Result<Vec<BuiltBlock>, NodeError> {
        let _guard = MiningGuard::acquire(&self.mining)?;
        (0..options.block_count)
            .map(|_| self.mine_block(options.interval))
            .collect()
    }

    fn mine_block(&self, interval: Option<u64>) -> Result<BuiltBlock, NodeError> {
        let built = {
            let mut state = self.state.lock();
            let mut chain = self.chain.write();
            let parent = chain.canonical_head()?;
            let timestamp = match interval {
                Some(interval) => parent.header.timestamp + interval,
                None => self.clock.now_secs().max(parent.header.timestamp + 1),
            };

            let mut builder = BlockBuilder::new(
                BuilderContext {
                    state: &mut **state,
                    chain: &mut **chain,
                    executor: &*self.executor,
                    config: &self.config.chain,
                    clock: &*self.clock,
                },
                &parent,
                HeaderOverrides {
                    timestamp: Some(timestamp),
                    coinbase: Some(self.config.mining.coinbase),
                    ..Default::default()
                },
                BuildBlockOptions::default(),
                debug_span!(parent: &self.span, "block", number = parent.number() + 1),
            );

            match self.fill(&mut builder).and_then(|()| builder.build(None)) {
                Ok(built) => built,
                Err(err) => {
                    // A failed build has already rolled itself back.
                    if builder.status() == BuildStatus::Pending {
                        if let Err(revert) = builder.revert() {
                            warn!(parent: &self.span, %revert, "could not revert failed block");
                        }
                    }
                    return Err(err.into());
                }
            }
        };

        if built.displaced.is_empty() {
            self.receipts.save_receipts(&built.block, &built.receipts)?;
            self.pool.write().remove_new_block_txs([&built.block]);
        } else {
            // Displaced receipts go first; they may index the same hashes.
            self.handle_reorganization(&built.displaced, std::slice::from_ref(&built.block))?;
            self.receipts.save_receipts(&built.block, &built.receipts)?;
        }

        info!(
            parent: &self.span,
            number = built.block.number(),
            hash = ?built.block.hash(),
            txs = built.block.transactions.len(),
            gas_used = built.block.header.gas_used,
            "mined block"
        );
        Ok(built)
    }

    fn fill(&self, builder: &mut BlockBuilder<'_>) -> Result<(), BuilderError> {
        builder.init_state()?;
        let candidates = self
            .pool
            .read()
            .txs_by_price_and_nonce(builder.base_fee(), Some(builder.allowed_blobs()));

        for entry in candidates {
            match builder.add_transaction(entry.tx.clone()) {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => {
                    debug!(parent: &self.span, hash = ?entry.hash(), %err, "skipping transaction");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Forgets the receipts of `removed` blocks and updates the pool for a
    /// switch of the canonical chain from `removed` to `added`.
    pub fn handle_reorganization(&self, removed: &[Block], added: &[Block]) -> Result<(), NodeError> {
        for block in removed {
            self.receipts.delete_receipts(block)?;
        }
        self.pool.write().on_chain_reorganization(removed, added);
        debug!(parent: &self.span, removed = removed.len(), added = added.len(), "handled reorganization");
        Ok(())
    }

    pub fn get_transaction_status(&self, hash: &H256) -> TxStatus {
        self.pool.read().get_transaction_status(hash)
    }

    pub fn get_transaction_receipt(&self, hash: H256) -> Result<Option<ReceiptLookup>, NodeError> {
        Ok(self.receipts.get_receipt_by_tx_hash(hash)?)
    }

    pub fn get_logs(
        &self,
        from: u64,
        to: u64,
        addresses: Option<&[Address]>,
        topics: &[TopicFilter],
    ) -> Result<Vec<FilteredLog>, NodeError> {
        Ok(self.receipts.get_logs(from, to, addresses, topics)?)
    }

    /// Expires stale pooled transactions and old handled hashes.
    pub fn cleanup_pool(&self) {
        self.pool.write().cleanup();
    }

    pub fn txpool_content(&self) -> TxPoolContent {
        let state = self.state.lock();
        self.pool.read().content(|address| nonce_of(&**state, address))
    }

    pub fn txpool_status(&self) -> TxPoolStatus {
        let state = self.state.lock();
        self.pool.read().status(|address| nonce_of(&**state, address))
    }

    pub fn txpool_inspect(&self) -> TxPoolInspect {
        let state = self.state.lock();
        self.pool.read().inspect(|address| nonce_of(&**state, address))
    }
}

fn nonce_of(state: &dyn StateManager, address: &Address) -> u64 {
    match state.account(address) {
        Ok(account) => account.map_or(0, |account| account.nonce),
        Err(err) => {
            warn!(?address, %err, "could not read account nonce");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use devnode_common::eth_to_wei;
    use ethereum_types::U256;

    use super::*;
    use crate::{
        clock::ManualClock,
        executor::TX_GAS,
        tx::{FeeMarketTx, SigningKey, Transaction},
    };

    fn key() -> SigningKey {
        SigningKey::from_slice(&[3; 32]).unwrap()
    }

    fn sender() -> Address {
        crate::tx::public_key_to_address(key().verifying_key())
    }

    fn node(mode: MiningMode) -> Node {
        let mut config = NodeConfig::default();
        config.genesis.alloc.insert(sender(), eth_to_wei(10.into()));
        config.mining.mode = mode;
        config.mining.coinbase = Address::repeat_byte(0xc0);
        Node::in_memory(config, Arc::new(ManualClock::new(1_000_000))).unwrap()
    }

    fn transfer(nonce: u64, tip: u64) -> SignedTransaction {
        Transaction::FeeMarket(FeeMarketTx {
            chain_id: 900,
            nonce,
            max_priority_fee_per_gas: tip.into(),
            max_fee_per_gas: 10_000_000_000u64.into(),
            gas_limit: TX_GAS,
            to: Some(Address::repeat_byte(0x22)),
            value: 5.into(),
            ..Default::default()
        })
        .sign(&key())
        .unwrap()
    }

    #[test]
    fn mining_includes_pooled_transactions() {
        let node = node(MiningMode::Manual);
        let tx = transfer(0, 2);
        node.add_transaction(tx.clone(), Default::default()).unwrap();
        assert_eq!(node.get_transaction_status(&tx.hash()), TxStatus::Pending);

        let built = node.mine(MineOptions::default()).unwrap();

        assert_eq!(built.len(), 1);
        assert_eq!(built[0].block.transactions, vec![tx.clone()]);
        assert_eq!(built[0].block.header.timestamp, 1_000);
        assert_eq!(node.head().unwrap(), built[0].block);
        assert_eq!(node.get_transaction_status(&tx.hash()), TxStatus::Mined);
        assert!(node.pool().is_empty());
        assert_eq!(node.account(&sender()).unwrap().nonce, 1);
        assert_eq!(
            node.account(&Address::repeat_byte(0xc0)).unwrap().balance,
            U256::from(2 * TX_GAS)
        );

        let lookup = node.get_transaction_receipt(tx.hash()).unwrap().unwrap();
        assert_eq!(lookup.block_hash, built[0].block.hash());
        assert_eq!(lookup.receipt.status(), Some(true));
    }

    #[test]
    fn interval_spaces_timestamps() {
        let node = node(MiningMode::Manual);
        let built = node
            .mine(MineOptions {
                block_count: 3,
                interval: Some(12),
            })
            .unwrap();

        let timestamps: Vec<_> = built.iter().map(|b| b.block.header.timestamp).collect();
        assert_eq!(timestamps, vec![12, 24, 36]);
        assert_eq!(node.head().unwrap().number(), 3);
        assert!(!node.is_mining());
    }

    #[test]
    fn concurrent_mining_is_rejected() {
        let node = node(MiningMode::Manual);
        let _guard = MiningGuard::acquire(&node.mining).unwrap();

        assert!(matches!(
            node.mine(MineOptions::default()),
            Err(NodeError::MiningInProgress)
        ));
        assert_eq!(node.head().unwrap().number(), 0);
    }

    #[test]
    fn auto_mining_seals_each_transaction() {
        let node = node(MiningMode::Auto);
        node.add_transaction(transfer(0, 1), Default::default()).unwrap();
        node.add_transaction(transfer(1, 1), Default::default()).unwrap();

        assert_eq!(node.head().unwrap().number(), 2);
        assert!(node.pool().is_empty());
    }

    #[test]
    fn admission_uses_the_account() {
        let node = node(MiningMode::Manual);
        node.add_transaction(transfer(0, 1), Default::default()).unwrap();
        node.mine(MineOptions::default()).unwrap();

        assert!(matches!(
            node.add_transaction(transfer(0, 5), Default::default()),
            Err(NodeError::Pool(PoolError::NonceTooLow { .. }))
        ));

        let broke = Transaction::FeeMarket(FeeMarketTx {
            chain_id: 900,
            max_fee_per_gas: 10_000_000_000u64.into(),
            gas_limit: TX_GAS,
            ..Default::default()
        })
        .sign(&SigningKey::from_slice(&[4; 32]).unwrap())
        .unwrap();
        assert!(matches!(
            node.add_transaction(broke.clone(), Default::default()),
            Err(NodeError::Pool(PoolError::InsufficientBalance { .. }))
        ));
        assert_eq!(
            node.add_transaction(broke, AdmissionOptions { skip_balance: true })
                .unwrap(),
            AddOutcome::Added
        );
    }

    #[test]
    fn unpayable_transactions_stay_pooled() {
        let node = node(MiningMode::Manual);
        let broke = Transaction::FeeMarket(FeeMarketTx {
            chain_id: 900,
            max_fee_per_gas: 10_000_000_000u64.into(),
            gas_limit: TX_GAS,
            ..Default::default()
        })
        .sign(&SigningKey::from_slice(&[4; 32]).unwrap())
        .unwrap();
        node.add_transaction(broke.clone(), AdmissionOptions { skip_balance: true })
            .unwrap();

        let built = node.mine(MineOptions::default()).unwrap();

        assert!(built[0].block.transactions.is_empty());
        assert_eq!(node.get_transaction_status(&broke.hash()), TxStatus::Pending);
    }

    #[test]
    fn raw_transactions_are_decoded() {
        let node = node(MiningMode::Manual);
        let tx = transfer(0, 1);
        let (hash, outcome) = node
            .add_raw_transaction(&tx.encode_network(), Default::default())
            .unwrap();

        assert_eq!(hash, tx.hash());
        assert_eq!(outcome, AddOutcome::Added);
        assert!(matches!(
            node.add_raw_transaction(&[0x02, 0xc0], Default::default()),
            Err(NodeError::Tx(_))
        ));
    }

    #[test]
    fn pool_cleanup_expires_stale_transactions() {
        let mut config = NodeConfig::default();
        config.genesis.alloc.insert(sender(), eth_to_wei(10.into()));
        config.pool.pooled_storage_time = Duration::from_secs(60);
        let clock = Arc::new(ManualClock::new(1_000));
        let node = Node::in_memory(config, clock.clone()).unwrap();
        let tx = transfer(0, 1);
        node.add_transaction(tx.clone(), Default::default()).unwrap();

        clock.advance_millis(59_000);
        node.cleanup_pool();
        assert_eq!(node.get_transaction_status(&tx.hash()), TxStatus::Pending);

        clock.advance_millis(2_000);
        node.cleanup_pool();
        assert!(node.pool().is_empty());
        assert_eq!(node.get_transaction_status(&tx.hash()), TxStatus::Unknown);
    }

    #[test]
    fn txpool_views_follow_account_nonces() {
        let node = node(MiningMode::Manual);
        node.add_transaction(transfer(0, 1), Default::default()).unwrap();
        node.add_transaction(transfer(2, 1), Default::default()).unwrap();

        assert_eq!(
            node.txpool_status(),
            TxPoolStatus {
                pending: 1,
                queued: 1
            }
        );
        assert!(node.txpool_content().queued[&sender()].contains_key(&2));
        assert_eq!(node.txpool_inspect().pending[&sender()].len(), 1);
    }
}
