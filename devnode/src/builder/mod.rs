//! Assembles one block on top of a parent.
//!
//! A [`BlockBuilder`] executes transactions against the state one at a time
//! and finally seals the block with [`BlockBuilder::build`], or throws
//! everything away with [`BlockBuilder::revert`]. Every state write it makes,
//! system contract updates and rewards included, happens inside a single
//! state checkpoint that is committed by `build` and rolled back by `revert`.

use bytes::Bytes;
use devnode_common::{
    gwei_to_wei, ChainConfig, ConsensusType, Eip, BLOB_GAS_PER_BLOB, EMPTY_TRIE_HASH,
    INITIAL_BASE_FEE,
};
use ethereum_types::{Address, Bloom, H256, H64, U256};
use mpt_trie::{ordered_trie_root, TrieOpError};
use thiserror::Error;
use tracing::{debug, warn, Span};

use crate::{
    block::{Block, Header, Withdrawal},
    chain::{Blockchain, ChainError},
    clock::Clock,
    executor::{BlockEnv, ExecutionError, ExecutionResult, TxExecutor},
    receipt::{logs_bloom, ReceiptOutcome, TxReceipt},
    state::{StateError, StateManager},
    tx::{SignedTransaction, Transaction},
};

mod checkpoint;
mod system;

pub use checkpoint::{Checkpoint, InvalidTransition, Transition};

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("transaction gas limit {gas_limit} exceeds the remaining block gas {remaining}")]
    GasLimitExceeded { gas_limit: u64, remaining: u64 },
    #[error("blob transactions are not enabled at block {0}")]
    BlobsNotEnabled(u64),
    #[error("blobs missing for blob transaction {0:?}")]
    MissingBlobs(H256),
    #[error("block blob gas limit reached: {used} + {needed} > {limit}")]
    BlobGasLimitExceeded { used: u64, needed: u64, limit: u64 },
    #[error("block has already been built")]
    AlreadyBuilt,
    #[error("block has already been reverted")]
    AlreadyReverted,
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Checkpoint(#[from] InvalidTransition),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Trie(#[from] TrieOpError),
}

impl BuilderError {
    /// Whether the builder is still usable: the transaction was not included
    /// but others may be.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BuilderError::GasLimitExceeded { .. }
            | BuilderError::BlobsNotEnabled(_)
            | BuilderError::MissingBlobs(_)
            | BuilderError::BlobGasLimitExceeded { .. } => true,
            BuilderError::Execution(err) => !matches!(err, ExecutionError::State(_)),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    Pending,
    Built(H256),
    Reverted,
}

/// Header fields to use instead of the ones derived from the parent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderOverrides {
    pub number: Option<u64>,
    pub timestamp: Option<u64>,
    pub gas_limit: Option<u64>,
    pub base_fee: Option<U256>,
    pub excess_blob_gas: Option<u64>,
    pub coinbase: Option<Address>,
    pub prev_randao: Option<H256>,
    pub parent_beacon_block_root: Option<H256>,
    pub extra_data: Option<Bytes>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildBlockOptions {
    /// Store the block in the blockchain when it is built.
    pub put_block_into_blockchain: bool,
    /// Withdrawals to credit. Defaults to none once Shanghai is active.
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Default for BuildBlockOptions {
    fn default() -> Self {
        Self {
            put_block_into_blockchain: true,
            withdrawals: None,
        }
    }
}

/// Proof-of-work seal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SealOptions {
    pub nonce: H64,
    pub mix_hash: H256,
}

/// Collaborators a builder works against, borrowed for its lifetime.
pub struct BuilderContext<'a> {
    pub state: &'a mut dyn StateManager,
    pub chain: &'a mut dyn Blockchain,
    pub executor: &'a dyn TxExecutor,
    pub config: &'a ChainConfig,
    pub clock: &'a dyn Clock,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltBlock {
    pub block: Block,
    pub receipts: Vec<TxReceipt>,
    /// Priority fees earned by the coinbase.
    pub miner_value: U256,
    /// Canonical blocks the new block replaced, lowest first. Empty unless
    /// the block was stored on a parent below the canonical head.
    pub displaced: Vec<Block>,
}

pub struct BlockBuilder<'a> {
    ctx: BuilderContext<'a>,
    header: Header,
    withdrawals: Option<Vec<Withdrawal>>,
    put_block_into_blockchain: bool,
    transactions: Vec<SignedTransaction>,
    receipts: Vec<TxReceipt>,
    gas_used: u64,
    blob_gas_used: u64,
    miner_value: U256,
    checkpoint: Checkpoint,
    status: BuildStatus,
    span: Span,
}

impl std::fmt::Debug for BlockBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBuilder")
            .field("number", &self.header.number)
            .field("transactions", &self.transactions.len())
            .field("gas_used", &self.gas_used)
            .field("checkpoint", &self.checkpoint)
            .field("status", &self.status)
            .finish()
    }
}

impl<'a> BlockBuilder<'a> {
    /// Starts a block on top of `parent`. Header fields missing from
    /// `overrides` follow the consensus rules for the child of `parent`.
    pub fn new(
        ctx: BuilderContext<'a>,
        parent: &Block,
        overrides: HeaderOverrides,
        options: BuildBlockOptions,
        span: Span,
    ) -> Self {
        let config = ctx.config;
        let number = overrides.number.unwrap_or(parent.number() + 1);
        let at_london_block = config.london_activation() == Some(number);

        let gas_limit = overrides.gas_limit.unwrap_or(match at_london_block {
            true => parent.header.gas_limit * 2,
            false => parent.header.gas_limit,
        });

        let base_fee_per_gas = config.is_activated_at(Eip::Eip1559, number).then(|| {
            overrides.base_fee.unwrap_or_else(|| match at_london_block {
                true => INITIAL_BASE_FEE.into(),
                false => parent
                    .header
                    .next_base_fee()
                    .unwrap_or(INITIAL_BASE_FEE.into()),
            })
        });

        let cancun = config.is_activated_at(Eip::Eip4844, number);
        let excess_blob_gas = cancun.then(|| {
            overrides
                .excess_blob_gas
                .unwrap_or_else(|| parent.header.next_excess_blob_gas(&config.blob_params()))
        });

        let withdrawals = options.withdrawals.or_else(|| {
            config
                .is_activated_at(Eip::Eip4895, number)
                .then(Vec::new)
        });

        let header = Header {
            parent_hash: parent.hash(),
            coinbase: overrides.coinbase.unwrap_or_default(),
            number,
            gas_limit,
            timestamp: overrides
                .timestamp
                .unwrap_or_else(|| ctx.clock.now_secs()),
            extra_data: overrides.extra_data.unwrap_or_default(),
            mix_hash: overrides.prev_randao.unwrap_or_default(),
            base_fee_per_gas,
            withdrawals_root: withdrawals.as_ref().map(|_| EMPTY_TRIE_HASH),
            blob_gas_used: cancun.then_some(0),
            excess_blob_gas,
            parent_beacon_block_root: config
                .is_activated_at(Eip::Eip4788, number)
                .then(|| overrides.parent_beacon_block_root.unwrap_or_default()),
            ..Default::default()
        };

        debug!(parent: &span, number, gas_limit, base_fee = ?header.base_fee_per_gas, "starting block");
        Self {
            ctx,
            header,
            withdrawals,
            put_block_into_blockchain: options.put_block_into_blockchain,
            transactions: Vec::new(),
            receipts: Vec::new(),
            gas_used: 0,
            blob_gas_used: 0,
            miner_value: U256::zero(),
            checkpoint: Checkpoint::NotStarted,
            status: BuildStatus::Pending,
            span,
        }
    }

    fn check_status(&self) -> Result<(), BuilderError> {
        match self.status {
            BuildStatus::Pending => Ok(()),
            BuildStatus::Built(_) => Err(BuilderError::AlreadyBuilt),
            BuildStatus::Reverted => Err(BuilderError::AlreadyReverted),
        }
    }

    fn transition(&mut self, transition: Transition) -> Result<(), BuilderError> {
        self.checkpoint.apply(transition, self.ctx.state)?;
        Ok(())
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn base_fee(&self) -> Option<U256> {
        self.header.base_fee_per_gas
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn blob_gas_used(&self) -> u64 {
        self.blob_gas_used
    }

    pub fn miner_value(&self) -> U256 {
        self.miner_value
    }

    pub fn transaction_receipts(&self) -> &[TxReceipt] {
        &self.receipts
    }

    /// Number of blobs that still fit in the block; zero before Cancun.
    pub fn allowed_blobs(&self) -> usize {
        if self.header.excess_blob_gas.is_none() {
            return 0;
        }
        let limit = self.ctx.config.blob_params().max_blob_gas_per_block();
        (limit.saturating_sub(self.blob_gas_used) / BLOB_GAS_PER_BLOB) as usize
    }

    fn block_env(&self) -> BlockEnv {
        BlockEnv {
            chain_id: self.ctx.config.chain_id,
            number: self.header.number,
            timestamp: self.header.timestamp,
            coinbase: self.header.coinbase,
            gas_limit: self.header.gas_limit,
            base_fee: self.header.base_fee_per_gas,
            blob_base_fee: self
                .header
                .blob_base_fee(&self.ctx.config.blob_params()),
            prev_randao: self.header.mix_hash,
        }
    }

    /// Writes the system contract storage required by the active forks. Call
    /// before the first transaction.
    pub fn init_state(&mut self) -> Result<(), BuilderError> {
        self.check_status()?;
        let config = self.ctx.config;
        let number = self.header.number;

        if config.is_activated_at(Eip::Eip4788, number) {
            self.transition(Transition::Open)?;
            system::accumulate_parent_beacon_block_root(
                self.ctx.state,
                self.header.parent_beacon_block_root.unwrap_or_default(),
                self.header.timestamp,
            )?;
        }
        if config.is_activated_at(Eip::Eip2935, number) {
            self.transition(Transition::Open)?;
            system::accumulate_parent_block_hash(
                self.ctx.state,
                number,
                self.header.parent_hash,
            )?;
        }
        Ok(())
    }

    /// Executes `tx` and appends it to the block.
    ///
    /// A transaction that does not fit, or fails execution, is rejected with
    /// the state left as it was; the builder stays usable in that case (see
    /// [`BuilderError::is_recoverable`]).
    pub fn add_transaction(
        &mut self,
        tx: SignedTransaction,
    ) -> Result<ExecutionResult, BuilderError> {
        self.check_status()?;
        self.transition(Transition::Open)?;

        let remaining = self.header.gas_limit.saturating_sub(self.gas_used);
        if tx.gas_limit() > remaining {
            return Err(BuilderError::GasLimitExceeded {
                gas_limit: tx.gas_limit(),
                remaining,
            });
        }

        let number = self.header.number;
        let is_blob = matches!(tx.transaction(), Transaction::Blob(_));
        let blob_gas = match is_blob {
            false => 0,
            true => {
                if !self.ctx.config.is_activated_at(Eip::Eip4844, number) {
                    return Err(BuilderError::BlobsNotEnabled(number));
                }
                if !tx.has_sidecar() {
                    return Err(BuilderError::MissingBlobs(tx.hash()));
                }
                let needed = tx.blob_gas();
                let limit = self.ctx.config.blob_params().max_blob_gas_per_block();
                if self.blob_gas_used + needed > limit {
                    return Err(BuilderError::BlobGasLimitExceeded {
                        used: self.blob_gas_used,
                        needed,
                        limit,
                    });
                }
                needed
            }
        };

        let env = self.block_env();
        self.ctx.state.checkpoint();
        let result = match self.ctx.executor.execute(self.ctx.state, &env, &tx) {
            Ok(result) => {
                self.ctx.state.commit()?;
                result
            }
            Err(err) => {
                self.ctx.state.revert()?;
                debug!(parent: &self.span, hash = ?tx.hash(), %err, "transaction rejected");
                return Err(err.into());
            }
        };

        self.gas_used += result.gas_used;
        self.blob_gas_used += blob_gas;
        self.miner_value += result.miner_value;

        let outcome = if !self.ctx.config.is_activated_at(Eip::Eip658, number) {
            ReceiptOutcome::StateRoot(self.ctx.state.state_root()?)
        } else if is_blob {
            ReceiptOutcome::Blob {
                status: result.success,
                blob_gas_used: blob_gas,
                blob_gas_price: env.blob_base_fee.unwrap_or_default(),
            }
        } else {
            ReceiptOutcome::Status(result.success)
        };
        self.receipts.push(TxReceipt {
            outcome,
            cumulative_block_gas_used: self.gas_used,
            logs_bloom: logs_bloom(&result.logs),
            logs: result.logs.clone(),
        });

        debug!(parent: &self.span, hash = ?tx.hash(), gas_used = result.gas_used, "transaction included");
        self.transactions.push(tx.into_minimal());
        Ok(result)
    }

    /// Finalizes the block: rewards, withdrawals, roots. The block is stored
    /// in the blockchain unless disabled in [`BuildBlockOptions`], and the
    /// state checkpoint is committed.
    ///
    /// On failure every state change of the builder is rolled back and the
    /// builder ends up [`BuildStatus::Reverted`].
    pub fn build(&mut self, seal: Option<SealOptions>) -> Result<BuiltBlock, BuilderError> {
        self.check_status()?;
        self.transition(Transition::Open)?;

        let err = match self.finish(seal) {
            Ok(built) => return Ok(built),
            Err(err) => err,
        };
        if self.checkpoint == Checkpoint::Open {
            if let Err(rollback) = self.transition(Transition::RollBack) {
                warn!(parent: &self.span, %rollback, "could not roll back failed block");
            }
        }
        self.status = BuildStatus::Reverted;
        debug!(parent: &self.span, number = self.header.number, %err, "block build failed");
        Err(err)
    }

    fn finish(&mut self, seal: Option<SealOptions>) -> Result<BuiltBlock, BuilderError> {
        let config = self.ctx.config;
        let proof_of_work = config.consensus == ConsensusType::ProofOfWork;

        if proof_of_work {
            self.ctx
                .state
                .add_balance(self.header.coinbase, config.miner_reward)?;
        }
        for withdrawal in self.withdrawals.iter().flatten() {
            // Zero amounts do not touch the account.
            if withdrawal.amount == 0 {
                continue;
            }
            self.ctx
                .state
                .add_balance(withdrawal.address, gwei_to_wei(withdrawal.amount.into()))?;
        }

        let mut header = self.header.clone();
        header.state_root = self.ctx.state.state_root()?;
        header.transactions_root =
            ordered_trie_root(self.transactions.iter().map(|tx| tx.encode().to_vec()))?;
        header.withdrawals_root = self
            .withdrawals
            .as_ref()
            .map(|withdrawals| ordered_trie_root(withdrawals.iter().map(|w| rlp::encode(w).to_vec())))
            .transpose()?;
        header.receipts_root = match self.receipts.is_empty() {
            true => EMPTY_TRIE_HASH,
            false => ordered_trie_root(
                self.receipts
                    .iter()
                    .zip(&self.transactions)
                    .map(|(receipt, tx)| receipt.encode_consensus(tx.tx_type())),
            )?,
        };
        header.logs_bloom = self.receipts.iter().fold(Bloom::zero(), |mut bloom, receipt| {
            bloom.accrue_bloom(&receipt.logs_bloom);
            bloom
        });
        header.gas_used = self.gas_used;
        if header.excess_blob_gas.is_some() {
            header.blob_gas_used = Some(self.blob_gas_used);
        }
        if let (true, Some(seal)) = (proof_of_work, seal) {
            header.nonce = seal.nonce;
            header.mix_hash = seal.mix_hash;
        }

        let block = Block {
            header,
            transactions: std::mem::take(&mut self.transactions),
            withdrawals: self.withdrawals.take(),
        };
        let displaced = match self.put_block_into_blockchain {
            true => self.ctx.chain.put_block(block.clone())?,
            false => Vec::new(),
        };
        self.transition(Transition::Commit)?;

        let hash = block.hash();
        self.status = BuildStatus::Built(hash);
        debug!(parent: &self.span, number = block.number(), ?hash, txs = block.transactions.len(), gas_used = self.gas_used, "block built");

        Ok(BuiltBlock {
            block,
            receipts: std::mem::take(&mut self.receipts),
            miner_value: self.miner_value,
            displaced,
        })
    }

    /// Discards every state change made by this builder. Fails once the
    /// builder is built or reverted.
    pub fn revert(&mut self) -> Result<(), BuilderError> {
        self.check_status()?;
        self.transition(Transition::RollBack)?;
        self.status = BuildStatus::Reverted;
        debug!(parent: &self.span, number = self.header.number, "block reverted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use devnode_common::{
        eth_to_wei, Hardfork, BEACON_ROOTS_ADDRESS, HISTORY_BUFFER_LENGTH,
        HISTORY_STORAGE_ADDRESS,
    };

    use super::*;
    use crate::{
        chain::MemoryBlockchain,
        clock::ManualClock,
        executor::{TransferExecutor, TX_GAS},
        state::MemoryState,
        tx::{BlobSidecar, BlobTx, FeeMarketTx, LegacyTx, SigningKey},
    };

    const GAS_LIMIT: u64 = 30_000_000;

    fn key() -> SigningKey {
        SigningKey::from_slice(&[7; 32]).unwrap()
    }

    fn sender() -> Address {
        crate::tx::public_key_to_address(key().verifying_key())
    }

    struct Harness {
        state: MemoryState,
        chain: MemoryBlockchain,
        config: ChainConfig,
        clock: ManualClock,
        genesis: Block,
    }

    impl Harness {
        fn new(config: ChainConfig) -> Self {
            let state = MemoryState::with_balances([(sender(), eth_to_wei(100.into()))]);
            let genesis = Block {
                header: Header::genesis(&config, GAS_LIMIT, 0, state.state_root().unwrap()),
                ..Default::default()
            };
            Self {
                state,
                chain: MemoryBlockchain::new(genesis.clone()),
                config,
                clock: ManualClock::new(12_000),
                genesis,
            }
        }

        fn builder(&mut self, options: BuildBlockOptions) -> BlockBuilder<'_> {
            self.builder_with(HeaderOverrides::default(), options)
        }

        fn builder_with(
            &mut self,
            overrides: HeaderOverrides,
            options: BuildBlockOptions,
        ) -> BlockBuilder<'_> {
            BlockBuilder::new(
                BuilderContext {
                    state: &mut self.state,
                    chain: &mut self.chain,
                    executor: &TransferExecutor,
                    config: &self.config,
                    clock: &self.clock,
                },
                &self.genesis,
                overrides,
                options,
                Span::none(),
            )
        }
    }

    fn transfer(nonce: u64, gas_limit: u64) -> SignedTransaction {
        Transaction::FeeMarket(FeeMarketTx {
            chain_id: 900,
            nonce,
            max_priority_fee_per_gas: 1_000.into(),
            max_fee_per_gas: 10_000_000_000u64.into(),
            gas_limit,
            to: Some(Address::repeat_byte(0x22)),
            value: 1.into(),
            ..Default::default()
        })
        .sign(&key())
        .unwrap()
    }

    fn blob(nonce: u64, blobs: usize, sidecar: bool) -> SignedTransaction {
        let item = || vec![Bytes::from_static(b"blob"); blobs];
        Transaction::Blob(BlobTx {
            chain_id: 900,
            nonce,
            max_priority_fee_per_gas: 1.into(),
            max_fee_per_gas: 10_000_000_000u64.into(),
            gas_limit: TX_GAS,
            to: Address::repeat_byte(0x33),
            max_fee_per_blob_gas: 10.into(),
            blob_versioned_hashes: vec![H256::repeat_byte(1); blobs],
            sidecar: sidecar.then(|| BlobSidecar {
                blobs: item(),
                commitments: item(),
                proofs: item(),
            }),
            ..Default::default()
        })
        .sign(&key())
        .unwrap()
    }

    #[test]
    fn empty_block_follows_parent() {
        let mut harness = Harness::new(ChainConfig::default());
        let expected_base_fee = harness.genesis.header.next_base_fee();
        let genesis_hash = harness.genesis.hash();

        let built = harness.builder(Default::default()).build(None).unwrap();
        let header = &built.block.header;

        assert_eq!(header.number, 1);
        assert_eq!(header.parent_hash, genesis_hash);
        assert_eq!(header.timestamp, 12);
        assert_eq!(header.gas_limit, GAS_LIMIT);
        assert_eq!(header.base_fee_per_gas, expected_base_fee);
        assert_eq!(header.transactions_root, EMPTY_TRIE_HASH);
        assert_eq!(header.receipts_root, EMPTY_TRIE_HASH);
        assert_eq!(header.withdrawals_root, Some(EMPTY_TRIE_HASH));
        assert_eq!(header.blob_gas_used, Some(0));
        assert_eq!(harness.chain.canonical_head().unwrap(), built.block);
        assert_eq!(harness.state.checkpoint_depth(), 0);
    }

    #[test]
    fn included_transactions_shape_the_block() {
        let mut harness = Harness::new(ChainConfig::default());
        let txs = [transfer(0, TX_GAS), transfer(1, 50_000)];

        let mut builder = harness.builder(Default::default());
        for tx in &txs {
            builder.add_transaction(tx.clone()).unwrap();
        }
        assert_eq!(builder.gas_used(), 2 * TX_GAS);
        let receipts: Vec<_> = builder
            .transaction_receipts()
            .iter()
            .map(|r| r.cumulative_block_gas_used)
            .collect();
        assert_eq!(receipts, vec![TX_GAS, 2 * TX_GAS]);

        let built = builder.build(None).unwrap();
        let header = &built.block.header;
        assert_eq!(header.gas_used, 2 * TX_GAS);
        assert_eq!(
            header.transactions_root,
            ordered_trie_root(txs.iter().map(|tx| tx.encode().to_vec())).unwrap()
        );
        assert_ne!(header.receipts_root, EMPTY_TRIE_HASH);
        assert_eq!(header.state_root, harness.state.state_root().unwrap());
        assert_eq!(built.miner_value, U256::from(2 * TX_GAS * 1_000));
        assert_eq!(
            harness.state.account(&sender()).unwrap().unwrap().nonce,
            2
        );
    }

    #[test]
    fn rejected_transactions_leave_no_trace() {
        let mut harness = Harness::new(ChainConfig::default());
        let root = harness.state.state_root().unwrap();
        let mut builder = harness.builder(Default::default());

        let err = builder.add_transaction(transfer(0, GAS_LIMIT + 1)).unwrap_err();
        assert!(matches!(err, BuilderError::GasLimitExceeded { .. }));
        assert!(err.is_recoverable());

        // Nonce 1 before nonce 0 fails execution.
        let err = builder.add_transaction(transfer(1, TX_GAS)).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::Execution(ExecutionError::NonceMismatch { .. })
        ));
        assert!(err.is_recoverable());

        assert_eq!(builder.gas_used(), 0);
        assert!(builder.transaction_receipts().is_empty());
        builder.add_transaction(transfer(0, TX_GAS)).unwrap();
        builder.revert().unwrap();
        assert_eq!(harness.state.state_root().unwrap(), root);
    }

    #[test]
    fn terminal_states_reject_everything() {
        let mut harness = Harness::new(ChainConfig::default());

        let mut builder = harness.builder(Default::default());
        builder.revert().unwrap();
        assert_eq!(builder.status(), BuildStatus::Reverted);
        assert_eq!(builder.checkpoint(), Checkpoint::RolledBack);
        assert!(matches!(
            builder.add_transaction(transfer(0, TX_GAS)),
            Err(BuilderError::AlreadyReverted)
        ));
        assert!(matches!(builder.revert(), Err(BuilderError::AlreadyReverted)));
        assert!(matches!(builder.build(None), Err(BuilderError::AlreadyReverted)));

        let mut builder = harness.builder(Default::default());
        builder.build(None).unwrap();
        assert!(matches!(builder.build(None), Err(BuilderError::AlreadyBuilt)));
        assert!(matches!(builder.revert(), Err(BuilderError::AlreadyBuilt)));
    }

    #[test]
    fn sibling_of_the_head_reports_displaced_blocks() {
        let mut harness = Harness::new(ChainConfig::default());
        let first = harness.builder(Default::default()).build(None).unwrap();
        assert!(first.displaced.is_empty());

        let second = harness
            .builder_with(
                HeaderOverrides {
                    extra_data: Some(Bytes::from_static(b"fork")),
                    ..Default::default()
                },
                Default::default(),
            )
            .build(None)
            .unwrap();

        assert_eq!(second.displaced, vec![first.block]);
        assert_eq!(harness.chain.canonical_head().unwrap(), second.block);
    }

    #[test]
    fn failed_build_rolls_back_and_is_terminal() {
        let mut harness = Harness::new(ChainConfig {
            hardfork: Hardfork::London,
            consensus: ConsensusType::ProofOfWork,
            ..Default::default()
        });
        let root = harness.state.state_root().unwrap();

        // Number 5 cannot follow genesis, so storing the block fails after
        // the miner reward was credited.
        let mut builder = harness.builder_with(
            HeaderOverrides {
                number: Some(5),
                ..Default::default()
            },
            Default::default(),
        );
        assert!(matches!(
            builder.build(None),
            Err(BuilderError::Chain(ChainError::InvalidNumber { number: 5, .. }))
        ));
        assert_eq!(builder.status(), BuildStatus::Reverted);
        assert_eq!(builder.checkpoint(), Checkpoint::RolledBack);
        assert!(matches!(builder.build(None), Err(BuilderError::AlreadyReverted)));

        assert_eq!(harness.state.account(&Address::zero()).unwrap(), None);
        assert_eq!(harness.state.state_root().unwrap(), root);
        assert_eq!(harness.state.checkpoint_depth(), 0);
        assert_eq!(harness.chain.canonical_head().unwrap(), harness.genesis);
    }

    #[test]
    fn blob_inclusion_rules() {
        let mut harness = Harness::new(ChainConfig::default());
        let mut builder = harness.builder(Default::default());
        assert_eq!(builder.allowed_blobs(), 6);

        assert!(matches!(
            builder.add_transaction(blob(0, 1, false)),
            Err(BuilderError::MissingBlobs(_))
        ));
        assert!(matches!(
            builder.add_transaction(blob(0, 7, true)),
            Err(BuilderError::BlobGasLimitExceeded { .. })
        ));

        let tx = blob(0, 2, true);
        builder.add_transaction(tx.clone()).unwrap();
        assert_eq!(builder.blob_gas_used(), 2 * BLOB_GAS_PER_BLOB);
        assert_eq!(builder.allowed_blobs(), 4);
        assert_eq!(
            builder.transaction_receipts()[0].outcome,
            ReceiptOutcome::Blob {
                status: true,
                blob_gas_used: 2 * BLOB_GAS_PER_BLOB,
                blob_gas_price: U256::one(),
            }
        );

        let built = builder.build(None).unwrap();
        let included = &built.block.transactions[0];
        assert!(!included.has_sidecar());
        assert_eq!(included.hash(), tx.hash());
        assert_eq!(built.block.header.blob_gas_used, Some(2 * BLOB_GAS_PER_BLOB));
    }

    #[test]
    fn blobs_need_cancun() {
        let mut harness = Harness::new(ChainConfig {
            hardfork: Hardfork::Shanghai,
            ..Default::default()
        });
        let mut builder = harness.builder(Default::default());

        assert_eq!(builder.allowed_blobs(), 0);
        assert!(matches!(
            builder.add_transaction(blob(0, 1, true)),
            Err(BuilderError::BlobsNotEnabled(1))
        ));
    }

    #[test]
    fn proof_of_work_rewards_and_seals() {
        let mut harness = Harness::new(ChainConfig {
            hardfork: Hardfork::London,
            consensus: ConsensusType::ProofOfWork,
            ..Default::default()
        });
        let seal = SealOptions {
            nonce: H64::repeat_byte(1),
            mix_hash: H256::repeat_byte(2),
        };

        let built = harness.builder(Default::default()).build(Some(seal)).unwrap();

        assert_eq!(built.block.header.nonce, seal.nonce);
        assert_eq!(built.block.header.mix_hash, seal.mix_hash);
        assert_eq!(
            harness.state.account(&Address::zero()).unwrap().unwrap().balance,
            eth_to_wei(2.into())
        );
    }

    #[test]
    fn withdrawals_are_credited_in_wei() {
        let mut harness = Harness::new(ChainConfig::default());
        let withdrawals = vec![
            Withdrawal {
                index: 0,
                validator_index: 1,
                address: Address::repeat_byte(0x44),
                amount: 3,
            },
            Withdrawal {
                index: 1,
                validator_index: 1,
                address: Address::repeat_byte(0x55),
                amount: 0,
            },
        ];

        let built = harness
            .builder(BuildBlockOptions {
                withdrawals: Some(withdrawals.clone()),
                ..Default::default()
            })
            .build(None)
            .unwrap();

        assert_eq!(
            harness
                .state
                .account(&Address::repeat_byte(0x44))
                .unwrap()
                .unwrap()
                .balance,
            U256::from(3_000_000_000u64)
        );
        assert_eq!(harness.state.account(&Address::repeat_byte(0x55)).unwrap(), None);
        assert_eq!(
            built.block.header.withdrawals_root,
            Some(
                ordered_trie_root(withdrawals.iter().map(|w| rlp::encode(w).to_vec())).unwrap()
            )
        );
        assert_eq!(built.block.withdrawals, Some(withdrawals));
    }

    #[test]
    fn init_state_writes_system_contracts() {
        let mut harness = Harness::new(ChainConfig {
            hardfork: Hardfork::Prague,
            ..Default::default()
        });
        let genesis_hash = harness.genesis.hash();

        let mut builder = harness.builder(Default::default());
        builder.init_state().unwrap();
        assert_eq!(builder.checkpoint(), Checkpoint::Open);
        builder.revert().unwrap();
        assert_eq!(
            harness
                .state
                .storage(&HISTORY_STORAGE_ADDRESS, &H256::zero())
                .unwrap(),
            H256::zero()
        );

        let mut builder = harness.builder(Default::default());
        builder.init_state().unwrap();
        builder.build(None).unwrap();
        assert_eq!(
            harness
                .state
                .storage(&HISTORY_STORAGE_ADDRESS, &H256::zero())
                .unwrap(),
            genesis_hash
        );
        assert_eq!(
            harness
                .state
                .storage(&BEACON_ROOTS_ADDRESS, &H256::from_low_u64_be(12 % HISTORY_BUFFER_LENGTH))
                .unwrap(),
            H256::from_low_u64_be(12)
        );
    }

    #[test]
    fn london_activation_block() {
        let mut harness = Harness::new(ChainConfig {
            hardfork: Hardfork::London,
            london_block: 1,
            ..Default::default()
        });
        assert_eq!(harness.genesis.header.base_fee_per_gas, None);

        let built = harness.builder(Default::default()).build(None).unwrap();
        assert_eq!(built.block.header.gas_limit, 2 * GAS_LIMIT);
        assert_eq!(
            built.block.header.base_fee_per_gas,
            Some(INITIAL_BASE_FEE.into())
        );
    }

    #[test]
    fn pre_byzantium_receipts_carry_state_roots() {
        let mut harness = Harness::new(ChainConfig {
            hardfork: Hardfork::Homestead,
            ..Default::default()
        });
        let tx = Transaction::Legacy(LegacyTx {
            chain_id: Some(900),
            gas_price: 1.into(),
            gas_limit: TX_GAS,
            to: Some(Address::repeat_byte(0x22)),
            ..Default::default()
        })
        .sign(&key())
        .unwrap();

        let mut builder = harness.builder(Default::default());
        builder.add_transaction(tx).unwrap();
        let built = builder.build(None).unwrap();

        assert_eq!(
            built.receipts[0].outcome,
            ReceiptOutcome::StateRoot(harness.state.state_root().unwrap())
        );
    }
}
