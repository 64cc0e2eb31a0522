#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use devnode::{
    clock::ManualClock,
    common::{eth_to_wei, gwei_to_wei},
    config::{NodeConfig, PoolConfig},
    executor::{BlockEnv, ExecutionError, ExecutionResult, TransferExecutor, TxExecutor},
    node::Node,
    receipt::Log,
    state::StateManager,
    tx::{public_key_to_address, FeeMarketTx, SignedTransaction, SigningKey, Transaction},
    txpool::TxPool,
};
use ethereum_types::{Address, H256, U256};
use rlp::{Rlp, RlpStream};
use tracing::Span;

pub const CHAIN_ID: u64 = 900;

pub fn key(n: u8) -> SigningKey {
    SigningKey::from_slice(&[n; 32]).unwrap()
}

pub fn addr(n: u8) -> Address {
    public_key_to_address(key(n).verifying_key())
}

pub fn topic(n: u8) -> H256 {
    H256::repeat_byte(n)
}

/// A fee market transfer with a 100 gwei fee cap.
pub fn txn(signer: u8, nonce: u64, tip_gwei: u64) -> SignedTransaction {
    txn_with(signer, nonce, tip_gwei, 100, Bytes::new())
}

pub fn txn_with(
    signer: u8,
    nonce: u64,
    tip_gwei: u64,
    max_fee_gwei: u64,
    data: Bytes,
) -> SignedTransaction {
    Transaction::FeeMarket(FeeMarketTx {
        chain_id: CHAIN_ID,
        nonce,
        max_priority_fee_per_gas: gwei_to_wei(tip_gwei.into()),
        max_fee_per_gas: gwei_to_wei(max_fee_gwei.into()),
        gas_limit: 100_000,
        to: Some(Address::repeat_byte(0xee)),
        value: U256::one(),
        data,
        ..Default::default()
    })
    .sign(&key(signer))
    .unwrap()
}

pub fn pool() -> TxPool {
    TxPool::new(
        PoolConfig::default(),
        Some(CHAIN_ID),
        Arc::new(ManualClock::default()),
        Span::none(),
    )
}

/// Calldata understood by [`LogEmitter`]: one topic list per log.
pub fn emit(logs: &[&[H256]]) -> Bytes {
    let mut s = RlpStream::new_list(logs.len());
    for topics in logs {
        s.append_list::<H256, H256>(topics);
    }
    s.out().freeze()
}

/// Executes transfers, then emits a log from the recipient for every topic
/// list encoded in the calldata by [`emit`].
#[derive(Debug, Default)]
pub struct LogEmitter;

impl TxExecutor for LogEmitter {
    fn execute(
        &self,
        state: &mut dyn StateManager,
        env: &BlockEnv,
        tx: &SignedTransaction,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut result = TransferExecutor.execute(state, env, tx)?;
        let (Some(to), false) = (tx.to(), tx.data().is_empty()) else {
            return Ok(result);
        };
        result.logs = Rlp::new(tx.data())
            .iter()
            .filter_map(|topics| topics.as_list::<H256>().ok())
            .map(|topics| Log {
                address: to,
                topics,
                data: Bytes::new(),
            })
            .collect();
        Ok(result)
    }
}

/// A manually mined node funding the accounts of signers `1..=funded`.
pub fn node(funded: u8) -> Node {
    let mut config = NodeConfig::default();
    for n in 1..=funded {
        config.genesis.alloc.insert(addr(n), eth_to_wei(100.into()));
    }
    Node::with_executor(
        config,
        Box::new(LogEmitter),
        Arc::new(ManualClock::new(1_700_000_000_000)),
    )
    .unwrap()
}
