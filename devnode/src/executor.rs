//! Applying a single transaction to state.
//!
//! The opcode interpreter is out of scope. [`TxExecutor`] is the seam a VM
//! plugs into; [`TransferExecutor`] implements the part of execution every
//! transaction shares: validation against the sender account, fee payment,
//! value transfer and the coinbase tip.

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use rlp::RlpStream;
use thiserror::Error;

use crate::{
    receipt::Log,
    state::{Account, StateError, StateManager},
    tx::{SignedTransaction, Transaction},
};

pub const TX_GAS: u64 = 21_000;
pub const TX_CREATE_GAS: u64 = 32_000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;
pub const ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;
pub const ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;

/// Block level values visible to execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEnv {
    pub chain_id: u64,
    pub number: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    pub gas_limit: u64,
    pub base_fee: Option<U256>,
    pub blob_base_fee: Option<U256>,
    pub prev_randao: H256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Gas charged to the sender, refunds applied.
    pub gas_used: u64,
    /// Priority fees credited to the coinbase.
    pub miner_value: U256,
    pub success: bool,
    pub logs: Vec<Log>,
    pub created_address: Option<Address>,
}

/// A transaction that cannot be included. State is left untouched.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("transaction chain id {got} does not match {expected}")]
    ChainIdMismatch { expected: u64, got: u64 },
    #[error("nonce mismatch for {sender:?}: expected {expected}, got {got}")]
    NonceMismatch {
        sender: Address,
        expected: u64,
        got: u64,
    },
    #[error("intrinsic gas {intrinsic} exceeds the gas limit {gas_limit}")]
    IntrinsicGasTooLow { intrinsic: u64, gas_limit: u64 },
    #[error("max fee per gas {max_fee} is below the base fee {base_fee}")]
    FeeCapTooLow { max_fee: U256, base_fee: U256 },
    #[error("max fee per blob gas {max_fee} is below the blob base fee {blob_base_fee}")]
    BlobFeeCapTooLow { max_fee: U256, blob_base_fee: U256 },
    #[error("{sender:?} has {balance} wei, needs {required}")]
    InsufficientFunds {
        sender: Address,
        balance: U256,
        required: U256,
    },
    #[error(transparent)]
    State(#[from] StateError),
}

pub trait TxExecutor: Send + Sync {
    fn execute(
        &self,
        state: &mut dyn StateManager,
        env: &BlockEnv,
        tx: &SignedTransaction,
    ) -> Result<ExecutionResult, ExecutionError>;
}

/// Gas charged before any code runs.
pub fn intrinsic_gas(tx: &Transaction) -> u64 {
    let data_gas: u64 = tx
        .data()
        .iter()
        .map(|b| match b {
            0 => TX_DATA_ZERO_GAS,
            _ => TX_DATA_NON_ZERO_GAS,
        })
        .sum();
    let access_list_gas: u64 = tx
        .access_list()
        .iter()
        .map(|item| {
            ACCESS_LIST_ADDRESS_GAS + item.storage_keys.len() as u64 * ACCESS_LIST_STORAGE_KEY_GAS
        })
        .sum();
    let create_gas = match tx.to() {
        Some(_) => 0,
        None => TX_CREATE_GAS,
    };

    TX_GAS + create_gas + data_gas + access_list_gas
}

/// Address of a contract created by `sender` at `nonce`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let mut s = RlpStream::new_list(2);
    s.append(&sender);
    s.append(&nonce);
    Address::from_slice(&keccak(s.out()).as_bytes()[12..])
}

/// Executes every transaction as a plain value transfer costing its intrinsic
/// gas. Contract creations only move value to the new address.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransferExecutor;

impl TxExecutor for TransferExecutor {
    fn execute(
        &self,
        state: &mut dyn StateManager,
        env: &BlockEnv,
        tx: &SignedTransaction,
    ) -> Result<ExecutionResult, ExecutionError> {
        let sender = tx.sender();
        if let Some(got) = tx.chain_id().filter(|id| *id != env.chain_id) {
            return Err(ExecutionError::ChainIdMismatch {
                expected: env.chain_id,
                got,
            });
        }

        let intrinsic = intrinsic_gas(tx);
        if intrinsic > tx.gas_limit() {
            return Err(ExecutionError::IntrinsicGasTooLow {
                intrinsic,
                gas_limit: tx.gas_limit(),
            });
        }

        let max_fee = tx.gas_price().max_fee;
        if let Some(base_fee) = env.base_fee.filter(|base| max_fee < *base) {
            return Err(ExecutionError::FeeCapTooLow { max_fee, base_fee });
        }

        let blob_fee = match (tx.max_fee_per_blob_gas(), env.blob_base_fee) {
            (Some(max_fee), Some(blob_base_fee)) if max_fee < blob_base_fee => {
                return Err(ExecutionError::BlobFeeCapTooLow {
                    max_fee,
                    blob_base_fee,
                })
            }
            (Some(_), Some(blob_base_fee)) => U256::from(tx.blob_gas()) * blob_base_fee,
            _ => U256::zero(),
        };

        let account = state.account(&sender)?.unwrap_or_default();
        if account.nonce != tx.nonce() {
            return Err(ExecutionError::NonceMismatch {
                sender,
                expected: account.nonce,
                got: tx.nonce(),
            });
        }

        let price = tx.effective_gas_price(env.base_fee);
        let required = U256::from(tx.gas_limit())
            .checked_mul(price)
            .and_then(|gas| gas.checked_add(tx.value()))
            .and_then(|cost| cost.checked_add(blob_fee))
            .unwrap_or(U256::MAX);
        if account.balance < required {
            return Err(ExecutionError::InsufficientFunds {
                sender,
                balance: account.balance,
                required,
            });
        }

        let gas_used = intrinsic;
        let fee = U256::from(gas_used) * price;
        state.put_account(
            sender,
            Account {
                nonce: account.nonce + 1,
                balance: account.balance - fee - tx.value() - blob_fee,
                ..account
            },
        )?;

        let recipient = tx
            .to()
            .unwrap_or_else(|| create_address(sender, account.nonce));
        state.add_balance(recipient, tx.value())?;

        let miner_value =
            U256::from(gas_used) * price.saturating_sub(env.base_fee.unwrap_or_default());
        state.add_balance(env.coinbase, miner_value)?;

        Ok(ExecutionResult {
            gas_used,
            miner_value,
            success: true,
            logs: Vec::new(),
            created_address: tx.to().is_none().then_some(recipient),
        })
    }
}
