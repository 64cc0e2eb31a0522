//! Account state behind the [`StateManager`] trait, and a journaled in-memory
//! implementation.

use std::collections::HashMap;

use bytes::Bytes;
use devnode_common::{EMPTY_CODE_HASH, EMPTY_TRIE_HASH};
use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use mpt_trie::{HashedTrie, TrieOpError};
use rlp_derive::RlpEncodable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no open checkpoint to {0}")]
    NoCheckpoint(&'static str),
    #[error("balance of {0:?} overflows")]
    BalanceOverflow(Address),
    #[error("balance of {address:?} is {balance}, cannot subtract {amount}")]
    InsufficientBalance {
        address: Address,
        balance: U256,
        amount: U256,
    },
    #[error(transparent)]
    Trie(#[from] TrieOpError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

/// World state as seen by the pool, the builder and the executor.
///
/// Writes between [`checkpoint`](StateManager::checkpoint) and the matching
/// [`commit`](StateManager::commit) or [`revert`](StateManager::revert) form
/// one unit. Checkpoints nest.
pub trait StateManager: Send {
    fn checkpoint(&mut self);

    /// Keeps the writes of the innermost checkpoint.
    fn commit(&mut self) -> Result<(), StateError>;

    /// Discards the writes of the innermost checkpoint.
    fn revert(&mut self) -> Result<(), StateError>;

    fn state_root(&self) -> Result<H256, StateError>;

    fn account(&self, address: &Address) -> Result<Option<Account>, StateError>;

    fn put_account(&mut self, address: Address, account: Account) -> Result<(), StateError>;

    fn storage(&self, address: &Address, slot: &H256) -> Result<H256, StateError>;

    fn put_storage(
        &mut self,
        address: Address,
        slot: H256,
        value: H256,
    ) -> Result<(), StateError>;

    fn code(&self, address: &Address) -> Result<Bytes, StateError>;

    fn put_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError>;

    fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut account = self.account(&address)?.unwrap_or_default();
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(StateError::BalanceOverflow(address))?;
        self.put_account(address, account)
    }

    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut account = self.account(&address)?.unwrap_or_default();
        account.balance =
            account
                .balance
                .checked_sub(amount)
                .ok_or(StateError::InsufficientBalance {
                    address,
                    balance: account.balance,
                    amount,
                })?;
        self.put_account(address, account)
    }
}

#[derive(Debug, RlpEncodable)]
struct AccountRlp {
    nonce: u64,
    balance: U256,
    storage_root: H256,
    code_hash: H256,
}

#[derive(Clone, Debug)]
enum JournalEntry {
    Account(Address, Option<Account>),
    Storage(Address, H256, Option<H256>),
}

/// Account state kept in hash maps. Roots are computed on demand by building
/// the state and storage tries from scratch.
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    accounts: HashMap<Address, Account>,
    storage: HashMap<Address, HashMap<H256, H256>>,
    code: HashMap<H256, Bytes>,
    journal: Vec<Vec<JournalEntry>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state holding `alloc` balances.
    pub fn with_balances(alloc: impl IntoIterator<Item = (Address, U256)>) -> Self {
        let accounts = alloc
            .into_iter()
            .map(|(address, balance)| {
                (
                    address,
                    Account {
                        balance,
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self {
            accounts,
            ..Default::default()
        }
    }

    /// Number of open checkpoints.
    pub fn checkpoint_depth(&self) -> usize {
        self.journal.len()
    }

    fn record(&mut self, entry: impl FnOnce(&Self) -> JournalEntry) {
        if !self.journal.is_empty() {
            let entry = entry(self);
            if let Some(frame) = self.journal.last_mut() {
                frame.push(entry);
            }
        }
    }

    fn storage_root(&self, address: &Address) -> Result<H256, StateError> {
        let Some(slots) = self.storage.get(address) else {
            return Ok(EMPTY_TRIE_HASH);
        };

        let mut trie = HashedTrie::new();
        for (slot, value) in slots.iter().filter(|(_, v)| !v.is_zero()) {
            let value = U256::from_big_endian(value.as_bytes());
            trie.insert(keccak(slot).as_bytes(), rlp::encode(&value).to_vec())?;
        }
        Ok(trie.hash())
    }
}

impl StateManager for MemoryState {
    fn checkpoint(&mut self) {
        self.journal.push(Vec::new());
    }

    fn commit(&mut self) -> Result<(), StateError> {
        let frame = self.journal.pop().ok_or(StateError::NoCheckpoint("commit"))?;
        // An enclosing checkpoint must still be able to undo these writes.
        if let Some(parent) = self.journal.last_mut() {
            parent.extend(frame);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<(), StateError> {
        let frame = self.journal.pop().ok_or(StateError::NoCheckpoint("revert"))?;
        for entry in frame.into_iter().rev() {
            match entry {
                JournalEntry::Account(address, Some(account)) => {
                    self.accounts.insert(address, account);
                }
                JournalEntry::Account(address, None) => {
                    self.accounts.remove(&address);
                }
                JournalEntry::Storage(address, slot, Some(value)) => {
                    self.storage.entry(address).or_default().insert(slot, value);
                }
                JournalEntry::Storage(address, slot, None) => {
                    if let Some(slots) = self.storage.get_mut(&address) {
                        slots.remove(&slot);
                    }
                }
            }
        }
        Ok(())
    }

    fn state_root(&self) -> Result<H256, StateError> {
        let mut trie = HashedTrie::new();
        for (address, account) in &self.accounts {
            let account_rlp = AccountRlp {
                nonce: account.nonce,
                balance: account.balance,
                storage_root: self.storage_root(address)?,
                code_hash: account.code_hash,
            };
            trie.insert(keccak(address).as_bytes(), rlp::encode(&account_rlp).to_vec())?;
        }
        Ok(trie.hash())
    }

    fn account(&self, address: &Address) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.get(address).copied())
    }

    fn put_account(&mut self, address: Address, account: Account) -> Result<(), StateError> {
        self.record(|state| {
            JournalEntry::Account(address, state.accounts.get(&address).copied())
        });
        self.accounts.insert(address, account);
        Ok(())
    }

    fn storage(&self, address: &Address, slot: &H256) -> Result<H256, StateError> {
        Ok(self
            .storage
            .get(address)
            .and_then(|slots| slots.get(slot))
            .copied()
            .unwrap_or_default())
    }

    fn put_storage(
        &mut self,
        address: Address,
        slot: H256,
        value: H256,
    ) -> Result<(), StateError> {
        self.record(|state| {
            let previous = state
                .storage
                .get(&address)
                .and_then(|slots| slots.get(&slot))
                .copied();
            JournalEntry::Storage(address, slot, previous)
        });
        self.storage.entry(address).or_default().insert(slot, value);
        if !self.accounts.contains_key(&address) {
            self.put_account(address, Account::default())?;
        }
        Ok(())
    }

    fn code(&self, address: &Address) -> Result<Bytes, StateError> {
        Ok(self
            .accounts
            .get(address)
            .and_then(|account| self.code.get(&account.code_hash))
            .cloned()
            .unwrap_or_default())
    }

    fn put_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        let code_hash = keccak(&code);
        self.code.insert(code_hash, code);
        let account = self.accounts.get(&address).copied().unwrap_or_default();
        self.put_account(
            address,
            Account {
                code_hash,
                ..account
            },
        )
    }
}
