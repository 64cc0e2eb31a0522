//! Namespaced key/value storage used by the receipts index.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DbNamespace {
    /// Block hash to the storage encoding of the block's receipts.
    Receipts,
    /// Transaction hash to `rlp([block hash, transaction index])`.
    TxHash,
}

#[derive(Debug, Error)]
#[error("key/value store failure: {0}")]
pub struct DbError(pub String);

/// A byte oriented store. Implementations synchronize internally.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, namespace: DbNamespace, key: &[u8]) -> Result<Option<Vec<u8>>, DbError>;

    fn put(&self, namespace: DbNamespace, key: &[u8], value: Vec<u8>) -> Result<(), DbError>;

    fn delete(&self, namespace: DbNamespace, key: &[u8]) -> Result<(), DbError>;
}

#[derive(Debug, Default)]
pub struct MemoryDb {
    entries: RwLock<HashMap<(DbNamespace, Vec<u8>), Vec<u8>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, namespace: DbNamespace) -> usize {
        self.entries
            .read()
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryDb {
    fn get(&self, namespace: DbNamespace, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.entries.read().get(&(namespace, key.to_vec())).cloned())
    }

    fn put(&self, namespace: DbNamespace, key: &[u8], value: Vec<u8>) -> Result<(), DbError> {
        self.entries.write().insert((namespace, key.to_vec()), value);
        Ok(())
    }

    fn delete(&self, namespace: DbNamespace, key: &[u8]) -> Result<(), DbError> {
        self.entries.write().remove(&(namespace, key.to_vec()));
        Ok(())
    }
}
