//! The canonical chain behind the [`Blockchain`] trait.

use std::{collections::HashMap, sync::Arc};

use ethereum_types::H256;
use parking_lot::RwLock;
use thiserror::Error;

use crate::block::Block;

/// A chain shared between the node and the receipts index.
pub type SharedChain = Arc<RwLock<Box<dyn Blockchain>>>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("the chain has no blocks")]
    Empty,
    #[error("parent {parent:?} of block {number} is unknown")]
    UnknownParent { parent: H256, number: u64 },
    #[error("block {number} does not follow its parent {parent_number}")]
    InvalidNumber { number: u64, parent_number: u64 },
}

/// Selects a block by height or by hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockId {
    Number(u64),
    Hash(H256),
}

impl From<u64> for BlockId {
    fn from(number: u64) -> Self {
        BlockId::Number(number)
    }
}

impl From<H256> for BlockId {
    fn from(hash: H256) -> Self {
        BlockId::Hash(hash)
    }
}

pub trait Blockchain: Send + Sync {
    fn canonical_head(&self) -> Result<Block, ChainError>;

    /// Stores `block`. If it extends the parent of the current head or an
    /// earlier canonical block, the canonical blocks it displaces are returned
    /// in ascending order.
    fn put_block(&mut self, block: Block) -> Result<Vec<Block>, ChainError>;

    /// Looks up a block. Numbers resolve on the canonical chain only.
    fn get_block(&self, id: BlockId) -> Result<Option<Block>, ChainError>;
}

/// Keeps every block in memory, indexed by hash, with the canonical chain as a
/// list of hashes by height.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlockchain {
    blocks: HashMap<H256, Block>,
    canonical: Vec<H256>,
}

impl MemoryBlockchain {
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        Self {
            blocks: HashMap::from([(hash, genesis)]),
            canonical: vec![hash],
        }
    }

    fn canonical_hash(&self, number: u64) -> Option<H256> {
        usize::try_from(number)
            .ok()
            .and_then(|n| self.canonical.get(n))
            .copied()
    }
}

impl Blockchain for MemoryBlockchain {
    fn canonical_head(&self) -> Result<Block, ChainError> {
        self.canonical
            .last()
            .and_then(|hash| self.blocks.get(hash))
            .cloned()
            .ok_or(ChainError::Empty)
    }

    fn put_block(&mut self, block: Block) -> Result<Vec<Block>, ChainError> {
        let number = block.number();
        let parent_hash = block.header.parent_hash;
        let hash = block.hash();

        let parent = self
            .blocks
            .get(&parent_hash)
            .ok_or(ChainError::UnknownParent {
                parent: parent_hash,
                number,
            })?;
        if parent.number() + 1 != number {
            return Err(ChainError::InvalidNumber {
                number,
                parent_number: parent.number(),
            });
        }

        self.blocks.insert(hash, block);
        if self.canonical_hash(number - 1) != Some(parent_hash) {
            // Side chain; the head stays where it is.
            return Ok(Vec::new());
        }

        let displaced = self
            .canonical
            .split_off(number as usize)
            .into_iter()
            .filter_map(|h| self.blocks.get(&h).cloned())
            .collect();
        self.canonical.push(hash);
        Ok(displaced)
    }

    fn get_block(&self, id: BlockId) -> Result<Option<Block>, ChainError> {
        let hash = match id {
            BlockId::Number(number) => self.canonical_hash(number),
            BlockId::Hash(hash) => Some(hash),
        };
        Ok(hash.and_then(|h| self.blocks.get(&h)).cloned())
    }
}
