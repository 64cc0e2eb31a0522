//! Utilities and types for building Ethereum Merkle Patricia tries in memory.
//!
//! The node only ever needs tries to compute roots: the transactions,
//! receipts and withdrawals roots of a block, and the state root of the
//! in-memory account state. [`HashedTrie`][trie::HashedTrie] therefore keeps
//! every node in memory and supports insertion, lookups and hashing, while
//! [`ordered_trie_root`][utils::ordered_trie_root] covers the common case of
//! a list keyed by `rlp(index)`.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod nibbles;
pub mod trie;
mod trie_hashing;
pub mod trie_ops;
pub mod utils;

pub use trie::{HashedTrie, Node};
pub use trie_ops::{TrieOpError, TrieOpResult};
pub use utils::ordered_trie_root;
