//! Helpers for the tries Ethereum builds from ordered lists.

use ethereum_types::H256;

use crate::{nibbles::Nibbles, trie::HashedTrie, trie_ops::TrieOpResult};

/// Root of a trie that maps `rlp(index)` to each value of `values`.
///
/// This is how block headers commit to their transactions, receipts and
/// withdrawals. An empty list yields the empty trie hash.
pub fn ordered_trie_root<I, V>(values: I) -> TrieOpResult<H256>
where
    I: IntoIterator<Item = V>,
    V: Into<Vec<u8>>,
{
    let mut trie = HashedTrie::new();
    for (idx, value) in values.into_iter().enumerate() {
        trie.insert(Nibbles::from_bytes_be(&rlp::encode(&(idx as u64))), value)?;
    }
    Ok(trie.hash())
}
