//! The in-memory trie and its node type.

use ethereum_types::H256;

use crate::{
    nibbles::Nibbles,
    trie_hashing::hash_trie,
    trie_ops::{TrieOpError, TrieOpResult},
};

/// A node of a Merkle Patricia trie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Node {
    /// An empty trie.
    #[default]
    Empty,
    /// A branch with one child per nibble and an optional value for keys that
    /// end here. An empty value means no value.
    Branch {
        /// Children indexed by the next nibble of the key.
        children: Box<[Node; 16]>,
        /// Value of the key that terminates at this branch.
        value: Vec<u8>,
    },
    /// A shared run of nibbles followed by a single child.
    Extension {
        /// The shared key segment.
        nibbles: Nibbles,
        /// The node below the segment. Always a branch in a normalized trie.
        child: Box<Node>,
    },
    /// The remaining key segment and the value of a single key.
    Leaf {
        /// The remaining key segment.
        nibbles: Nibbles,
        /// The stored value.
        value: Vec<u8>,
    },
}

impl Node {
    pub(crate) fn empty_children() -> Box<[Node; 16]> {
        Box::new(std::array::from_fn(|_| Node::Empty))
    }
}

/// A trie that owns all of its nodes and can produce its merkle root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashedTrie {
    root: Node,
}

impl HashedTrie {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`, replacing any previous value.
    ///
    /// Empty values are rejected: Ethereum tries use them to signal deletion.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> TrieOpResult<()>
    where
        K: Into<Nibbles>,
        V: Into<Vec<u8>>,
    {
        let key = key.into();
        let value = value.into();
        if value.is_empty() {
            return Err(TrieOpError::EmptyValue(key.to_string()));
        }

        let root = std::mem::take(&mut self.root);
        self.root = root.insert(key.as_slice(), value);
        Ok(())
    }

    /// Inserts every `(key, value)` pair of `entries`.
    pub fn extend<K, V, I>(&mut self, entries: I) -> TrieOpResult<()>
    where
        K: Into<Nibbles>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
    {
        entries
            .into_iter()
            .try_for_each(|(k, v)| self.insert(k, v))
    }

    /// Looks up the value stored under `key`.
    pub fn get<K: Into<Nibbles>>(&self, key: K) -> Option<&[u8]> {
        self.root.get(key.into().as_slice())
    }

    /// Whether the trie holds no values.
    pub fn is_empty(&self) -> bool {
        matches!(self.root, Node::Empty)
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Computes the merkle root of the trie.
    pub fn hash(&self) -> H256 {
        hash_trie(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eth_trie::{EthTrie, MemoryDB, Trie};
    use rand::{thread_rng, Rng};

    use super::*;

    const NUM_RANDOM_ENTRIES: usize = 500;

    fn h256(hex_str: &str) -> H256 {
        let mut bytes = [0; 32];
        hex::decode_to_slice(hex_str, &mut bytes).unwrap();
        H256(bytes)
    }

    fn trie_from(entries: &[(&str, &str)]) -> HashedTrie {
        let mut trie = HashedTrie::new();
        for (k, v) in entries {
            trie.insert(k.as_bytes(), v.as_bytes()).unwrap();
        }
        trie
    }

    fn eth_trie_root(entries: &[(Vec<u8>, Vec<u8>)]) -> H256 {
        let mut truth_trie = EthTrie::new(Arc::new(MemoryDB::new(true)));
        for (k, v) in entries {
            truth_trie.insert(k, v).unwrap();
        }
        let h = truth_trie.root_hash().unwrap();

        // Same layout, different crate versions.
        H256(h.0)
    }

    #[test]
    fn empty_trie_hash_is_keccak_of_null_rlp() {
        assert_eq!(
            HashedTrie::new().hash(),
            keccak_hash::keccak(rlp::NULL_RLP)
        );
    }

    #[test]
    fn dogs_trie_hash_is_correct() {
        let trie = trie_from(&[
            ("doe", "reindeer"),
            ("dog", "puppy"),
            ("dogglesworth", "cat"),
        ]);

        assert_eq!(
            trie.hash(),
            h256("8aad789dff2f538bca5d8ea56e8abe10f4c7ba3a5dea95fea4cd6e7c3a1168d3")
        );
    }

    #[test]
    fn puppy_trie_hash_is_correct() {
        let trie = trie_from(&[
            ("do", "verb"),
            ("horse", "stallion"),
            ("doge", "coin"),
            ("dog", "puppy"),
        ]);

        assert_eq!(
            trie.hash(),
            h256("5991bb8c6514148a29db676a14ac506cd2cd5775ace63c30a4fe457715e9ac84")
        );
    }

    #[test]
    fn insertion_order_does_not_change_hash() {
        let a = trie_from(&[("dog", "puppy"), ("doe", "reindeer"), ("dogglesworth", "cat")]);
        let b = trie_from(&[("dogglesworth", "cat"), ("dog", "puppy"), ("doe", "reindeer")]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn get_returns_inserted_values() {
        let mut trie = trie_from(&[("do", "verb"), ("dog", "puppy"), ("doge", "coin")]);

        assert_eq!(trie.get(b"do"), Some(&b"verb"[..]));
        assert_eq!(trie.get(b"dog"), Some(&b"puppy"[..]));
        assert_eq!(trie.get(b"doge"), Some(&b"coin"[..]));
        assert_eq!(trie.get(b"d"), None);
        assert_eq!(trie.get(b"dogs"), None);

        trie.insert(b"dog", b"hound".to_vec()).unwrap();
        assert_eq!(trie.get(b"dog"), Some(&b"hound"[..]));
    }

    #[test]
    fn overwriting_a_value_matches_fresh_trie() {
        let mut trie = trie_from(&[("dog", "puppy"), ("doge", "coin")]);
        trie.insert(b"dog", b"hound".to_vec()).unwrap();

        assert_eq!(trie.hash(), trie_from(&[("doge", "coin"), ("dog", "hound")]).hash());
    }

    #[test]
    fn empty_values_are_rejected() {
        let mut trie = HashedTrie::new();
        assert!(matches!(
            trie.insert(b"dog", Vec::<u8>::new()),
            Err(TrieOpError::EmptyValue(_))
        ));
        assert!(trie.is_empty());
    }

    #[test]
    fn random_fixed_length_keys_match_eth_trie() {
        let mut rng = thread_rng();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..NUM_RANDOM_ENTRIES)
            .map(|_| {
                let k: [u8; 32] = rng.gen();
                let v: [u8; 8] = rng.gen();
                (k.to_vec(), v.to_vec())
            })
            .collect();

        let mut trie = HashedTrie::new();
        trie.extend(entries.iter().cloned()).unwrap();

        assert_eq!(trie.hash(), eth_trie_root(&entries));
    }

    #[test]
    fn random_variable_length_keys_match_eth_trie() {
        let mut rng = thread_rng();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..NUM_RANDOM_ENTRIES)
            .map(|_| {
                let key_len = rng.gen_range(1..6);
                let val_len = rng.gen_range(1..80);
                let k: Vec<u8> = (0..key_len).map(|_| rng.gen()).collect();
                let v: Vec<u8> = (0..val_len).map(|_| rng.gen_range(1..=u8::MAX)).collect();
                (k, v)
            })
            .collect();

        let mut trie = HashedTrie::new();
        trie.extend(entries.iter().cloned()).unwrap();

        assert_eq!(trie.hash(), eth_trie_root(&entries));
    }
}
