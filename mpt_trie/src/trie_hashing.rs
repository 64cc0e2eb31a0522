use bytes::Bytes;
use ethereum_types::H256;
use keccak_hash::keccak;
use rlp::RlpStream;

use crate::trie::Node;

/// The node type used for calculating the hash of a trie.
#[derive(Clone, Debug, Hash)]
pub(crate) enum EncodedNode {
    /// Node that is RLPed but not hashed.
    Raw(Bytes),
    /// Node that is hashed.
    Hashed([u8; 32]),
}

impl From<&EncodedNode> for H256 {
    fn from(v: &EncodedNode) -> Self {
        match v {
            EncodedNode::Raw(b) => H256(hash_bytes(b)),
            EncodedNode::Hashed(h) => H256(*h),
        }
    }
}

/// Calculates the hash of a node. The root is always hashed, even when its
/// encoding is shorter than a hash.
pub(crate) fn hash_trie(node: &Node) -> H256 {
    let trie_hash_bytes = rlp_encode_and_hash_node(node);
    (&trie_hash_bytes).into()
}

pub(crate) fn rlp_encode_and_hash_node(node: &Node) -> EncodedNode {
    match node {
        Node::Empty => EncodedNode::Raw(Bytes::from_static(&rlp::NULL_RLP)),
        Node::Branch { children, value } => {
            let mut stream = RlpStream::new_list(17);

            for c in children.iter() {
                append_to_stream(&mut stream, rlp_encode_and_hash_node(c));
            }

            match value.is_empty() {
                false => stream.append(value),
                true => stream.append_empty_data(),
            };

            hash_bytes_if_large_enough(stream.out().into())
        }
        Node::Extension { nibbles, child } => {
            let mut stream = RlpStream::new_list(2);

            stream.append(&nibbles.to_hex_prefix_encoding(false));
            append_to_stream(&mut stream, rlp_encode_and_hash_node(child));

            hash_bytes_if_large_enough(stream.out().into())
        }
        Node::Leaf { nibbles, value } => {
            let hex_prefix_k = nibbles.to_hex_prefix_encoding(true);
            let mut stream = RlpStream::new_list(2);

            stream.append(&hex_prefix_k);
            stream.append(value);

            hash_bytes_if_large_enough(stream.out().into())
        }
    }
}

fn hash_bytes_if_large_enough(bytes: Bytes) -> EncodedNode {
    match bytes.len() >= 32 {
        false => EncodedNode::Raw(bytes),
        true => EncodedNode::Hashed(hash_bytes(&bytes)),
    }
}

fn append_to_stream(s: &mut RlpStream, node: EncodedNode) {
    match node {
        EncodedNode::Raw(b) => s.append_raw(&b, 1),
        EncodedNode::Hashed(h) => s.append(&h.as_ref()),
    };
}

fn hash_bytes(bytes: &Bytes) -> [u8; 32] {
    keccak(bytes).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nibbles::Nibbles;

    #[test]
    fn small_nodes_are_inlined() {
        let leaf = Node::Leaf {
            nibbles: Nibbles::from_nibbles(&[1]),
            value: vec![0x42],
        };
        assert!(matches!(
            rlp_encode_and_hash_node(&leaf),
            EncodedNode::Raw(_)
        ));
    }

    #[test]
    fn large_nodes_are_hashed() {
        let leaf = Node::Leaf {
            nibbles: Nibbles::from_nibbles(&[1]),
            value: vec![0x42; 40],
        };
        assert!(matches!(
            rlp_encode_and_hash_node(&leaf),
            EncodedNode::Hashed(_)
        ));
    }
}
