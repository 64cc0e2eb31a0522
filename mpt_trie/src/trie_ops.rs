//! Defines insertion and lookup on [`Node`].

use thiserror::Error;

use crate::{
    nibbles::{Nibble, Nibbles},
    trie::Node,
};

/// Stores the result of trie operations. Returns a [TrieOpError] upon
/// failure.
pub type TrieOpResult<T> = Result<T, TrieOpError>;

/// An error type for trie operation.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum TrieOpError {
    /// An empty value was inserted. Empty values denote deletion in Ethereum
    /// tries and would produce a non-canonical node.
    #[error("Attempted to insert an empty value! (key: {0})")]
    EmptyValue(String),
}

impl Node {
    /// Returns the node obtained by inserting `value` at `path` below `self`.
    pub(crate) fn insert(self, path: &[Nibble], value: Vec<u8>) -> Node {
        match self {
            Node::Empty => Node::Leaf {
                nibbles: Nibbles::from_nibbles(path),
                value,
            },
            Node::Leaf {
                nibbles,
                value: existing,
            } => {
                let common = nibbles.common_prefix_len(path);
                if common == nibbles.len() && common == path.len() {
                    return Node::Leaf { nibbles, value };
                }

                let mut children = Node::empty_children();
                let mut branch_value = Vec::new();
                place_leaf(
                    &mut children,
                    &mut branch_value,
                    &nibbles.as_slice()[common..],
                    existing,
                );
                place_leaf(&mut children, &mut branch_value, &path[common..], value);

                with_prefix(
                    &path[..common],
                    Node::Branch {
                        children,
                        value: branch_value,
                    },
                )
            }
            Node::Extension { nibbles, child } => {
                let common = nibbles.common_prefix_len(path);
                if common == nibbles.len() {
                    return Node::Extension {
                        nibbles,
                        child: Box::new(child.insert(&path[common..], value)),
                    };
                }

                // The extension diverges from `path` at `common`, which is
                // strictly inside the extension.
                let mut children = Node::empty_children();
                let mut branch_value = Vec::new();
                let ext = nibbles.as_slice();
                let ext_rest = &ext[common + 1..];
                children[ext[common] as usize] = match ext_rest.is_empty() {
                    true => *child,
                    false => Node::Extension {
                        nibbles: Nibbles::from_nibbles(ext_rest),
                        child,
                    },
                };
                place_leaf(&mut children, &mut branch_value, &path[common..], value);

                with_prefix(
                    &path[..common],
                    Node::Branch {
                        children,
                        value: branch_value,
                    },
                )
            }
            Node::Branch {
                mut children,
                value: branch_value,
            } => match path.split_first() {
                None => Node::Branch { children, value },
                Some((&first, rest)) => {
                    let idx = first as usize;
                    let child = std::mem::take(&mut children[idx]);
                    children[idx] = child.insert(rest, value);
                    Node::Branch {
                        children,
                        value: branch_value,
                    }
                }
            },
        }
    }

    /// Looks up the value stored at `path` below `self`.
    pub(crate) fn get(&self, path: &[Nibble]) -> Option<&[u8]> {
        match self {
            Node::Empty => None,
            Node::Leaf { nibbles, value } => {
                (nibbles.as_slice() == path).then_some(value.as_slice())
            }
            Node::Extension { nibbles, child } => path
                .strip_prefix(nibbles.as_slice())
                .and_then(|rest| child.get(rest)),
            Node::Branch { children, value } => match path.split_first() {
                None => (!value.is_empty()).then_some(value.as_slice()),
                Some((&first, rest)) => children[first as usize].get(rest),
            },
        }
    }
}

/// Puts a value whose remaining key is `rest` into a fresh branch.
fn place_leaf(
    children: &mut [Node; 16],
    branch_value: &mut Vec<u8>,
    rest: &[Nibble],
    value: Vec<u8>,
) {
    match rest.split_first() {
        None => *branch_value = value,
        Some((&first, tail)) => {
            children[first as usize] = Node::Leaf {
                nibbles: Nibbles::from_nibbles(tail),
                value,
            }
        }
    }
}

fn with_prefix(prefix: &[Nibble], branch: Node) -> Node {
    match prefix.is_empty() {
        true => branch,
        false => Node::Extension {
            nibbles: Nibbles::from_nibbles(prefix),
            child: Box::new(branch),
        },
    }
}
