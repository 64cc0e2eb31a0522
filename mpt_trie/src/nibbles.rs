//! Trie keys as sequences of 4-bit nibbles.

use std::fmt::{self, Display};

use bytes::Bytes;

/// A single 4-bit value. Only the low nibble is ever set.
pub type Nibble = u8;

/// A trie key expressed as nibbles, most significant first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nibbles(Vec<Nibble>);

impl Nibbles {
    /// Splits every byte into its high and low nibble.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self(bytes.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect())
    }

    /// Creates a key from raw nibbles. Values above `0xf` are masked.
    pub fn from_nibbles(nibbles: &[Nibble]) -> Self {
        Self(nibbles.iter().map(|n| n & 0x0f).collect())
    }

    /// Number of nibbles in the key.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no nibbles.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nibbles of the key.
    pub fn as_slice(&self) -> &[Nibble] {
        &self.0
    }

    /// Number of leading nibbles shared with `other`.
    pub fn common_prefix_len(&self, other: &[Nibble]) -> usize {
        self.0
            .iter()
            .zip(other)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Packs the key back into bytes. `None` if the nibble count is odd.
    pub fn to_bytes_be(&self) -> Option<Vec<u8>> {
        if self.0.len() % 2 != 0 {
            return None;
        }
        Some(self.0.chunks(2).map(|c| (c[0] << 4) | c[1]).collect())
    }

    /// Encodes the key in hex prefix ("compact") form, flagging leaves and odd
    /// lengths in the first nibble.
    pub fn to_hex_prefix_encoding(&self, is_leaf: bool) -> Bytes {
        let is_odd = self.0.len() % 2 == 1;
        let flags: u8 = ((is_leaf as u8) << 1) | is_odd as u8;

        let mut bytes = Vec::with_capacity(self.0.len() / 2 + 1);
        let rest = match is_odd {
            true => {
                bytes.push((flags << 4) | self.0[0]);
                &self.0[1..]
            }
            false => {
                bytes.push(flags << 4);
                &self.0[..]
            }
        };
        bytes.extend(rest.chunks(2).map(|c| (c[0] << 4) | c[1]));

        Bytes::from(bytes)
    }
}

impl From<&[u8]> for Nibbles {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes_be(bytes)
    }
}

impl From<Vec<u8>> for Nibbles {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes_be(&bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for Nibbles {
    fn from(bytes: &[u8; N]) -> Self {
        Self::from_bytes_be(bytes)
    }
}

impl Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for n in &self.0 {
            write!(f, "{n:x}")?;
        }
        Ok(())
    }
}
