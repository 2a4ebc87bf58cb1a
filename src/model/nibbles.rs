//! Nibble paths
//!
//! Keys in the trie are walked as nibbles (half-bytes), high nibble first,
//! giving every branch a fan-out of 16.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered sequence of nibbles, each in `0..16`
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Nibbles {
    data: Vec<u8>,
}

impl Nibbles {
    /// Create an empty path
    pub fn new() -> Self {
        Nibbles { data: Vec::new() }
    }

    /// Split each byte into (high, low) nibbles
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            data.push(byte >> 4);
            data.push(byte & 0x0f);
        }
        Nibbles { data }
    }

    /// Create from nibbles that are already split
    pub fn from_raw(nibbles: Vec<u8>) -> Self {
        debug_assert!(nibbles.iter().all(|n| *n < 16));
        Nibbles { data: nibbles }
    }

    /// Pack back into bytes; `None` for an odd number of nibbles
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.data.len() % 2 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks(2)
                .map(|pair| (pair[0] << 4) | pair[1])
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Length of the prefix shared with `other`
    pub fn common_prefix_len(&self, other: &[u8]) -> usize {
        common_prefix_len(&self.data, other)
    }

    /// `prefix` followed by this path
    pub fn prepend(&self, prefix: &[u8]) -> Self {
        let mut data = Vec::with_capacity(prefix.len() + self.data.len());
        data.extend_from_slice(prefix);
        data.extend_from_slice(&self.data);
        Nibbles { data }
    }
}

/// Number of leading nibbles two paths have in common
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl From<&[u8]> for Nibbles {
    fn from(nibbles: &[u8]) -> Self {
        Nibbles::from_raw(nibbles.to_vec())
    }
}

impl TryFrom<Vec<u8>> for Nibbles {
    type Error = String;

    fn try_from(data: Vec<u8>) -> std::result::Result<Self, Self::Error> {
        if let Some(bad) = data.iter().find(|n| **n >= 16) {
            return Err(format!("nibble out of range: {}", bad));
        }
        Ok(Nibbles { data })
    }
}

impl From<Nibbles> for Vec<u8> {
    fn from(nibbles: Nibbles) -> Self {
        nibbles.data
    }
}

impl fmt::Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nibbles({})", self)
    }
}

impl fmt::Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.data {
            write!(f, "{:x}", n)?;
        }
        Ok(())
    }
}
