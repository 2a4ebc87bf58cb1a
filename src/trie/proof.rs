//! # Merkle proofs
//!
//! A proof is the list of canonical node encodings visited on the way from
//! the root to the node that resolves a key. Verification needs nothing but
//! the proof itself: it checks that the entries spell out the key, then
//! replays the digests from the terminal entry (rebuilt around the claimed
//! value) back up to the root.

use super::encoding::EncodedNode;
use crate::model::{Hash, Nibbles};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Root-to-target node encodings for one key
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    nodes: Vec<Vec<u8>>,
}

impl Proof {
    /// Create a proof from encodings in root-to-target order
    pub fn new(nodes: Vec<Vec<u8>>) -> Self {
        Proof { nodes }
    }

    pub fn nodes(&self) -> &[Vec<u8>] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Vec<u8>> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.nodes.iter().map(Vec::as_slice)
    }

    /// Digest of each entry, root first
    pub fn hashes(&self) -> Vec<Hash> {
        self.iter().map(Hash::digest).collect()
    }

    /// Check that `key` maps to `value` in the trie committed as `root`
    pub fn verify(&self, root: &Hash, key: &[u8], value: &[u8]) -> bool {
        verify_proof(root, key, value, &self.nodes)
    }
}

/// Check that `nodes` prove `key` maps to `value` under `root`
pub fn verify_proof(root: &Hash, key: &[u8], value: &[u8], nodes: &[Vec<u8>]) -> bool {
    match replay(root, key, value, nodes) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "proof rejected");
            false
        }
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidProof(reason.to_string())
}

fn replay(root: &Hash, key: &[u8], value: &[u8], nodes: &[Vec<u8>]) -> Result<()> {
    let (terminal, ancestors) = nodes.split_last().ok_or_else(|| invalid("empty proof"))?;
    let path = Nibbles::from_bytes(key);
    let mut remaining = path.as_slice();

    // Walk down: each ancestor must consume part of the key and name the
    // digest of the entry after it.
    let mut links = Vec::with_capacity(ancestors.len());
    for bytes in ancestors {
        let link = match EncodedNode::decode(bytes)? {
            EncodedNode::Extension { path, child } => {
                if !remaining.starts_with(path.as_slice()) {
                    return Err(invalid("extension path diverges from key"));
                }
                remaining = &remaining[path.len()..];
                child
            }
            EncodedNode::Branch { children, .. } => {
                let (nibble, rest) = remaining
                    .split_first()
                    .ok_or_else(|| invalid("key ends above the terminal entry"))?;
                remaining = rest;
                children[*nibble as usize].ok_or_else(|| invalid("empty branch slot on key path"))?
            }
            EncodedNode::Leaf { .. } => return Err(invalid("leaf before the terminal entry")),
        };
        links.push(link);
    }

    let rebuilt = match EncodedNode::decode(terminal)? {
        EncodedNode::Leaf {
            value: recorded,
            path,
        } => {
            if path.as_slice() != remaining {
                return Err(invalid("leaf path does not match key"));
            }
            if recorded != value {
                return Err(invalid("value mismatch"));
            }
            EncodedNode::Leaf {
                value: value.to_vec(),
                path,
            }
        }
        EncodedNode::Branch {
            children,
            value: recorded,
        } => {
            if !remaining.is_empty() {
                return Err(invalid("key continues past the terminal branch"));
            }
            if recorded.as_deref() != Some(value) {
                return Err(invalid("value mismatch"));
            }
            EncodedNode::Branch {
                children,
                value: Some(value.to_vec()),
            }
        }
        EncodedNode::Extension { .. } => return Err(invalid("proof ends at an extension")),
    };

    // Replay digests bottom-up
    let mut computed = rebuilt.hash()?;
    for (bytes, link) in ancestors.iter().zip(links.iter()).rev() {
        if *link != computed {
            return Err(invalid("child digest mismatch"));
        }
        computed = Hash::digest(bytes);
    }

    if computed != *root {
        return Err(invalid("root digest mismatch"));
    }
    Ok(())
}
