//! Canonical node encoding
//!
//! A node is encoded with its children replaced by their digests and
//! serialized with bincode (u32 variant tag, u64 length prefix on every
//! variable-length field, one presence byte per optional field). The digest
//! of a node is the BLAKE3 hash of that encoding, and the encoding is what
//! gets stored under the digest.
//!
//! Field order per variant:
//!
//! ```text
//! Leaf      = value || path
//! Extension = path || H(next)
//! Branch    = child[0] || ... || child[15] || value
//! ```

use super::node::{Children, Node};
use crate::model::{Hash, Nibbles};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A node as it is hashed, stored and carried in proofs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedNode {
    Leaf {
        value: Vec<u8>,
        path: Nibbles,
    },
    Extension {
        path: Nibbles,
        child: Hash,
    },
    Branch {
        children: [Option<Hash>; 16],
        value: Option<Vec<u8>>,
    },
}

impl EncodedNode {
    /// Serialize to canonical bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse canonical bytes.
    ///
    /// Anything that does not re-encode to exactly `bytes` is rejected, so a
    /// digest can only ever correspond to one encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let node: EncodedNode = bincode::deserialize(bytes)
            .map_err(|e| Error::Corruption(format!("undecodable node: {}", e)))?;

        if node.encode()? != bytes {
            return Err(Error::Corruption("non-canonical node encoding".into()));
        }
        if let EncodedNode::Extension { path, .. } = &node {
            if path.is_empty() {
                return Err(Error::Corruption("extension with empty path".into()));
            }
        }
        Ok(node)
    }

    /// Digest of the canonical encoding
    pub fn hash(&self) -> Result<Hash> {
        Ok(Hash::digest(&self.encode()?))
    }

    /// Digest referenced at `nibble` (branches only)
    pub fn child(&self, nibble: u8) -> Option<Hash> {
        match self {
            EncodedNode::Branch { children, .. } => children.get(nibble as usize).copied().flatten(),
            _ => None,
        }
    }

    /// Shallow encoding of a live node, given a way to digest its children
    fn from_node<F>(node: &Node, mut child_hash: F) -> Result<Self>
    where
        F: FnMut(&Node) -> Result<Hash>,
    {
        Ok(match node {
            Node::Leaf { path, value } => EncodedNode::Leaf {
                value: value.clone(),
                path: path.clone(),
            },
            Node::Extension { path, next } => EncodedNode::Extension {
                path: path.clone(),
                child: child_hash(next)?,
            },
            Node::Branch { children, value } => {
                let mut hashes = [None; 16];
                for (slot, child) in hashes.iter_mut().zip(children.iter()) {
                    if let Some(child) = child {
                        *slot = Some(child_hash(child)?);
                    }
                }
                EncodedNode::Branch {
                    children: hashes,
                    value: value.clone(),
                }
            }
        })
    }
}

/// Digest a live subtree bottom-up, handing every node's (digest, encoding)
/// to `sink` children-first. The root digest is returned only after every
/// node below it went through `sink` successfully.
pub fn hash_subtree<F>(node: &Node, sink: &mut F) -> Result<Hash>
where
    F: FnMut(&Hash, &[u8]) -> Result<()>,
{
    let encoded = EncodedNode::from_node(node, |child| hash_subtree(child, sink))?;
    let bytes = encoded.encode()?;
    let hash = Hash::digest(&bytes);
    sink(&hash, &bytes)?;
    Ok(hash)
}

/// Canonical encodings of a root-to-target chain of nodes, where each node
/// is a child of the one before it. Each on-path digest is computed once
/// from the encoding below it; only off-path children are hashed in full.
pub fn encode_path(path: &[&Node]) -> Result<Vec<Vec<u8>>> {
    let mut encoded = vec![Vec::new(); path.len()];
    let mut below: Option<(&Node, Hash)> = None;

    for (slot, node) in encoded.iter_mut().zip(path.iter()).rev() {
        let bytes = EncodedNode::from_node(node, |child| match below {
            Some((on_path, hash)) if std::ptr::eq(child, on_path) => Ok(hash),
            _ => hash_subtree(child, &mut |_, _| Ok(())),
        })?
        .encode()?;
        below = Some((*node, Hash::digest(&bytes)));
        *slot = bytes;
    }
    Ok(encoded)
}

/// Turn a decoded node back into a live one, resolving child digests with
/// `load`.
pub fn into_live<F>(encoded: EncodedNode, mut load: F) -> Result<Node>
where
    F: FnMut(&Hash) -> Result<Node>,
{
    Ok(match encoded {
        EncodedNode::Leaf { value, path } => Node::Leaf { path, value },
        EncodedNode::Extension { path, child } => Node::Extension {
            path,
            next: Box::new(load(&child)?),
        },
        EncodedNode::Branch {
            children: hashes,
            value,
        } => {
            let mut children: Children = Box::default();
            for (slot, hash) in children.iter_mut().zip(hashes.iter()) {
                if let Some(hash) = hash {
                    *slot = Some(load(hash)?);
                }
            }
            Node::Branch { children, value }
        }
    })
}
