//! Merkle-Patricia trie
//!
//! This implements an authenticated key/value map where:
//! - Keys are walked as nibble paths through branch, extension and leaf nodes
//! - Each node's digest is derived from its own fields and its children's digests
//! - Identical subtrees share storage across commits
//! - The root digest uniquely identifies the whole key/value mapping

mod encoding;
mod node;
mod proof;
mod tree;

pub use encoding::{encode_path, hash_subtree, EncodedNode};
pub use node::{Children, Node, NodeKind};
pub use proof::{verify_proof, Proof};
pub use tree::Trie;
