//! # patricia_db
//!
//! An authenticated key/value store built on a Merkle-Patricia trie.
//!
//! Keys are split into nibbles and stored in a path-compressed 16-way trie.
//! Every node is identified by the BLAKE3 digest of its canonical encoding,
//! so a single root digest commits to the entire key/value mapping and any
//! single entry can be proven against it.
//!
//! ## Core Concepts
//!
//! - **Trie**: the in-memory tree, mutated with `put`/`del`
//! - **Commit**: persist every node under its digest and return the root
//! - **Proof**: the node encodings from the root to a key, checkable by
//!   anyone holding only the root digest
//! - **Storage**: where committed nodes live (in memory or in a single file)
//!
//! ## Example
//!
//! ```
//! use patricia_db::{MemoryStore, Trie};
//!
//! let store = MemoryStore::new();
//! let mut trie = Trie::new(&store);
//! trie.put(b"dog", b"puppy".to_vec());
//! let root = trie.commit()?.expect("non-empty trie");
//!
//! let proof = trie.proof(b"dog")?;
//! assert!(proof.verify(&root, b"dog", b"puppy"));
//! # Ok::<(), patricia_db::Error>(())
//! ```

pub mod config;
pub mod model;
pub mod store;
pub mod trie;

mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use model::{Hash, Nibbles};
pub use store::{FileStore, MemoryStore, Storage};
pub use trie::{verify_proof, Node, NodeKind, Proof, Trie};

/// File format version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"PATRICIA";
