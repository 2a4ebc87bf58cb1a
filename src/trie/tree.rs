//! Merkle-Patricia trie over a pluggable node store

use super::encoding::{self, EncodedNode};
use super::node::{Children, Node};
use super::proof::Proof;
use crate::model::{Hash, Nibbles};
use crate::store::Storage;
use crate::{Error, Result};
use tracing::{debug, trace};

/// A Merkle-Patricia trie.
///
/// The live tree is held in memory and owned exclusively by the trie; the
/// store only sees nodes when they are committed (or loaded back with
/// [`Trie::from_root`]). The store's lifetime belongs to the caller.
pub struct Trie<'a, S: Storage + ?Sized> {
    store: &'a S,
    root: Option<Node>,
}

/// Outcome of removing a key from a subtree
enum Removal {
    /// Key was not there; the subtree comes back untouched
    Missing(Node),
    /// Key removed; what is left of the subtree, if anything
    Removed(Option<Node>),
}

impl<'a, S: Storage + ?Sized> Trie<'a, S> {
    /// Create a new empty trie
    pub fn new(store: &'a S) -> Self {
        Trie { store, root: None }
    }

    /// Rebuild a trie from a committed root using only the store.
    ///
    /// Every node is checked against the digest it was referenced by.
    pub fn from_root(store: &'a S, root_hash: &Hash) -> Result<Self> {
        let root = load_node(store, root_hash)?;
        root.validate()?;
        debug!(root = %root_hash, keys = root.value_count(), "loaded trie");
        Ok(Trie {
            store,
            root: Some(root),
        })
    }

    /// The backing store
    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Root of the live tree
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, Node::value_count)
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &[u8]) -> Result<&[u8]> {
        self.walk(key, |_| Ok(()))
    }

    /// Insert or overwrite `key`
    pub fn put(&mut self, key: &[u8], value: impl Into<Vec<u8>>) {
        let path = Nibbles::from_bytes(key);
        let root = self.root.take();
        self.root = Some(insert(root, path.as_slice(), value.into()));
    }

    /// Remove `key`. On `NotFound` the trie is left exactly as it was.
    pub fn del(&mut self, key: &[u8]) -> Result<()> {
        let path = Nibbles::from_bytes(key);
        let root = self.root.take().ok_or_else(|| Error::key_not_found(key))?;

        match remove(root, path.as_slice()) {
            Removal::Missing(root) => {
                self.root = Some(root);
                Err(Error::key_not_found(key))
            }
            Removal::Removed(root) => {
                self.root = root;
                Ok(())
            }
        }
    }

    /// Persist every node under its digest and return the root digest.
    ///
    /// `None` for an empty trie. Fails as a whole if any node could not be
    /// stored. The key/value mapping is not affected.
    pub fn commit(&self) -> Result<Option<Hash>> {
        let Some(root) = &self.root else {
            debug!("commit of empty trie");
            return Ok(None);
        };

        let mut persisted = 0usize;
        let hash = encoding::hash_subtree(root, &mut |hash: &Hash, bytes: &[u8]| {
            trace!(node = %hash.short(), size = bytes.len(), "persisting node");
            self.store.put(hash.as_bytes(), bytes)?;
            persisted += 1;
            Ok(())
        })?;

        debug!(root = %hash, nodes = persisted, "committed trie");
        Ok(Some(hash))
    }

    /// Root digest without persisting anything
    pub fn root_hash(&self) -> Result<Option<Hash>> {
        self.root
            .as_ref()
            .map(|root| encoding::hash_subtree(root, &mut |_, _| Ok(())))
            .transpose()
    }

    /// Encodings of every node from the root down to the one resolving `key`
    pub fn proof(&self, key: &[u8]) -> Result<Proof> {
        let mut path = Vec::new();
        self.walk(key, |node| {
            path.push(node);
            Ok(())
        })?;
        Ok(Proof::new(encoding::encode_path(&path)?))
    }

    /// All (key, value) pairs whose key starts with `prefix`, in key order
    pub fn list_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            let prefix = Nibbles::from_bytes(prefix);
            collect_prefix(root, prefix.as_slice(), &mut Vec::new(), &mut results);
        }
        results
    }

    /// All (key, value) pairs in key order
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.list_prefix(&[])
    }

    /// Follow `key` from the root, showing every visited node to `visit`
    fn walk<'s, F>(&'s self, key: &[u8], mut visit: F) -> Result<&'s [u8]>
    where
        F: FnMut(&'s Node) -> Result<()>,
    {
        let not_found = || Error::key_not_found(key);
        let path = Nibbles::from_bytes(key);
        let mut remaining = path.as_slice();
        let mut node = self.root.as_ref().ok_or_else(not_found)?;

        loop {
            visit(node)?;
            match node {
                Node::Leaf {
                    path: leaf_path,
                    value,
                } => {
                    return if leaf_path.as_slice() == remaining {
                        Ok(value.as_slice())
                    } else {
                        Err(not_found())
                    };
                }
                Node::Extension { path: shared, next } => {
                    if !remaining.starts_with(shared.as_slice()) {
                        return Err(not_found());
                    }
                    remaining = &remaining[shared.len()..];
                    node = &**next;
                }
                Node::Branch { children, value } => match remaining.split_first() {
                    None => return value.as_deref().ok_or_else(not_found),
                    Some((nibble, rest)) => {
                        node = children[*nibble as usize].as_ref().ok_or_else(not_found)?;
                        remaining = rest;
                    }
                },
            }
        }
    }
}

fn load_node<S: Storage + ?Sized>(store: &S, hash: &Hash) -> Result<Node> {
    let bytes = store.get(hash.as_bytes())?;
    if Hash::digest(&bytes) != *hash {
        return Err(Error::Corruption(format!(
            "node {} does not match its digest",
            hash.short()
        )));
    }
    let encoded = EncodedNode::decode(&bytes)?;
    encoding::into_live(encoded, |child| load_node(store, child))
}

fn insert(node: Option<Node>, path: &[u8], value: Vec<u8>) -> Node {
    let Some(node) = node else {
        return Node::leaf(Nibbles::from(path), value);
    };

    match node {
        Node::Branch {
            mut children,
            value: mut branch_value,
        } => {
            place(&mut children, &mut branch_value, path, value);
            Node::Branch {
                children,
                value: branch_value,
            }
        }

        Node::Extension { path: shared, next } => {
            let common = shared.common_prefix_len(path);
            if common == shared.len() {
                let next = insert(Some(*next), &path[common..], value);
                return Node::Extension {
                    path: shared,
                    next: Box::new(next),
                };
            }

            // Split: the old subtree hangs off the first diverging nibble
            let shared = shared.as_slice();
            let mut children: Children = Box::default();
            let mut branch_value = None;
            children[shared[common] as usize] = Some(Node::with_prefix(&shared[common + 1..], *next));
            place(&mut children, &mut branch_value, &path[common..], value);

            Node::with_prefix(
                &shared[..common],
                Node::Branch {
                    children,
                    value: branch_value,
                },
            )
        }

        Node::Leaf {
            path: leaf_path,
            value: leaf_value,
        } => {
            if leaf_path.as_slice() == path {
                return Node::Leaf {
                    path: leaf_path,
                    value,
                };
            }

            let common = leaf_path.common_prefix_len(path);
            let mut children: Children = Box::default();
            let mut branch_value = None;
            place(
                &mut children,
                &mut branch_value,
                &leaf_path.as_slice()[common..],
                leaf_value,
            );
            place(&mut children, &mut branch_value, &path[common..], value);

            Node::with_prefix(
                &path[..common],
                Node::Branch {
                    children,
                    value: branch_value,
                },
            )
        }
    }
}

/// Put `value` under a branch: as its own value if `suffix` is used up,
/// otherwise into the child selected by the next nibble.
fn place(children: &mut Children, branch_value: &mut Option<Vec<u8>>, suffix: &[u8], value: Vec<u8>) {
    match suffix.split_first() {
        None => *branch_value = Some(value),
        Some((nibble, rest)) => {
            let slot = &mut children[*nibble as usize];
            *slot = Some(insert(slot.take(), rest, value));
        }
    }
}

fn remove(node: Node, path: &[u8]) -> Removal {
    match node {
        Node::Leaf {
            path: leaf_path,
            value,
        } => {
            if leaf_path.as_slice() == path {
                Removal::Removed(None)
            } else {
                Removal::Missing(Node::Leaf {
                    path: leaf_path,
                    value,
                })
            }
        }

        Node::Extension { path: shared, next } => {
            if !path.starts_with(shared.as_slice()) {
                return Removal::Missing(Node::Extension { path: shared, next });
            }
            match remove(*next, &path[shared.len()..]) {
                Removal::Missing(next) => Removal::Missing(Node::Extension {
                    path: shared,
                    next: Box::new(next),
                }),
                Removal::Removed(None) => Removal::Removed(None),
                Removal::Removed(Some(next)) => {
                    Removal::Removed(Some(Node::with_prefix(shared.as_slice(), next)))
                }
            }
        }

        Node::Branch {
            mut children,
            value,
        } => match path.split_first() {
            None => match value {
                None => Removal::Missing(Node::Branch {
                    children,
                    value: None,
                }),
                Some(_) => Removal::Removed(Node::collapse_branch(children, None)),
            },
            Some((nibble, rest)) => {
                let idx = *nibble as usize;
                let Some(child) = children[idx].take() else {
                    return Removal::Missing(Node::Branch { children, value });
                };
                match remove(child, rest) {
                    Removal::Missing(child) => {
                        children[idx] = Some(child);
                        Removal::Missing(Node::Branch { children, value })
                    }
                    Removal::Removed(child) => {
                        children[idx] = child;
                        Removal::Removed(Node::collapse_branch(children, value))
                    }
                }
            }
        },
    }
}

fn collect_prefix(
    node: &Node,
    prefix: &[u8],
    current: &mut Vec<u8>,
    results: &mut Vec<(Vec<u8>, Vec<u8>)>,
) {
    let depth = current.len();
    match node {
        Node::Leaf { path, value } => {
            current.extend_from_slice(path.as_slice());
            push_entry(current, prefix, value, results);
        }
        Node::Extension { path, next } => {
            current.extend_from_slice(path.as_slice());
            if overlaps(current, prefix) {
                collect_prefix(next, prefix, current, results);
            }
        }
        Node::Branch { children, value } => {
            if let Some(value) = value {
                push_entry(current, prefix, value, results);
            }
            for (nibble, child) in children.iter().enumerate() {
                if let Some(child) = child {
                    current.push(nibble as u8);
                    if overlaps(current, prefix) {
                        collect_prefix(child, prefix, current, results);
                    }
                    current.pop();
                }
            }
        }
    }
    current.truncate(depth);
}

/// Whether anything under `path` can still start with `prefix`
fn overlaps(path: &[u8], prefix: &[u8]) -> bool {
    path.starts_with(prefix) || prefix.starts_with(path)
}

fn push_entry(path: &[u8], prefix: &[u8], value: &[u8], results: &mut Vec<(Vec<u8>, Vec<u8>)>) {
    if !path.starts_with(prefix) {
        return;
    }
    if let Some(key) = Nibbles::from_raw(path.to_vec()).to_bytes() {
        results.push((key, value.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::trie::NodeKind;

    #[test]
    fn test_trie_insert_get() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        trie.put(b"key1", b"value1".to_vec());

        assert_eq!(trie.get(b"key1").unwrap(), b"value1");
        assert!(trie.get(b"key2").unwrap_err().is_not_found());
    }

    #[test]
    fn test_empty_trie() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        assert!(trie.is_empty());
        assert!(trie.get(b"anything").unwrap_err().is_not_found());
        assert!(trie.del(b"anything").unwrap_err().is_not_found());
        assert!(trie.proof(b"anything").unwrap_err().is_not_found());
        assert_eq!(trie.commit().unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_prefix_shape() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(b"key1", b"value1".to_vec());
        trie.put(b"key2", b"value2".to_vec());

        // "key1" and "key2" share 7 nibbles (6b 65 79 3_)
        let root = trie.root().unwrap();
        match root {
            Node::Extension { path, next } => {
                assert_eq!(path.as_slice(), &[6, 0xb, 6, 5, 7, 9, 3]);
                assert_eq!(next.kind(), NodeKind::Branch);
                let one = next.child(1).unwrap();
                let two = next.child(2).unwrap();
                assert_eq!(one, &Node::leaf(Nibbles::new(), b"value1".to_vec()));
                assert_eq!(two, &Node::leaf(Nibbles::new(), b"value2".to_vec()));
            }
            other => panic!("expected extension at root, got {:?}", other),
        }

        assert_eq!(trie.proof(b"key1").unwrap().len(), 3);
    }

    #[test]
    fn test_prefix_keys() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        trie.put(b"do", b"verb".to_vec());
        trie.put(b"dog", b"puppy".to_vec());
        trie.put(b"doge", b"coin".to_vec());
        trie.put(b"horse", b"stallion".to_vec());

        assert_eq!(trie.get(b"do").unwrap(), b"verb");
        assert_eq!(trie.get(b"dog").unwrap(), b"puppy");
        assert_eq!(trie.get(b"doge").unwrap(), b"coin");
        assert_eq!(trie.get(b"horse").unwrap(), b"stallion");
        assert!(trie.get(b"d").is_err());
        assert!(trie.get(b"dogs").is_err());
        assert!(trie.get(b"cat").is_err());
        assert_eq!(trie.len(), 4);
        trie.root().unwrap().validate().unwrap();
    }

    #[test]
    fn test_empty_key_and_empty_value() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        trie.put(b"", b"root".to_vec());
        trie.put(b"a", Vec::new());

        assert_eq!(trie.get(b"").unwrap(), b"root");
        assert_eq!(trie.get(b"a").unwrap(), b"");
        trie.root().unwrap().validate().unwrap();

        trie.del(b"").unwrap();
        assert!(trie.get(b"").is_err());
        assert_eq!(trie.get(b"a").unwrap(), b"");
        assert_eq!(trie.root().map(Node::kind), Some(NodeKind::Leaf));
    }

    #[test]
    fn test_update_is_idempotent() {
        let store = MemoryStore::new();
        let mut once = Trie::new(&store);
        once.put(b"key", b"value".to_vec());

        let mut twice = Trie::new(&store);
        twice.put(b"key", b"value".to_vec());
        twice.put(b"key", b"value".to_vec());
        assert_eq!(once.root(), twice.root());

        twice.put(b"key", b"value2".to_vec());
        assert_eq!(twice.get(b"key").unwrap(), b"value2");
    }

    #[test]
    fn test_extension_split_keeps_tail() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        // Extension over "abc"-ish prefix, then a key diverging in the middle
        trie.put(b"abcd1", b"1".to_vec());
        trie.put(b"abcd2", b"2".to_vec());
        trie.put(b"ab", b"3".to_vec());
        trie.put(b"ax", b"4".to_vec());
        trie.put(b"z", b"5".to_vec());

        assert_eq!(trie.get(b"abcd1").unwrap(), b"1");
        assert_eq!(trie.get(b"abcd2").unwrap(), b"2");
        assert_eq!(trie.get(b"ab").unwrap(), b"3");
        assert_eq!(trie.get(b"ax").unwrap(), b"4");
        assert_eq!(trie.get(b"z").unwrap(), b"5");
        trie.root().unwrap().validate().unwrap();
    }

    #[test]
    fn test_delete_collapses() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        trie.put(b"key1", b"value1".to_vec());
        trie.put(b"key2", b"value3".to_vec());
        trie.put(b"key3", b"value3".to_vec());
        trie.del(b"key3").unwrap();

        assert_eq!(trie.get(b"key1").unwrap(), b"value1");
        assert_eq!(trie.get(b"key2").unwrap(), b"value3");
        assert!(trie.get(b"key3").unwrap_err().is_not_found());
        trie.root().unwrap().validate().unwrap();

        trie.del(b"key2").unwrap();
        assert_eq!(
            trie.root(),
            Some(&Node::leaf(Nibbles::from_bytes(b"key1"), b"value1".to_vec()))
        );

        trie.del(b"key1").unwrap();
        assert!(trie.is_empty());
    }

    #[test]
    fn test_delete_missing_leaves_trie_untouched() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(b"do", b"verb".to_vec());
        trie.put(b"dog", b"puppy".to_vec());
        trie.put(b"horse", b"stallion".to_vec());
        let before = trie.root().cloned();

        for missing in [&b"d"[..], b"doge", b"dot", b"horses", b"h", b"cat", b""] {
            assert!(trie.del(missing).unwrap_err().is_not_found());
            assert_eq!(trie.root().cloned(), before);
        }
    }

    #[test]
    fn test_delete_restores_history_independent_shape() {
        let store = MemoryStore::new();

        let mut direct = Trie::new(&store);
        direct.put(b"do", b"verb".to_vec());
        direct.put(b"horse", b"stallion".to_vec());

        let mut churned = Trie::new(&store);
        churned.put(b"doge", b"coin".to_vec());
        churned.put(b"do", b"verb".to_vec());
        churned.put(b"dog", b"puppy".to_vec());
        churned.put(b"horse", b"stallion".to_vec());
        churned.del(b"dog").unwrap();
        churned.del(b"doge").unwrap();

        assert_eq!(direct.root(), churned.root());
        assert_eq!(direct.root_hash().unwrap(), churned.root_hash().unwrap());
    }

    #[test]
    fn test_commit_persists_every_node() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(b"key1", b"value1".to_vec());
        trie.put(b"key2", b"value2".to_vec());

        let root = trie.commit().unwrap().unwrap();
        assert_eq!(trie.root_hash().unwrap(), Some(root));
        // extension + branch + two leaves
        assert_eq!(store.len(), 4);

        let reloaded = Trie::from_root(&store, &root).unwrap();
        assert_eq!(reloaded.root(), trie.root());
        assert_eq!(reloaded.get(b"key2").unwrap(), b"value2");
    }

    #[test]
    fn test_commit_dedups_identical_subtrees() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        // Two identical leaves (same remaining path, same value) under different slots
        trie.put(b"a1", b"same".to_vec());
        trie.put(b"b1", b"same".to_vec());
        trie.commit().unwrap();
        let after_first = store.len();
        // extension + branch + one shared leaf
        assert_eq!(after_first, 3);

        trie.commit().unwrap();
        assert_eq!(store.len(), after_first);
    }

    #[test]
    fn test_commit_fails_on_closed_store() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(b"key1", b"value1".to_vec());
        trie.put(b"key2", b"value2".to_vec());
        store.close().unwrap();

        assert!(matches!(trie.commit(), Err(Error::Closed)));
        assert_eq!(trie.get(b"key1").unwrap(), b"value1");
        assert_eq!(trie.len(), 2);
    }

    #[test]
    fn test_root_changes() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        trie.put(b"key", b"value".to_vec());
        let root1 = trie.root_hash().unwrap();
        trie.put(b"key2", b"value2".to_vec());
        let root2 = trie.root_hash().unwrap();
        assert_ne!(root1, root2);

        let mut other = Trie::new(&store);
        other.put(b"key2", b"value2".to_vec());
        other.put(b"key", b"value".to_vec());
        assert_eq!(other.root_hash().unwrap(), root2);
    }

    #[test]
    fn test_from_root_detects_tampering() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(b"key1", b"value1".to_vec());
        trie.put(b"key2", b"value2".to_vec());
        let root = trie.commit().unwrap().unwrap();

        store.put(root.as_bytes(), b"not a node").unwrap();
        assert!(matches!(
            Trie::from_root(&store, &root),
            Err(Error::Corruption(_))
        ));

        let unknown = Hash::digest(b"unknown");
        assert!(matches!(
            Trie::from_root(&store, &unknown),
            Err(e) if e.is_not_found()
        ));
    }

    #[test]
    fn test_list_prefix() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        trie.put(b"t:thought2", b"t2".to_vec());
        trie.put(b"t:thought1", b"t1".to_vec());
        trie.put(b"e:edge1", b"e1".to_vec());
        trie.put(b"t:", b"tag".to_vec());

        let thoughts = trie.list_prefix(b"t:");
        assert_eq!(
            thoughts,
            vec![
                (b"t:".to_vec(), b"tag".to_vec()),
                (b"t:thought1".to_vec(), b"t1".to_vec()),
                (b"t:thought2".to_vec(), b"t2".to_vec()),
            ]
        );
        assert_eq!(trie.list_prefix(b"e:").len(), 1);
        assert!(trie.list_prefix(b"x").is_empty());
        assert_eq!(trie.entries().len(), 4);
        assert_eq!(trie.entries()[0].0, b"e:edge1".to_vec());
    }

    #[test]
    fn test_many_keys() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);

        for i in 0u32..200 {
            trie.put(format!("key{}", i).as_bytes(), format!("value{}", i).into_bytes());
        }
        for i in (0u32..200).step_by(3) {
            trie.del(format!("key{}", i).as_bytes()).unwrap();
        }
        for i in 0u32..200 {
            let got = trie.get(format!("key{}", i).as_bytes());
            if i % 3 == 0 {
                assert!(got.is_err());
            } else {
                assert_eq!(got.unwrap(), format!("value{}", i).as_bytes());
            }
        }
        trie.root().unwrap().validate().unwrap();
    }
}
