//! Trie node types
//!
//! The live tree is a strict tree: every node is owned by its parent (or by
//! the trie root), so mutation builds a replacement subtree and hands it back
//! to the caller instead of rewriting shared pointers.

use crate::model::Nibbles;
use crate::{Error, Result};

/// Children of a branch, indexed by nibble
pub type Children = Box<[Option<Node>; 16]>;

/// A node in the live (uncommitted) trie
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Terminal node holding the unconsumed rest of its key
    Leaf {
        /// Remaining key nibbles
        path: Nibbles,
        value: Vec<u8>,
    },
    /// Path compression: a non-empty run of nibbles shared by everything below
    Extension { path: Nibbles, next: Box<Node> },
    /// 16-way fan-out plus the value of a key that ends exactly here
    Branch {
        children: Children,
        value: Option<Vec<u8>>,
    },
}

/// Shape of a node, without its contents
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Extension,
    Branch,
}

impl Node {
    /// Create a leaf node
    pub fn leaf(path: Nibbles, value: Vec<u8>) -> Self {
        Node::Leaf { path, value }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Leaf { .. } => NodeKind::Leaf,
            Node::Extension { .. } => NodeKind::Extension,
            Node::Branch { .. } => NodeKind::Branch,
        }
    }

    /// Child of a branch at `nibble`
    pub fn child(&self, nibble: u8) -> Option<&Node> {
        match self {
            Node::Branch { children, .. } => children.get(nibble as usize)?.as_ref(),
            _ => None,
        }
    }

    /// Number of keys stored in this subtree
    pub fn value_count(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Extension { next, .. } => next.value_count(),
            Node::Branch { children, value } => {
                usize::from(value.is_some())
                    + children.iter().flatten().map(Node::value_count).sum::<usize>()
            }
        }
    }

    /// Re-root `node` under `prefix`, merging the prefix into a leaf or
    /// extension instead of stacking a second path node on top of it.
    pub fn with_prefix(prefix: &[u8], node: Node) -> Node {
        if prefix.is_empty() {
            return node;
        }
        match node {
            Node::Leaf { path, value } => Node::Leaf {
                path: path.prepend(prefix),
                value,
            },
            Node::Extension { path, next } => Node::Extension {
                path: path.prepend(prefix),
                next,
            },
            branch @ Node::Branch { .. } => Node::Extension {
                path: Nibbles::from(prefix),
                next: Box::new(branch),
            },
        }
    }

    /// Rebuild a branch after one of its entries went away.
    ///
    /// A branch left with a single entry is folded into something smaller:
    /// a lone value becomes an empty-path leaf, a lone child absorbs its
    /// selecting nibble. `None` means nothing is left.
    pub fn collapse_branch(mut children: Children, value: Option<Vec<u8>>) -> Option<Node> {
        let mut occupied = children
            .iter()
            .enumerate()
            .filter_map(|(idx, child)| child.as_ref().map(|_| idx));
        let first = occupied.next();
        let second = occupied.next();

        match (first, second, value) {
            (None, _, None) => None,
            (None, _, Some(value)) => Some(Node::leaf(Nibbles::new(), value)),
            (Some(idx), None, None) => children[idx]
                .take()
                .map(|child| Node::with_prefix(&[idx as u8], child)),
            (_, _, value) => Some(Node::Branch { children, value }),
        }
    }

    /// Check the structural invariants of this subtree.
    ///
    /// Extensions carry a non-empty path and always point at a branch;
    /// branches hold at least two entries (children or value), except that a
    /// branch with one child may also carry a value.
    pub fn validate(&self) -> Result<()> {
        match self {
            Node::Leaf { .. } => Ok(()),
            Node::Extension { path, next } => {
                if path.is_empty() {
                    return Err(Error::Corruption("extension with empty path".into()));
                }
                if next.kind() != NodeKind::Branch {
                    return Err(Error::Corruption(format!(
                        "extension {} points at {:?}, expected Branch",
                        path,
                        next.kind()
                    )));
                }
                next.validate()
            }
            Node::Branch { children, value } => {
                let occupied = children.iter().flatten().count();
                if occupied + usize::from(value.is_some()) < 2 {
                    return Err(Error::Corruption(format!(
                        "branch with {} children and {} value should have collapsed",
                        occupied,
                        if value.is_some() { "a" } else { "no" }
                    )));
                }
                children.iter().flatten().try_for_each(Node::validate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(path: &[u8], value: &[u8]) -> Node {
        Node::leaf(Nibbles::from(path), value.to_vec())
    }

    fn branch_of(entries: Vec<(u8, Node)>, value: Option<&[u8]>) -> Node {
        let mut children: Children = Box::default();
        for (idx, child) in entries {
            children[idx as usize] = Some(child);
        }
        Node::Branch {
            children,
            value: value.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn test_with_prefix_merges_paths() {
        assert_eq!(Node::with_prefix(&[1, 2], leaf(&[3], b"v")), leaf(&[1, 2, 3], b"v"));

        let branch = branch_of(vec![(0, leaf(&[], b"a")), (1, leaf(&[], b"b"))], None);
        let ext = Node::with_prefix(&[4], branch.clone());
        assert_eq!(ext.kind(), NodeKind::Extension);

        let merged = Node::with_prefix(&[3], ext);
        match merged {
            Node::Extension { path, next } => {
                assert_eq!(path.as_slice(), &[3, 4]);
                assert_eq!(*next, branch);
            }
            other => panic!("expected extension, got {:?}", other),
        }

        assert_eq!(Node::with_prefix(&[], leaf(&[7], b"x")), leaf(&[7], b"x"));
    }

    #[test]
    fn test_collapse_branch() {
        assert_eq!(Node::collapse_branch(Box::default(), None), None);
        assert_eq!(
            Node::collapse_branch(Box::default(), Some(b"v".to_vec())),
            Some(leaf(&[], b"v"))
        );

        let mut children: Children = Box::default();
        children[9] = Some(leaf(&[1], b"only"));
        assert_eq!(
            Node::collapse_branch(children, None),
            Some(leaf(&[9, 1], b"only"))
        );

        let mut children: Children = Box::default();
        children[9] = Some(leaf(&[1], b"child"));
        let kept = Node::collapse_branch(children, Some(b"v".to_vec())).unwrap();
        assert_eq!(kept.kind(), NodeKind::Branch);
        assert_eq!(kept.value_count(), 2);
    }

    #[test]
    fn test_validate() {
        let good = Node::with_prefix(
            &[6],
            branch_of(vec![(1, leaf(&[], b"a")), (2, leaf(&[], b"b"))], None),
        );
        assert!(good.validate().is_ok());

        let lonely = branch_of(vec![(1, leaf(&[], b"a"))], None);
        assert!(matches!(lonely.validate(), Err(Error::Corruption(_))));

        let bad_ext = Node::Extension {
            path: Nibbles::from(&[1u8][..]),
            next: Box::new(leaf(&[2], b"x")),
        };
        assert!(bad_ext.validate().is_err());

        let empty_ext = Node::Extension {
            path: Nibbles::new(),
            next: Box::new(branch_of(vec![(1, leaf(&[], b"a")), (2, leaf(&[], b"b"))], None)),
        };
        assert!(empty_ext.validate().is_err());
    }

    #[test]
    fn test_child() {
        let branch = branch_of(vec![(3, leaf(&[], b"a")), (4, leaf(&[], b"b"))], None);
        assert!(branch.child(3).is_some());
        assert!(branch.child(5).is_none());
        assert!(branch.child(16).is_none());

        let ext = Node::with_prefix(&[1], branch);
        assert!(ext.child(3).is_none());
    }
}
