//! Key/value storage collaborators
//!
//! The trie persists nodes through the [`Storage`] trait: committed nodes are
//! stored under their digest, so every backend is content-addressed in
//! practice even though the trait itself takes arbitrary byte keys.

mod file_store;
mod memory;
mod record;

pub use file_store::FileStore;
pub use memory::MemoryStore;

use crate::Result;

/// Byte-keyed storage used by the trie.
///
/// Methods take `&self`; implementations handle their own interior
/// mutability so one store can back several tries.
pub trait Storage {
    /// Store `value` under `key`, replacing any previous value
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Fetch the value under `key`, `NotFound` if absent
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Remove `key` (absent keys are not an error)
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Release the store; later calls fail with `Closed`
    fn close(&self) -> Result<()>;

    /// Whether `key` is present
    fn contains(&self, key: &[u8]) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn overwrite_then_get<S: Storage>(store: &S) -> Vec<u8> {
        store.put(b"key", b"v1").unwrap();
        store.put(b"key", b"v2").unwrap();
        store.get(b"key").unwrap()
    }

    #[test]
    fn test_backends_agree_on_overwrite() {
        let dir = tempdir().unwrap();
        let file = FileStore::create(dir.path().join("test.patricia")).unwrap();
        let memory = MemoryStore::new();

        assert_eq!(overwrite_then_get(&memory), b"v2");
        assert_eq!(overwrite_then_get(&file), b"v2");
    }
}
