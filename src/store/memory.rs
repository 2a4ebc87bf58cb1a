//! In-memory storage

use super::Storage;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A `HashMap` behind a lock. Nothing survives the process.
#[derive(Debug)]
pub struct MemoryStore {
    map: RwLock<Option<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            map: RwLock::new(Some(HashMap::new())),
        }
    }

    /// Number of stored keys (zero once closed)
    pub fn len(&self) -> usize {
        self.map.read().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut map = self.map.write();
        let map = map.as_mut().ok_or(Error::Closed)?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let map = self.map.read();
        let map = map.as_ref().ok_or(Error::Closed)?;
        map.get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(hex::encode(key)))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut map = self.map.write();
        let map = map.as_mut().ok_or(Error::Closed)?;
        map.remove(key);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.map.write() = None;
        Ok(())
    }
}
