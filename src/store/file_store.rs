//! Single-file key/value store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("PATRICIA")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes (bit 0: head root present)
//!   - entry_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - head root: 32 bytes
//!
//! [RECORDS: variable]
//!   - framed values (codec byte + payload), appended
//!
//! [INDEX: variable]
//!   - entries sorted by key: key_len (u16 LE), key, offset (u64 LE), size (u32 LE)
//! ```
//!
//! The index and header are only rewritten by [`FileStore::sync`]; records
//! written after the last sync are lost if the process dies first.

use super::record;
use super::Storage;
use crate::config::StoreConfig;
use crate::model::Hash;
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER_SIZE: u64 = 64;

const FLAG_HEAD: u32 = 1;

/// Location of a record
#[derive(Clone, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A durable [`Storage`] backed by a single file
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    /// `None` once closed
    file: RwLock<Option<File>>,
    index: RwLock<HashMap<Vec<u8>, IndexEntry>>,
    /// Last committed trie root
    head: RwLock<Option<Hash>>,
    /// Current append position
    write_offset: RwLock<u64>,
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, StoreConfig::default())
    }

    pub fn create_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(path = %path.display(), "created store");

        Ok(FileStore {
            path,
            config,
            file: RwLock::new(Some(file)),
            index: RwLock::new(HashMap::new()),
            head: RwLock::new(None),
            write_offset: RwLock::new(HEADER_SIZE),
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::InvalidFile("Truncated header".into()),
            _ => Error::Io(e),
        })?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = le_u32(&header[8..12]);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let flags = le_u32(&header[12..16]);
        let entry_count = le_u64(&header[16..24]);
        let index_offset = le_u64(&header[24..32]);
        let head = if flags & FLAG_HEAD != 0 {
            Some(Hash::from_slice(&header[32..64])?)
        } else {
            None
        };

        if index_offset > file_len || (index_offset > 0 && index_offset < HEADER_SIZE) {
            return Err(Error::InvalidFile(format!(
                "Index offset {} outside file of {} bytes",
                index_offset, file_len
            )));
        }

        let mut index = HashMap::new();
        if index_offset > 0 && entry_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..entry_count {
                let mut len_buf = [0u8; 2];
                file.read_exact(&mut len_buf)?;
                let mut key = vec![0u8; u16::from_le_bytes(len_buf) as usize];
                file.read_exact(&mut key)?;

                let mut entry_buf = [0u8; 12];
                file.read_exact(&mut entry_buf)?;
                let offset = le_u64(&entry_buf[0..8]);
                let size = le_u32(&entry_buf[8..12]);

                let end = offset.checked_add(size as u64);
                if offset < HEADER_SIZE || end.map_or(true, |end| end > index_offset) {
                    return Err(Error::Corruption(format!(
                        "Record for {} lies outside the record area",
                        hex::encode(&key)
                    )));
                }
                index.insert(key, IndexEntry { offset, size });
            }
        }

        // Appends resume where the index starts; it is rewritten on sync
        let write_offset = if index_offset > 0 {
            index_offset
        } else {
            file.seek(SeekFrom::End(0))?
        };

        debug!(
            path = %path.display(),
            entries = index.len(),
            head = ?head,
            "opened store"
        );

        Ok(FileStore {
            path,
            config,
            file: RwLock::new(Some(file)),
            index: RwLock::new(index),
            head: RwLock::new(head),
            write_offset: RwLock::new(write_offset),
        })
    }

    /// Open the store at `path`, creating it if it does not exist
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_or_create_with_config(path, StoreConfig::default())
    }

    pub fn open_or_create_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open_with_config(path, config)
        } else {
            Self::create_with_config(path, config)
        }
    }

    /// Root recorded by the last [`set_head`](Self::set_head)
    pub fn head(&self) -> Option<Hash> {
        *self.head.read()
    }

    /// Record the current trie root (`None` for an empty trie).
    /// Durable at the next sync.
    pub fn set_head(&self, root: Option<Hash>) {
        *self.head.write() = root;
    }

    /// Number of live keys
    pub fn object_count(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    /// Write the index and header, then flush everything to disk
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let head = self.head.read();
        let write_offset = *self.write_offset.read();
        let mut file = self.file.write();
        let file = file.as_mut().ok_or(Error::Closed)?;

        file.seek(SeekFrom::Start(write_offset))?;

        // Sort by key for determinism
        let mut entries: Vec<_> = index.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut buf = Vec::new();
        for (key, entry) in entries {
            buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.size.to_le_bytes());
        }
        file.write_all(&buf)?;
        file.set_len(write_offset + buf.len() as u64)?;

        let flags = if head.is_some() { FLAG_HEAD } else { 0 };
        file.seek(SeekFrom::Start(12))?;
        file.write_all(&flags.to_le_bytes())?;
        file.write_all(&(index.len() as u64).to_le_bytes())?;
        file.write_all(&write_offset.to_le_bytes())?;
        file.write_all(head.as_ref().map_or(&[0u8; 32][..], |h| &h.as_bytes()[..]))?;

        file.sync_all()?;
        debug!(entries = index.len(), head = ?head.as_ref(), "synced store");
        Ok(())
    }
}

impl Storage for FileStore {
    /// Append a record for `key` and point the index at it. Rewriting a key
    /// with the value it already holds appends nothing.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if key.len() > u16::MAX as usize {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("key of {} bytes is too long", key.len()),
            )));
        }
        match self.get(key) {
            Ok(existing) if existing == value => return Ok(()),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let framed = record::encode(value, &self.config)?;
        let size = u32::try_from(framed.len()).map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("value of {} bytes is too large", value.len()),
            ))
        })?;

        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            let file = file.as_mut().ok_or(Error::Closed)?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&framed)?;

            *write_offset = offset + size as u64;
            offset
        };

        self.index
            .write()
            .insert(key.to_vec(), IndexEntry { offset, size });
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let entry = self.index.read().get(key).cloned();

        let mut file = self.file.write();
        let file = file.as_mut().ok_or(Error::Closed)?;
        let entry = entry.ok_or_else(|| Error::NotFound(hex::encode(key)))?;

        file.seek(SeekFrom::Start(entry.offset))?;
        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;

        record::decode(&data)
    }

    /// Drop `key` from the index; the record bytes stay in the file
    fn delete(&self, key: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.index.write().remove(key);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.sync()?;
        *self.file.write() = None;
        debug!(path = %self.path.display(), "closed store");
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        if !self.is_closed() {
            let _ = self.sync();
        }
    }
}
