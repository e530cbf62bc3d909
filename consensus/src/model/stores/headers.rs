use rocksdb::WriteBatch;
use sedra_consensus_core::header::Header;
use sedra_database::prelude::{BatchDbWriter, CachedDbAccess, DbKey, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct CompactHeaderData {
    pub daa_score: u64,
    pub timestamp: u64,
    pub bits: u32,
}

impl From<&Header> for CompactHeaderData {
    fn from(header: &Header) -> Self {
        Self { daa_score: header.daa_score, timestamp: header.timestamp, bits: header.bits }
    }
}

pub trait HeaderStoreReader {
    fn get_daa_score(&self, hash: Hash) -> Result<u64, StoreError>;
    fn get_timestamp(&self, hash: Hash) -> Result<u64, StoreError>;
    fn get_bits(&self, hash: Hash) -> Result<u32, StoreError>;
    fn get_header(&self, hash: Hash) -> Result<Arc<Header>, StoreError>;
    fn get_compact_header_data(&self, hash: Hash) -> Result<CompactHeaderData, StoreError>;
    fn has(&self, hash: Hash) -> Result<bool, StoreError>;
}

pub trait HeaderStore: HeaderStoreReader {
    // This is append only
    fn insert(&self, hash: Hash, header: Arc<Header>) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `HeaderStore`, with concurrency support
#[derive(Clone)]
pub struct DbHeadersStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Arc<Header>>,
    compact_access: CachedDbAccess<Hash, CompactHeaderData>,
}

impl DbHeadersStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self {
            db: Arc::clone(&db),
            access: CachedDbAccess::new(Arc::clone(&db), cache_size, StoreBucket::BlockHeader),
            compact_access: CachedDbAccess::new(db, cache_size, StoreBucket::BlockHeaderCompact),
        }
    }

    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, header: Arc<Header>) -> Result<(), StoreError> {
        if self.access.has(hash)? {
            return Err(StoreError::HashAlreadyExists(hash));
        }
        self.compact_access.write(BatchDbWriter::new(batch), hash, header.as_ref().into())?;
        self.access.write(BatchDbWriter::new(batch), hash, header)?;
        Ok(())
    }
}

impl HeaderStoreReader for DbHeadersStore {
    fn get_daa_score(&self, hash: Hash) -> Result<u64, StoreError> {
        if let Some(header) = self.access.read_from_cache(&hash) {
            return Ok(header.daa_score);
        }
        Ok(self.compact_access.read(hash)?.daa_score)
    }

    fn get_timestamp(&self, hash: Hash) -> Result<u64, StoreError> {
        if let Some(header) = self.access.read_from_cache(&hash) {
            return Ok(header.timestamp);
        }
        Ok(self.compact_access.read(hash)?.timestamp)
    }

    fn get_bits(&self, hash: Hash) -> Result<u32, StoreError> {
        if let Some(header) = self.access.read_from_cache(&hash) {
            return Ok(header.bits);
        }
        Ok(self.compact_access.read(hash)?.bits)
    }

    fn get_header(&self, hash: Hash) -> Result<Arc<Header>, StoreError> {
        self.access.read(hash)
    }

    fn get_compact_header_data(&self, hash: Hash) -> Result<CompactHeaderData, StoreError> {
        self.compact_access.read(hash)
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        self.access.has(hash)
    }
}

impl HeaderStore for DbHeadersStore {
    fn insert(&self, hash: Hash, header: Arc<Header>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        self.insert_batch(&mut batch, hash, header)?;
        self.db.write(batch)?;
        Ok(())
    }
}

/// An in-memory implementation for tests
#[derive(Default)]
pub struct MemoryHeadersStore {
    map: RefCell<HashMap<Hash, Arc<Header>>>,
}

impl MemoryHeadersStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, hash: Hash) -> Result<Arc<Header>, StoreError> {
        self.map
            .borrow()
            .get(&hash)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(DbKey::bucket(StoreBucket::BlockHeader, hash)))
    }
}

impl HeaderStoreReader for MemoryHeadersStore {
    fn get_daa_score(&self, hash: Hash) -> Result<u64, StoreError> {
        Ok(self.get(hash)?.daa_score)
    }

    fn get_timestamp(&self, hash: Hash) -> Result<u64, StoreError> {
        Ok(self.get(hash)?.timestamp)
    }

    fn get_bits(&self, hash: Hash) -> Result<u32, StoreError> {
        Ok(self.get(hash)?.bits)
    }

    fn get_header(&self, hash: Hash) -> Result<Arc<Header>, StoreError> {
        self.get(hash)
    }

    fn get_compact_header_data(&self, hash: Hash) -> Result<CompactHeaderData, StoreError> {
        Ok(self.get(hash)?.as_ref().into())
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        Ok(self.map.borrow().contains_key(&hash))
    }
}

impl HeaderStore for MemoryHeadersStore {
    fn insert(&self, hash: Hash, header: Arc<Header>) -> Result<(), StoreError> {
        self.map.borrow_mut().insert(hash, header);
        Ok(())
    }
}
