use rocksdb::WriteBatch;
use sedra_consensus_core::blockstatus::BlockStatus;
use sedra_database::prelude::{BatchDbWriter, CachedDbAccess, StoreBucket, StoreError, StoreResultExtensions, DB};
use sedra_hashes::Hash;
use std::sync::Arc;

pub trait StatusesStoreReader {
    fn get(&self, hash: Hash) -> Result<BlockStatus, StoreError>;
    fn has(&self, hash: Hash) -> Result<bool, StoreError>;
}

pub trait StatusesStore: StatusesStoreReader {
    /// Statuses are mutable: a block transitions e.g. from header-only to
    /// body-holding, or from pending to UTXO-valid
    fn set(&mut self, hash: Hash, status: BlockStatus) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `StatusesStore`
#[derive(Clone)]
pub struct DbStatusesStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, BlockStatus>,
}

impl DbStatusesStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, StoreBucket::BlockStatus) }
    }

    pub fn set_batch(&self, batch: &mut WriteBatch, hash: Hash, status: BlockStatus) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), hash, status)
    }

    pub fn get_option(&self, hash: Hash) -> Option<BlockStatus> {
        self.access.read(hash).unwrap_option()
    }
}

impl StatusesStoreReader for DbStatusesStore {
    fn get(&self, hash: Hash) -> Result<BlockStatus, StoreError> {
        self.access.read(hash)
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        self.access.has(hash)
    }
}

impl StatusesStore for DbStatusesStore {
    fn set(&mut self, hash: Hash, status: BlockStatus) -> Result<(), StoreError> {
        self.access.write(sedra_database::prelude::DirectDbWriter::new(&self.db), hash, status)
    }
}
