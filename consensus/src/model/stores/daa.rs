use rocksdb::WriteBatch;
use sedra_consensus_core::blockhash::BlockHashes;
use sedra_database::prelude::{BatchDbWriter, CachedDbAccess, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use std::sync::Arc;

pub trait DaaStoreReader {
    /// The merge-set blocks which were counted into the difficulty-adjustment
    /// window of the given block
    fn get_daa_added_blocks(&self, hash: Hash) -> Result<BlockHashes, StoreError>;
}

pub trait DaaStore: DaaStoreReader {
    fn insert(&self, hash: Hash, added_blocks: BlockHashes) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `DaaStore`
#[derive(Clone)]
pub struct DbDaaStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, BlockHashes>,
}

impl DbDaaStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, StoreBucket::DaaAddedBlocks) }
    }

    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, added_blocks: BlockHashes) -> Result<(), StoreError> {
        if self.access.has(hash)? {
            return Err(StoreError::HashAlreadyExists(hash));
        }
        self.access.write(BatchDbWriter::new(batch), hash, added_blocks)
    }
}

impl DaaStoreReader for DbDaaStore {
    fn get_daa_added_blocks(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        self.access.read(hash)
    }
}

impl DaaStore for DbDaaStore {
    fn insert(&self, hash: Hash, added_blocks: BlockHashes) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        self.insert_batch(&mut batch, hash, added_blocks)?;
        self.db.write(batch)?;
        Ok(())
    }
}
