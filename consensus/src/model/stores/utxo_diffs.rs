use rocksdb::WriteBatch;
use sedra_consensus_core::utxo::utxo_diff::UtxoDiff;
use sedra_database::prelude::{BatchDbWriter, CachedDbAccess, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use std::sync::Arc;

/// Store for the UTXO difference of a block relative to its selected parent.
/// The data is computed lazily, only for blocks which are candidates to being
/// chain blocks, but once computed it is permanent.

pub trait UtxoDiffsStoreReader {
    fn get(&self, hash: Hash) -> Result<Arc<UtxoDiff>, StoreError>;
    fn has(&self, hash: Hash) -> Result<bool, StoreError>;
}

pub trait UtxoDiffsStore: UtxoDiffsStoreReader {
    fn insert(&self, hash: Hash, utxo_diff: Arc<UtxoDiff>) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `UtxoDiffsStore`
#[derive(Clone)]
pub struct DbUtxoDiffsStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Arc<UtxoDiff>>,
}

impl DbUtxoDiffsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, StoreBucket::UtxoDiff) }
    }

    /// Unlike most block data, a chain block's diff may be overwritten when
    /// the chain reorganizes around it, hence no existence check
    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, utxo_diff: Arc<UtxoDiff>) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), hash, utxo_diff)
    }
}

impl UtxoDiffsStoreReader for DbUtxoDiffsStore {
    fn get(&self, hash: Hash) -> Result<Arc<UtxoDiff>, StoreError> {
        self.access.read(hash)
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        self.access.has(hash)
    }
}

impl UtxoDiffsStore for DbUtxoDiffsStore {
    fn insert(&self, hash: Hash, utxo_diff: Arc<UtxoDiff>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        self.insert_batch(&mut batch, hash, utxo_diff)?;
        self.db.write(batch)?;
        Ok(())
    }
}
