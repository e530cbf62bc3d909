use rocksdb::WriteBatch;
use sedra_database::prelude::{BatchDbWriter, CachedDbAccess, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use sedra_muhash::MuHash;
use std::sync::Arc;

pub trait UtxoMultisetsStoreReader {
    fn get(&self, hash: Hash) -> Result<MuHash, StoreError>;
}

pub trait UtxoMultisetsStore: UtxoMultisetsStoreReader {
    fn insert(&self, hash: Hash, multiset: MuHash) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `UtxoMultisetsStore`
#[derive(Clone)]
pub struct DbUtxoMultisetsStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, MuHash>,
}

impl DbUtxoMultisetsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, StoreBucket::Multiset) }
    }

    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, multiset: MuHash) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), hash, multiset)
    }
}

impl UtxoMultisetsStoreReader for DbUtxoMultisetsStore {
    fn get(&self, hash: Hash) -> Result<MuHash, StoreError> {
        self.access.read(hash)
    }
}

impl UtxoMultisetsStore for DbUtxoMultisetsStore {
    fn insert(&self, hash: Hash, multiset: MuHash) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        self.insert_batch(&mut batch, hash, multiset)?;
        self.db.write(batch)?;
        Ok(())
    }
}
