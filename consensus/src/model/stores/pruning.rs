use rocksdb::WriteBatch;
use sedra_database::prelude::{BatchDbWriter, CachedDbItem, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct PruningPointInfo {
    pub pruning_point: Hash,
    /// Set while a pruning-point UTXO set import is in flight, so that a
    /// crash mid-import is detectable on startup
    pub importing_utxo_set: bool,
}

pub trait PruningStoreReader {
    fn pruning_point(&self) -> Result<Hash, StoreError>;
    fn get(&self) -> Result<PruningPointInfo, StoreError>;
}

pub trait PruningStore: PruningStoreReader {
    fn set(&mut self, info: PruningPointInfo) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `PruningStore`
#[derive(Clone)]
pub struct DbPruningStore {
    db: Arc<DB>,
    access: CachedDbItem<PruningPointInfo>,
}

impl DbPruningStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbItem::new(db, StoreBucket::PruningPoint) }
    }

    pub fn set_batch(&mut self, batch: &mut WriteBatch, info: PruningPointInfo) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), &info)
    }

    pub fn is_initialized(&self) -> bool {
        self.access.read().is_ok()
    }
}

impl PruningStoreReader for DbPruningStore {
    fn pruning_point(&self) -> Result<Hash, StoreError> {
        Ok(self.access.read()?.pruning_point)
    }

    fn get(&self) -> Result<PruningPointInfo, StoreError> {
        self.access.read()
    }
}

impl PruningStore for DbPruningStore {
    fn set(&mut self, info: PruningPointInfo) -> Result<(), StoreError> {
        self.access.write(sedra_database::prelude::DirectDbWriter::new(&self.db), &info)
    }
}
