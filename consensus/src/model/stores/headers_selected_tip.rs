use crate::processes::ghostdag::ordering::SortableBlock;
use rocksdb::WriteBatch;
use sedra_database::prelude::{BatchDbWriter, CachedDbItem, StoreBucket, StoreError, DB};
use std::sync::Arc;

pub trait HeadersSelectedTipStoreReader {
    fn get(&self) -> Result<SortableBlock, StoreError>;
}

pub trait HeadersSelectedTipStore: HeadersSelectedTipStoreReader {
    fn set(&mut self, block: SortableBlock) -> Result<(), StoreError>;
}

/// Tracks the tip with the highest blue work among all blocks whose headers
/// were admitted, bodies present or not. This is the sync anchor: during
/// header-first download it runs ahead of the virtual.
#[derive(Clone)]
pub struct DbHeadersSelectedTipStore {
    db: Arc<DB>,
    access: CachedDbItem<SortableBlock>,
}

impl DbHeadersSelectedTipStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbItem::new(db, StoreBucket::HeadersSelectedTip) }
    }

    pub fn set_batch(&mut self, batch: &mut WriteBatch, block: SortableBlock) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), &block)
    }

    pub fn is_initialized(&self) -> bool {
        self.access.read().is_ok()
    }
}

impl HeadersSelectedTipStoreReader for DbHeadersSelectedTipStore {
    fn get(&self) -> Result<SortableBlock, StoreError> {
        self.access.read()
    }
}

impl HeadersSelectedTipStore for DbHeadersSelectedTipStore {
    fn set(&mut self, block: SortableBlock) -> Result<(), StoreError> {
        self.access.write(sedra_database::prelude::DirectDbWriter::new(&self.db), &block)
    }
}
