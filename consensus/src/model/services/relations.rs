use crate::model::stores::relations::{RelationsStoreReader};
use parking_lot::RwLock;
use sedra_consensus_core::blockhash::BlockHashes;
use sedra_database::prelude::StoreError;
use sedra_hashes::Hash;
use std::sync::Arc;

/// Multi-threaded block-relations service over an RwLock-guarded store
#[derive(Clone)]
pub struct MTRelationsService<T: RelationsStoreReader> {
    store: Arc<RwLock<T>>,
}

impl<T: RelationsStoreReader> MTRelationsService<T> {
    pub fn new(store: Arc<RwLock<T>>) -> Self {
        Self { store }
    }
}

impl<T: RelationsStoreReader> RelationsStoreReader for MTRelationsService<T> {
    fn get_parents(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        self.store.read().get_parents(hash)
    }

    fn get_children(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        self.store.read().get_children(hash)
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        self.store.read().has(hash)
    }
}
