use rocksdb::WriteBatch;
use sedra_consensus_core::blockhash::BlockHashes;
use sedra_database::prelude::{BatchDbWriter, CachedDbAccess, DbKey, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{cell::RefCell, sync::Arc};

/// Parent/child adjacency of a block within the DAG
#[derive(Clone, Serialize, Deserialize)]
pub struct BlockRelations {
    pub parents: BlockHashes,
    pub children: BlockHashes,
}

pub trait RelationsStoreReader {
    fn get_parents(&self, hash: Hash) -> Result<BlockHashes, StoreError>;
    fn get_children(&self, hash: Hash) -> Result<BlockHashes, StoreError>;
    fn has(&self, hash: Hash) -> Result<bool, StoreError>;
}

pub trait RelationsStore: RelationsStoreReader {
    /// Inserts `hash` with the given parents, also registering `hash` as a
    /// child of each parent. Parents must already exist in the store.
    fn insert(&self, hash: Hash, parents: BlockHashes) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `RelationsStore`, with concurrency support
#[derive(Clone)]
pub struct DbRelationsStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, BlockRelations>,
}

impl DbRelationsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, StoreBucket::BlockRelations) }
    }

    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, parents: BlockHashes) -> Result<(), StoreError> {
        if self.access.has(hash)? {
            return Err(StoreError::HashAlreadyExists(hash));
        }
        // Register the new block as a child of each of its parents
        for parent in parents.iter().copied() {
            let mut relations = self.access.read(parent)?;
            let mut_children = Arc::make_mut(&mut relations.children);
            mut_children.push(hash);
            self.access.write(BatchDbWriter::new(batch), parent, relations)?;
        }
        self.access.write(
            BatchDbWriter::new(batch),
            hash,
            BlockRelations { parents, children: BlockHashes::new(Vec::new()) },
        )?;
        Ok(())
    }

    /// Inserts the relations root: a block with no in-store parents
    pub fn insert_root_batch(&self, batch: &mut WriteBatch, hash: Hash) -> Result<(), StoreError> {
        self.access.write(
            BatchDbWriter::new(batch),
            hash,
            BlockRelations { parents: BlockHashes::new(Vec::new()), children: BlockHashes::new(Vec::new()) },
        )
    }
}

impl RelationsStoreReader for DbRelationsStore {
    fn get_parents(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        Ok(Arc::clone(&self.access.read(hash)?.parents))
    }

    fn get_children(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        Ok(Arc::clone(&self.access.read(hash)?.children))
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        self.access.has(hash)
    }
}

impl RelationsStore for DbRelationsStore {
    fn insert(&self, hash: Hash, parents: BlockHashes) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        self.insert_batch(&mut batch, hash, parents)?;
        self.db.write(batch)?;
        Ok(())
    }
}

/// An in-memory implementation for tests
#[derive(Default)]
pub struct MemoryRelationsStore {
    parents_map: RefCell<HashMap<Hash, BlockHashes>>,
    children_map: RefCell<HashMap<Hash, Vec<Hash>>>,
}

impl MemoryRelationsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationsStoreReader for MemoryRelationsStore {
    fn get_parents(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        match self.parents_map.borrow().get(&hash) {
            Some(parents) => Ok(BlockHashes::clone(parents)),
            None => Err(StoreError::KeyNotFound(DbKey::bucket(StoreBucket::BlockRelations, hash))),
        }
    }

    fn get_children(&self, hash: Hash) -> Result<BlockHashes, StoreError> {
        Ok(BlockHashes::new(self.children_map.borrow().get(&hash).cloned().unwrap_or_default()))
    }

    fn has(&self, hash: Hash) -> Result<bool, StoreError> {
        Ok(self.parents_map.borrow().contains_key(&hash))
    }
}

impl RelationsStore for MemoryRelationsStore {
    fn insert(&self, hash: Hash, parents: BlockHashes) -> Result<(), StoreError> {
        for parent in parents.iter().copied() {
            self.children_map.borrow_mut().entry(parent).or_default().push(hash);
        }
        self.parents_map.borrow_mut().insert(hash, parents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedra_database::prelude::create_temp_db;

    #[test]
    fn test_insert_and_children_tracking() {
        let (_lifetime, db) = create_temp_db();
        let store = DbRelationsStore::new(db.clone(), 16);

        let mut batch = WriteBatch::default();
        store.insert_root_batch(&mut batch, 1.into()).unwrap();
        db.write(batch).unwrap();

        store.insert(2.into(), BlockHashes::new(vec![1.into()])).unwrap();
        store.insert(3.into(), BlockHashes::new(vec![1.into(), 2.into()])).unwrap();

        assert_eq!(*store.get_parents(3.into()).unwrap(), vec![1.into(), 2.into()]);
        assert_eq!(*store.get_children(1.into()).unwrap(), vec![2.into(), 3.into()]);
        assert_eq!(*store.get_children(2.into()).unwrap(), vec![3.into()]);
        assert!(store.insert(2.into(), BlockHashes::new(vec![1.into()])).is_err());
    }
}
