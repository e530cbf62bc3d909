use rocksdb::WriteBatch;
use sedra_consensus_core::blockhash::BlockHashes;
use sedra_database::prelude::{BatchDbWriter, CachedDbItem, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use std::sync::Arc;

pub trait TipsStoreReader {
    fn get(&self) -> Result<BlockHashes, StoreError>;
}

pub trait TipsStore: TipsStoreReader {
    /// Appends a new tip, pruning any of its parents from the tip set
    fn add_tip(&mut self, new_tip: Hash, new_tip_parents: &[Hash]) -> Result<BlockHashes, StoreError>;
}

/// A DB + cache implementation of `TipsStore`
#[derive(Clone)]
pub struct DbTipsStore {
    db: Arc<DB>,
    access: CachedDbItem<BlockHashes>,
}

impl DbTipsStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbItem::new(db, StoreBucket::Tips) }
    }

    pub fn is_initialized(&self) -> bool {
        self.access.read().is_ok()
    }

    pub fn init_batch(&mut self, batch: &mut WriteBatch, initial_tips: &[Hash]) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), &BlockHashes::new(initial_tips.to_vec()))
    }

    pub fn add_tip_batch(&mut self, batch: &mut WriteBatch, new_tip: Hash, new_tip_parents: &[Hash]) -> Result<BlockHashes, StoreError> {
        let tips = update_tips(self.access.read()?, new_tip_parents, new_tip);
        self.access.write(BatchDbWriter::new(batch), &tips)?;
        Ok(tips)
    }

    /// Overwrites the tip set entirely, used when the virtual base is switched
    pub fn set_batch(&mut self, batch: &mut WriteBatch, tips: BlockHashes) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), &tips)
    }
}

fn update_tips(current_tips: BlockHashes, new_tip_parents: &[Hash], new_tip: Hash) -> BlockHashes {
    let mut tips = current_tips.iter().copied().filter(|t| !new_tip_parents.contains(t)).collect::<Vec<_>>();
    tips.push(new_tip);
    BlockHashes::new(tips)
}

impl TipsStoreReader for DbTipsStore {
    fn get(&self) -> Result<BlockHashes, StoreError> {
        self.access.read()
    }
}

impl TipsStore for DbTipsStore {
    fn add_tip(&mut self, new_tip: Hash, new_tip_parents: &[Hash]) -> Result<BlockHashes, StoreError> {
        let mut batch = WriteBatch::default();
        let tips = self.add_tip_batch(&mut batch, new_tip, new_tip_parents)?;
        self.db.write(batch)?;
        Ok(tips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedra_database::prelude::create_temp_db;

    #[test]
    fn test_update_tips() {
        let (_lifetime, db) = create_temp_db();
        let mut store = DbTipsStore::new(db.clone());
        let mut batch = WriteBatch::default();
        store.init_batch(&mut batch, &[1.into()]).unwrap();
        db.write(batch).unwrap();

        store.add_tip(3.into(), &[]).unwrap();
        store.add_tip(5.into(), &[]).unwrap();
        let tips = store.add_tip(7.into(), &[3.into(), 5.into()]).unwrap();
        assert_eq!(*tips, vec![1.into(), 7.into()]);
    }
}
