use crate::{
    cache::Cache,
    db::DB,
    errors::StoreError,
    key::DbKey,
    registry::StoreBucket,
    writer::DbWriter,
};
use rocksdb::{Direction, IteratorMode, ReadOptions};
use serde::{de::DeserializeOwned, Serialize};
use std::{error::Error, hash::Hash, sync::Arc};

/// A concurrent, typed store access over a single bucket, with caching.
#[derive(Clone)]
pub struct CachedDbAccess<TKey, TData>
where
    TKey: Clone + Hash + Eq + Send + Sync,
    TData: Clone + Send + Sync,
{
    db: Arc<DB>,
    cache: Cache<TKey, TData>,
    bucket: StoreBucket,
}

impl<TKey, TData> CachedDbAccess<TKey, TData>
where
    TKey: Clone + Hash + Eq + Send + Sync + AsRef<[u8]>,
    TData: Clone + Send + Sync,
{
    pub fn new(db: Arc<DB>, cache_size: u64, bucket: StoreBucket) -> Self {
        Self { db, cache: Cache::new(cache_size), bucket }
    }

    pub fn read_from_cache(&self, key: &TKey) -> Option<TData> {
        self.cache.get(key)
    }

    pub fn has(&self, key: TKey) -> Result<bool, StoreError> {
        Ok(self.cache.contains_key(&key) || self.db.get_pinned(DbKey::bucket(self.bucket, &key))?.is_some())
    }

    pub fn read(&self, key: TKey) -> Result<TData, StoreError>
    where
        TData: DeserializeOwned,
    {
        if let Some(data) = self.cache.get(&key) {
            return Ok(data);
        }
        let db_key = DbKey::bucket(self.bucket, &key);
        if let Some(slice) = self.db.get_pinned(&db_key)? {
            let data: TData = bincode::deserialize(&slice)?;
            self.cache.insert(key, data.clone());
            Ok(data)
        } else {
            Err(StoreError::KeyNotFound(db_key))
        }
    }

    pub fn write(&self, mut writer: impl DbWriter, key: TKey, data: TData) -> Result<(), StoreError>
    where
        TData: Serialize,
    {
        let bin_data = bincode::serialize(&data)?;
        self.cache.insert(key.clone(), data);
        writer.put(DbKey::bucket(self.bucket, &key), bin_data)?;
        Ok(())
    }

    pub fn write_many(
        &self,
        mut writer: impl DbWriter,
        iter: impl Iterator<Item = (TKey, TData)>,
    ) -> Result<(), StoreError>
    where
        TData: Serialize,
    {
        for (key, data) in iter {
            let bin_data = bincode::serialize(&data)?;
            writer.put(DbKey::bucket(self.bucket, &key), bin_data)?;
            self.cache.insert(key, data);
        }
        Ok(())
    }

    pub fn delete(&self, mut writer: impl DbWriter, key: TKey) -> Result<(), StoreError> {
        self.cache.remove(&key);
        writer.delete(DbKey::bucket(self.bucket, &key))?;
        Ok(())
    }

    pub fn delete_many(&self, mut writer: impl DbWriter, keys: impl Iterator<Item = TKey>) -> Result<(), StoreError> {
        for key in keys {
            self.cache.remove(&key);
            writer.delete(DbKey::bucket(self.bucket, &key))?;
        }
        Ok(())
    }

    /// Deletes the whole bucket through a ranged delete. The cache is dropped
    /// entirely since per-key invalidation is impossible here.
    pub fn delete_all(&self, mut writer: impl DbWriter) -> Result<(), StoreError> {
        self.cache.remove_all();
        let from = DbKey::prefix_only(self.bucket.as_ref());
        let mut to = from.as_ref().to_vec();
        *to.last_mut().unwrap() += 1;
        writer.delete_range(from.as_ref(), &to)?;
        Ok(())
    }

    /// Iterates the bucket in key order, optionally seeking to `from_key`
    /// first. Yielded keys are stripped of the bucket prefix.
    pub fn iterator(
        &self,
        from_key: Option<TKey>,
    ) -> impl Iterator<Item = Result<(Box<[u8]>, TData), Box<dyn Error>>> + '_
    where
        TData: DeserializeOwned,
    {
        let prefix = DbKey::prefix_only(self.bucket.as_ref());
        let prefix_len = prefix.as_ref().len();
        let seek_key: Option<Vec<u8>> = from_key.map(|k| DbKey::bucket(self.bucket, &k).as_ref().to_vec());
        let mut read_opts = ReadOptions::default();
        read_opts.set_iterate_range(rocksdb::PrefixRange(prefix.as_ref().to_vec()));
        let iter = match seek_key.as_ref() {
            Some(key) => self.db.iterator_opt(IteratorMode::From(key, Direction::Forward), read_opts),
            None => self.db.iterator_opt(IteratorMode::Start, read_opts),
        };
        iter.map(move |item| {
            item.map_err(|e| -> Box<dyn Error> { e.into() }).and_then(|(key_bytes, value_bytes)| {
                match bincode::deserialize::<TData>(&value_bytes) {
                    Ok(value) => Ok((key_bytes[prefix_len..].into(), value)),
                    Err(e) => Err(e.into()),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_temp_db;
    use crate::writer::{BatchDbWriter, DirectDbWriter};
    use rocksdb::WriteBatch;
    use sedra_hashes::Hash;

    #[test]
    fn test_write_read_delete() {
        let (_lifetime, db) = create_temp_db();
        let access: CachedDbAccess<Hash, u64> = CachedDbAccess::new(db.clone(), 2, StoreBucket::Ghostdag);

        access.write(DirectDbWriter::new(&db), 1.into(), 42).unwrap();
        assert!(access.has(1.into()).unwrap());
        assert_eq!(access.read(1.into()).unwrap(), 42);

        access.delete(DirectDbWriter::new(&db), 1.into()).unwrap();
        assert!(!access.has(1.into()).unwrap());
        assert!(matches!(access.read(1.into()), Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn test_batch_visibility() {
        let (_lifetime, db) = create_temp_db();
        // Zero cache so that reads must go to disk
        let access: CachedDbAccess<Hash, u64> = CachedDbAccess::new(db.clone(), 0, StoreBucket::Ghostdag);

        let mut batch = WriteBatch::default();
        access.write(BatchDbWriter::new(&mut batch), 7.into(), 7).unwrap();
        assert!(!access.has(7.into()).unwrap());
        db.write(batch).unwrap();
        assert!(access.has(7.into()).unwrap());
    }

    #[test]
    fn test_iterator_and_delete_all() {
        let (_lifetime, db) = create_temp_db();
        let access: CachedDbAccess<Hash, u64> = CachedDbAccess::new(db.clone(), 16, StoreBucket::VirtualUtxo);

        access.write_many(DirectDbWriter::new(&db), (0u64..8).map(|i| (i.into(), i))).unwrap();
        assert_eq!(access.iterator(None).count(), 8);

        access.delete_all(DirectDbWriter::new(&db)).unwrap();
        assert_eq!(access.iterator(None).count(), 0);
    }
}
