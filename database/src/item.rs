use crate::{db::DB, errors::StoreError, key::DbKey, registry::StoreBucket, writer::DbWriter};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// A cached DB access to a single typed item (e.g. the pruning point or the
/// current tips), with concurrency support.
#[derive(Clone)]
pub struct CachedDbItem<T> {
    db: Arc<DB>,
    bucket: StoreBucket,
    cached_item: Arc<RwLock<Option<T>>>,
}

impl<T> CachedDbItem<T> {
    pub fn new(db: Arc<DB>, bucket: StoreBucket) -> Self {
        Self { db, bucket, cached_item: Arc::new(RwLock::new(None)) }
    }

    fn key(&self) -> DbKey {
        DbKey::prefix_only(self.bucket.as_ref())
    }

    pub fn read(&self) -> Result<T, StoreError>
    where
        T: Clone + DeserializeOwned,
    {
        if let Some(item) = self.cached_item.read().clone() {
            return Ok(item);
        }
        if let Some(slice) = self.db.get_pinned(self.key())? {
            let item: T = bincode::deserialize(&slice)?;
            *self.cached_item.write() = Some(item.clone());
            Ok(item)
        } else {
            Err(StoreError::KeyNotFound(self.key()))
        }
    }

    pub fn write(&mut self, mut writer: impl DbWriter, item: &T) -> Result<(), StoreError>
    where
        T: Clone + Serialize,
    {
        *self.cached_item.write() = Some(item.clone());
        let bin_data = bincode::serialize(item)?;
        writer.put(self.key(), bin_data)?;
        Ok(())
    }

    pub fn remove(&mut self, mut writer: impl DbWriter) -> Result<(), StoreError> {
        *self.cached_item.write() = None;
        writer.delete(self.key())?;
        Ok(())
    }
}
