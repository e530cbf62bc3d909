use rocksdb::WriteBatch;
use sedra_consensus_core::tx::{TransactionIndexType, TransactionOutpoint, UtxoEntry};
use sedra_consensus_core::utxo::utxo_diff::UtxoDiff;
use sedra_consensus_core::utxo::utxo_view::UtxoView;
use sedra_database::prelude::{
    BatchDbWriter, CachedDbAccess, StoreBucket, StoreError, StoreResultExtensions, DB,
};
use sedra_hashes::{Hash, HASH_SIZE};
use std::sync::Arc;

pub trait UtxoSetStoreReader {
    fn get(&self, outpoint: &TransactionOutpoint) -> Result<UtxoEntry, StoreError>;
    fn has(&self, outpoint: &TransactionOutpoint) -> Result<bool, StoreError>;
}

pub trait UtxoSetStore: UtxoSetStoreReader {
    /// Updates the store according to the UTXO diff, deleting removed
    /// entries and adding created ones
    fn write_diff(&self, utxo_diff: &UtxoDiff) -> Result<(), StoreError>;
}

pub const UTXO_KEY_SIZE: usize = HASH_SIZE + std::mem::size_of::<TransactionIndexType>();

/// The database key of a UTXO entry: transaction id bytes followed by the
/// big-endian output index. Keys of outputs of one transaction are thus
/// adjacent under lexicographic iteration, sharding the set by id prefix.
#[derive(Eq, Hash, PartialEq, Debug, Copy, Clone)]
pub struct UtxoKey([u8; UTXO_KEY_SIZE]);

impl AsRef<[u8]> for UtxoKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<TransactionOutpoint> for UtxoKey {
    fn from(outpoint: TransactionOutpoint) -> Self {
        let mut bytes = [0; UTXO_KEY_SIZE];
        bytes[..HASH_SIZE].copy_from_slice(&outpoint.transaction_id.as_bytes());
        bytes[HASH_SIZE..].copy_from_slice(&outpoint.index.to_be_bytes());
        Self(bytes)
    }
}

impl From<UtxoKey> for TransactionOutpoint {
    fn from(k: UtxoKey) -> Self {
        let transaction_id = Hash::from_slice(&k.0[..HASH_SIZE]);
        let index = TransactionIndexType::from_be_bytes(k.0[HASH_SIZE..].try_into().expect("expecting index size"));
        Self::new(transaction_id, index)
    }
}

/// A DB + cache UTXO set, keyed by outpoint. Used both for the virtual UTXO
/// set and for the pruning-point import scratch area.
#[derive(Clone)]
pub struct DbUtxoSetStore {
    db: Arc<DB>,
    bucket: StoreBucket,
    access: CachedDbAccess<UtxoKey, UtxoEntry>,
}

impl DbUtxoSetStore {
    pub fn new(db: Arc<DB>, cache_size: u64, bucket: StoreBucket) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, bucket), bucket }
    }

    pub fn bucket(&self) -> StoreBucket {
        self.bucket
    }

    pub fn write_diff_batch(&self, batch: &mut WriteBatch, utxo_diff: &UtxoDiff) -> Result<(), StoreError> {
        let mut writer = BatchDbWriter::new(batch);
        self.access.delete_many(&mut writer, utxo_diff.remove.keys().map(|o| (*o).into()))?;
        self.access.write_many(&mut writer, utxo_diff.add.iter().map(|(o, e)| ((*o).into(), e.clone())))?;
        Ok(())
    }

    pub fn write_many_batch(
        &self,
        batch: &mut WriteBatch,
        utxos: impl Iterator<Item = (TransactionOutpoint, UtxoEntry)>,
    ) -> Result<(), StoreError> {
        self.access.write_many(BatchDbWriter::new(batch), utxos.map(|(o, e)| (o.into(), e)))
    }

    pub fn clear_batch(&self, batch: &mut WriteBatch) -> Result<(), StoreError> {
        self.access.delete_all(BatchDbWriter::new(batch))
    }

    /// Iterates the set in key order starting from `from` (exclusive when
    /// `skip_first`), yielding at most `limit` entries
    pub fn iterate_from(
        &self,
        from: Option<TransactionOutpoint>,
        skip_first: bool,
        limit: usize,
    ) -> Result<Vec<(TransactionOutpoint, UtxoEntry)>, StoreError> {
        let mut iter = self.access.iterator(from.map(UtxoKey::from));
        if skip_first && from.is_some() {
            iter.next();
        }
        let mut result = Vec::with_capacity(limit.min(1024));
        for item in iter.take(limit) {
            let (key_bytes, entry) = item.map_err(|e| StoreError::DataInconsistency(e.to_string()))?;
            let key = UtxoKey(
                <[u8; UTXO_KEY_SIZE]>::try_from(&key_bytes[..])
                    .map_err(|_| StoreError::DataInconsistency("unexpected utxo key size".into()))?,
            );
            result.push((key.into(), entry));
        }
        Ok(result)
    }

    /// Iterates the whole set in key order
    pub fn iterate_all(&self) -> impl Iterator<Item = Result<(TransactionOutpoint, UtxoEntry), StoreError>> + '_ {
        self.access.iterator(None).map(|item| {
            let (key_bytes, entry) = item.map_err(|e| StoreError::DataInconsistency(e.to_string()))?;
            let key = UtxoKey(
                <[u8; UTXO_KEY_SIZE]>::try_from(&key_bytes[..])
                    .map_err(|_| StoreError::DataInconsistency("unexpected utxo key size".into()))?,
            );
            Ok((key.into(), entry))
        })
    }
}

impl UtxoView for DbUtxoSetStore {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        UtxoSetStoreReader::get(self, outpoint).unwrap_option()
    }
}

impl UtxoSetStoreReader for DbUtxoSetStore {
    fn get(&self, outpoint: &TransactionOutpoint) -> Result<UtxoEntry, StoreError> {
        self.access.read((*outpoint).into())
    }

    fn has(&self, outpoint: &TransactionOutpoint) -> Result<bool, StoreError> {
        self.access.has((*outpoint).into())
    }
}

impl UtxoSetStore for DbUtxoSetStore {
    fn write_diff(&self, utxo_diff: &UtxoDiff) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        self.write_diff_batch(&mut batch, utxo_diff)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedra_consensus_core::tx::ScriptPublicKey;
    use sedra_database::prelude::create_temp_db;

    fn entry(amount: u64) -> UtxoEntry {
        UtxoEntry::new(amount, ScriptPublicKey::default(), 0, false)
    }

    #[test]
    fn test_utxo_key_roundtrip_and_order() {
        let outpoint = TransactionOutpoint::new(2345.into(), 300);
        let key: UtxoKey = outpoint.into();
        assert_eq!(TransactionOutpoint::from(key), outpoint);

        // Big-endian index keeps outputs of a transaction ordered by index
        let k0: UtxoKey = TransactionOutpoint::new(1.into(), 2).into();
        let k1: UtxoKey = TransactionOutpoint::new(1.into(), 256).into();
        assert!(k0.0 < k1.0);
    }

    #[test]
    fn test_paged_iteration() {
        let (_lifetime, db) = create_temp_db();
        let store = DbUtxoSetStore::new(db.clone(), 16, StoreBucket::VirtualUtxo);

        let mut batch = WriteBatch::default();
        let utxos: Vec<_> = (0u64..10).map(|i| (TransactionOutpoint::new(i.into(), 0), entry(i))).collect();
        store.write_many_batch(&mut batch, utxos.into_iter()).unwrap();
        db.write(batch).unwrap();

        let first_page = store.iterate_from(None, false, 4).unwrap();
        assert_eq!(first_page.len(), 4);
        let from = first_page.last().unwrap().0;
        let second_page = store.iterate_from(Some(from), true, 100).unwrap();
        assert_eq!(second_page.len(), 6);
        assert!(first_page.iter().all(|(op, _)| second_page.iter().all(|(op2, _)| op != op2)));
    }
}
