use crate::model::stores::ghostdag::GhostdagData;
use crate::processes::coinbase::MergesetRewards;
use rocksdb::WriteBatch;
use sedra_consensus_core::tx::TransactionId;
use sedra_consensus_core::utxo::utxo_diff::UtxoDiff;
use sedra_database::prelude::{BatchDbWriter, CachedDbItem, StoreBucket, StoreError, DB};
use sedra_hashes::Hash;
use sedra_muhash::MuHash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The full state of the virtual block: what the DAG looks like from the
/// point of view of a miner building on all current tips.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct VirtualState {
    pub parents: Vec<Hash>,
    pub ghostdag_data: GhostdagData,
    pub daa_score: u64,
    pub bits: u32,
    pub past_median_time: u64,
    pub multiset: MuHash,
    /// The UTXO diff from the selected tip to the virtual: applying it over
    /// the selected tip's past UTXO set yields the virtual UTXO set
    pub utxo_diff: UtxoDiff,
    /// IDs of transactions accepted by the virtual, ordered by the merge-set
    /// consensus order
    pub accepted_tx_ids: Vec<TransactionId>,
    /// The reward owed to each merged block's miner, to be paid by the next
    /// coinbase
    pub mergeset_rewards: MergesetRewards,
}

pub trait VirtualStateStoreReader {
    fn get(&self) -> Result<Arc<VirtualState>, StoreError>;
}

pub trait VirtualStateStore: VirtualStateStoreReader {
    fn set(&mut self, state: Arc<VirtualState>) -> Result<(), StoreError>;
}

/// A DB + cache implementation of `VirtualStateStore`
#[derive(Clone)]
pub struct DbVirtualStateStore {
    db: Arc<DB>,
    access: CachedDbItem<Arc<VirtualState>>,
}

impl DbVirtualStateStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbItem::new(db, StoreBucket::VirtualState) }
    }

    pub fn is_initialized(&self) -> bool {
        self.access.read().is_ok()
    }

    pub fn set_batch(&mut self, batch: &mut WriteBatch, state: Arc<VirtualState>) -> Result<(), StoreError> {
        self.access.write(BatchDbWriter::new(batch), &state)
    }
}

impl VirtualStateStoreReader for DbVirtualStateStore {
    fn get(&self) -> Result<Arc<VirtualState>, StoreError> {
        self.access.read()
    }
}

impl VirtualStateStore for DbVirtualStateStore {
    fn set(&mut self, state: Arc<VirtualState>) -> Result<(), StoreError> {
        self.access.write(sedra_database::prelude::DirectDbWriter::new(&self.db), &state)
    }
}
