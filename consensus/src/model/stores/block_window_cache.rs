use crate::processes::traversal::WindowBlock;
use sedra_database::prelude::Cache;
use sedra_hashes::Hash;
use std::{cmp::Reverse, collections::BinaryHeap, sync::Arc};

/// A bounded max-window of blocks ordered by (blue score, inverse hash)
pub type BlockWindowHeap = BinaryHeap<Reverse<WindowBlock>>;

/// Reader API for the block-window cache
pub trait BlockWindowCacheReader {
    fn get(&self, hash: &Hash) -> Option<Arc<BlockWindowHeap>>;
}

/// An in-memory only cache: windows are recomputable from GHOSTDAG data, so
/// nothing is persisted
pub type BlockWindowCacheStore = Cache<Hash, Arc<BlockWindowHeap>>;

impl BlockWindowCacheReader for BlockWindowCacheStore {
    #[inline(always)]
    fn get(&self, hash: &Hash) -> Option<Arc<BlockWindowHeap>> {
        Cache::get(self, hash)
    }
}
