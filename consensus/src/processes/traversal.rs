use crate::model::stores::block_window_cache::{BlockWindowCacheReader, BlockWindowHeap};
use crate::model::stores::ghostdag::{GhostdagData, GhostdagStoreReader};
use sedra_hashes::Hash;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::sync::Arc;

/// A window member keyed for the deterministic window order: higher blue
/// score first, ties resolved towards the lower hash.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WindowBlock {
    pub hash: Hash,
    pub blue_score: u64,
}

impl PartialOrd for WindowBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WindowBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverting the hash comparison makes the maximal element the one
        // with the highest score and the lowest hash
        self.blue_score.cmp(&other.blue_score).then_with(|| other.hash.cmp(&self.hash))
    }
}

/// DAG traversal queries: block windows, selected-chain ancestor walks
#[derive(Clone)]
pub struct DagTraversalManager<T: GhostdagStoreReader, U: BlockWindowCacheReader> {
    genesis_hash: Hash,
    ghostdag_store: Arc<T>,
    block_window_cache: Arc<U>,
}

impl<T: GhostdagStoreReader, U: BlockWindowCacheReader> DagTraversalManager<T, U> {
    pub fn new(genesis_hash: Hash, ghostdag_store: Arc<T>, block_window_cache: Arc<U>) -> Self {
        Self { genesis_hash, ghostdag_store, block_window_cache }
    }

    /// Computes the window of the `window_size` highest-blue-score blocks in
    /// the past of a block with the given GHOSTDAG data, padded with genesis
    /// duplicates when the past is too small. The walk descends the selected
    /// parent chain, offering each chain block's merge-set blues to a
    /// bounded heap.
    pub fn block_window(&self, high_ghostdag_data: &GhostdagData, window_size: usize) -> BlockWindowHeap {
        let mut window = BoundedSizeBlockHeap::new(window_size);
        if window_size == 0 {
            return window.binary_heap;
        }

        let mut current_ghostdag = Arc::new(high_ghostdag_data.clone());
        loop {
            // Reaching a block whose selected parent has no GHOSTDAG data
            // means the bottom of the usable DAG was passed
            if !self.ghostdag_store.has(current_ghostdag.selected_parent).unwrap_or(false) {
                break;
            }

            // The merge-set blues of the current block (the selected parent
            // included) are exactly the new past blocks this chain step exposes
            let mut any_inserted = false;
            for blue in current_ghostdag.mergeset_blues.iter().copied() {
                let blue_score = self.ghostdag_store.get_blue_score(blue).unwrap();
                any_inserted |= window.try_push(WindowBlock { hash: blue, blue_score });
            }

            // Once the window is saturated above this chain block's score, no
            // deeper block can enter
            if !any_inserted && window.is_full() {
                break;
            }

            current_ghostdag = self.ghostdag_store.get_data(current_ghostdag.selected_parent).unwrap();
        }

        // Pad with genesis duplicates when the available past is smaller
        // than the required window
        if window.binary_heap.len() < window_size {
            let genesis_score = self.ghostdag_store.get_blue_score(self.genesis_hash).unwrap();
            while window.binary_heap.len() < window_size {
                window.binary_heap.push(Reverse(WindowBlock { hash: self.genesis_hash, blue_score: genesis_score }));
            }
        }

        window.binary_heap
    }

    /// Returns the highest selected-chain ancestor of `high` with blue score
    /// lower than or equal to `blue_score`
    pub fn selected_ancestor(&self, high: Hash, blue_score: u64) -> Hash {
        let mut current = high;
        loop {
            let compact = self.ghostdag_store.get_compact_data(current).unwrap();
            if compact.blue_score <= blue_score || current == self.genesis_hash {
                return current;
            }
            current = compact.selected_parent;
        }
    }

    /// Returns the window sorted in consensus order: blue score descending,
    /// ties towards the lower hash
    pub fn sorted_window(&self, window: &BlockWindowHeap) -> Vec<WindowBlock> {
        let mut sorted: Vec<WindowBlock> = window.iter().map(|r| r.0).collect();
        sorted.sort_by(|a, b| b.cmp(a));
        sorted
    }

    pub fn cached_window(&self, hash: &Hash) -> Option<Arc<BlockWindowHeap>> {
        self.block_window_cache.get(hash)
    }
}

struct BoundedSizeBlockHeap {
    binary_heap: BlockWindowHeap,
    size_bound: usize,
}

impl BoundedSizeBlockHeap {
    fn new(size_bound: usize) -> Self {
        Self { binary_heap: BlockWindowHeap::with_capacity(size_bound), size_bound }
    }

    fn is_full(&self) -> bool {
        self.binary_heap.len() >= self.size_bound
    }

    fn try_push(&mut self, block: WindowBlock) -> bool {
        if self.is_full() {
            // The heap keeps the `size_bound` largest items, so the minimal
            // one is evicted when a larger candidate arrives
            let min = self.binary_heap.peek().expect("a full heap is non-empty");
            if min.0 >= block {
                return false;
            }
            self.binary_heap.pop();
        }
        self.binary_heap.push(Reverse(block));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::block_window_cache::BlockWindowCacheStore;
    use crate::model::stores::ghostdag::{GhostdagStore, MemoryGhostdagStore};
    use sedra_consensus_core::blockhash::{self, BlockHashes};
    use sedra_consensus_core::{BlockHashMap, HashKTypeMap};

    // Builds a fixed DAG of chain blocks with side blocks merged along the
    // way and asserts the exact deterministic windows
    fn insert(store: &MemoryGhostdagStore, hash: u64, score: u64, selected_parent: u64, blues_without_sp: &[u64]) {
        let mut mergeset_blues = vec![Hash::from(selected_parent)];
        mergeset_blues.extend(blues_without_sp.iter().map(|&b| Hash::from(b)));
        store
            .insert(
                hash.into(),
                Arc::new(GhostdagData::new(
                    score,
                    (score * 10).into(),
                    selected_parent.into(),
                    BlockHashes::new(mergeset_blues),
                    Default::default(),
                    HashKTypeMap::new(BlockHashMap::new()),
                )),
            )
            .unwrap();
    }

    #[test]
    fn test_block_window_order_and_padding() {
        let store = Arc::new(MemoryGhostdagStore::new());
        let cache = Arc::new(BlockWindowCacheStore::new(16));
        let genesis = 1u64;

        // Genesis data
        store
            .insert(
                genesis.into(),
                Arc::new(GhostdagData::new(
                    0,
                    Default::default(),
                    blockhash::ORIGIN,
                    Default::default(),
                    Default::default(),
                    HashKTypeMap::new(BlockHashMap::new()),
                )),
            )
            .unwrap();

        // Chain: 1 <- 2 <- 4 <- 6, with side blocks 3 (merged by 4) and
        // 5 (merged by 6); 3 and 5 share the blue score of their merging
        // chain ancestors' parents
        insert(&store, 2, 1, 1, &[]);
        insert(&store, 3, 1, 1, &[]);
        insert(&store, 4, 3, 2, &[3]);
        insert(&store, 5, 3, 2, &[]);
        insert(&store, 6, 5, 4, &[5]);

        let manager = DagTraversalManager::new(genesis.into(), store.clone(), cache);

        let tip_data = store.get_data(6.into()).unwrap();
        let window = manager.block_window(&tip_data, 10);
        let sorted = manager.sorted_window(&window);
        let hashes: Vec<u64> = sorted.iter().map(|b| u64::from_le_bytes(b.hash.as_bytes()[..8].try_into().unwrap())).collect();

        // Score desc, ties by ascending hash (2 before 3, both score 1),
        // genesis-padded to the window size
        assert_eq!(hashes, vec![4, 5, 2, 3, 1, 1, 1, 1, 1, 1]);

        // Determinism
        let window2 = manager.block_window(&tip_data, 10);
        let sorted2 = manager.sorted_window(&window2);
        assert_eq!(sorted, sorted2);
    }

    #[test]
    fn test_selected_ancestor() {
        let store = Arc::new(MemoryGhostdagStore::new());
        let cache = Arc::new(BlockWindowCacheStore::new(16));
        let genesis = 1u64;
        store
            .insert(
                genesis.into(),
                Arc::new(GhostdagData::new(
                    0,
                    Default::default(),
                    blockhash::ORIGIN,
                    Default::default(),
                    Default::default(),
                    HashKTypeMap::new(BlockHashMap::new()),
                )),
            )
            .unwrap();
        // Chain with scores 1..=5
        for (i, hash) in (2u64..=6).enumerate() {
            insert(&store, hash, i as u64 + 1, hash - 1, &[]);
        }
        let manager = DagTraversalManager::new(genesis.into(), store, cache);

        assert_eq!(manager.selected_ancestor(6.into(), 3), Hash::from(4));
        assert_eq!(manager.selected_ancestor(6.into(), 5), Hash::from(6));
        assert_eq!(manager.selected_ancestor(6.into(), 0), Hash::from(1));
    }
}
