use crate::model::stores::block_window_cache::BlockWindowCacheReader;
use crate::model::stores::ghostdag::{CompactGhostdagData, GhostdagStoreReader};
use crate::processes::traversal::DagTraversalManager;
use sedra_hashes::Hash;
use std::sync::Arc;

/// Decides the placement of the pruning point: the highest selected-chain
/// block at least `pruning_depth` blue scores below the virtual. History
/// below it may be discarded.
#[derive(Clone)]
pub struct PruningPointManager<T: GhostdagStoreReader, U: BlockWindowCacheReader> {
    genesis_hash: Hash,
    pruning_depth: u64,
    ghostdag_store: Arc<T>,
    traversal_manager: DagTraversalManager<T, U>,
}

impl<T: GhostdagStoreReader, U: BlockWindowCacheReader> PruningPointManager<T, U> {
    pub fn new(
        genesis_hash: Hash,
        pruning_depth: u64,
        ghostdag_store: Arc<T>,
        traversal_manager: DagTraversalManager<T, U>,
    ) -> Self {
        Self { genesis_hash, pruning_depth, ghostdag_store, traversal_manager }
    }

    /// Computes the pruning point implied by the given virtual data. The
    /// result never moves backwards relative to `current_pruning_point`.
    pub fn expected_pruning_point(&self, virtual_ghostdag: CompactGhostdagData, current_pruning_point: Hash) -> Hash {
        if virtual_ghostdag.blue_score < self.pruning_depth {
            return current_pruning_point;
        }
        let target_score = virtual_ghostdag.blue_score - self.pruning_depth;
        let current_score = self.ghostdag_store.get_blue_score(current_pruning_point).unwrap_or_default();
        if target_score <= current_score {
            return current_pruning_point;
        }

        let candidate = self.traversal_manager.selected_ancestor(virtual_ghostdag.selected_parent, target_score);
        // The candidate must lie on the chain above the current pruning
        // point; a lower-scored candidate means no finality window was
        // crossed yet
        if self.ghostdag_store.get_blue_score(candidate).unwrap_or_default() <= current_score {
            return current_pruning_point;
        }
        candidate
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::block_window_cache::BlockWindowCacheStore;
    use crate::model::stores::ghostdag::{GhostdagData, GhostdagStore, MemoryGhostdagStore};
    use sedra_consensus_core::blockhash;
    use sedra_consensus_core::{BlockHashMap, HashKTypeMap};

    fn build_chain(store: &Arc<MemoryGhostdagStore>, length: u64) {
        store
            .insert(
                0.into(),
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
        for i in 1..=length {
            store
                .insert(
                    i.into(),
                    Arc::new(GhostdagData::new(
                        i,
                        (i * 10).into(),
                        (i - 1).into(),
                        Default::default(),
                        Default::default(),
                        HashKTypeMap::new(BlockHashMap::new()),
                    )),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_pruning_point_advance() {
        let store = Arc::new(MemoryGhostdagStore::new());
        build_chain(&store, 20);
        let cache = Arc::new(BlockWindowCacheStore::new(16));
        let traversal = DagTraversalManager::new(0.into(), store.clone(), cache);
        let manager = PruningPointManager::new(0.into(), 6, store.clone(), traversal);

        // Virtual at score 5: not deep enough to prune
        let virtual_data = store.get_compact_data(5.into()).unwrap();
        assert_eq!(manager.expected_pruning_point(virtual_data, 0.into()), Hash::from(0));

        // Virtual selected parent at 20: pruning point moves to score 14
        let virtual_data = store.get_compact_data(20.into()).unwrap();
        assert_eq!(manager.expected_pruning_point(virtual_data, 0.into()), Hash::from(14));

        // Never moves backwards
        assert_eq!(manager.expected_pruning_point(virtual_data, 16.into()), Hash::from(16));
    }
}
