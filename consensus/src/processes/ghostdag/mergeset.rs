use std::collections::{HashSet, VecDeque};

use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::GhostdagStoreReader;
use crate::model::stores::headers::HeaderStoreReader;
use crate::model::stores::relations::RelationsStoreReader;
use sedra_hashes::Hash;

use super::protocol::GhostdagManager;

impl<T: GhostdagStoreReader, S: RelationsStoreReader, U: ReachabilityService, V: HeaderStoreReader> GhostdagManager<T, S, U, V> {
    /// Computes the merge set of a block with the given parents: all blocks
    /// in its past which are not in the past of the selected parent. The
    /// result is sorted in the consensus-agreed topological order (ascending
    /// blue work, ties by hash).
    pub fn ordered_mergeset_without_selected_parent(&self, selected_parent: Hash, parents: &[Hash]) -> Vec<Hash> {
        let mut queue: VecDeque<Hash> = parents.iter().copied().filter(|p| *p != selected_parent).collect();
        let mut mergeset: HashSet<Hash> = queue.iter().copied().collect();
        let mut selected_parent_past: HashSet<Hash> = HashSet::new();

        while let Some(current) = queue.pop_front() {
            let current_parents = self.relations_store.get_parents(current).unwrap();

            // For each parent of the current block we check whether it is in
            // the past of the selected parent. If not, we add it to the
            // resulting merge-set and queue it for further processing.
            for parent in current_parents.iter() {
                if mergeset.contains(parent) || selected_parent_past.contains(parent) {
                    continue;
                }

                if self.reachability_service.is_dag_ancestor_of(*parent, selected_parent) {
                    selected_parent_past.insert(*parent);
                    continue;
                }

                mergeset.insert(*parent);
                queue.push_back(*parent);
            }
        }

        self.sort_blocks(mergeset)
    }
}
