//!
//! Tree-related functions internal to the module
//!
use super::{
    extensions::ReachabilityStoreIntervalExtensions, inquirer::is_chain_ancestor_of, reindex::ReindexOperationContext,
    Result,
};
use crate::model::stores::reachability::ReachabilityStore;
use sedra_hashes::Hash;

/// Adds `new_block` as a child of `parent` in the tree, allocating it an
/// interval out of the parent's remaining capacity. When the capacity is
/// exhausted, a reindex operation reallocates intervals across the affected
/// subtree.
pub fn add_tree_block(
    store: &mut dyn ReachabilityStore,
    new_block: Hash,
    parent: Hash,
    reindex_depth: u64,
    reindex_slack: u64,
) -> Result<()> {
    // Get the remaining interval capacity
    let remaining = store.interval_remaining_after(parent)?;
    // Append the new child to `parent.children`
    let parent_height = store.append_child(parent, new_block)?;
    if remaining.is_empty() {
        // Init with the empty interval. Note: internal logic relies on
        // interval being this specific interval which comes exactly at the
        // end of current capacity
        store.insert(new_block, parent, remaining, parent_height + 1)?;

        // Start a reindex operation
        let reindex_root = store.get_reindex_root()?;
        let mut ctx = ReindexOperationContext::new(store, reindex_root, reindex_depth, reindex_slack);
        ctx.reindex_intervals(new_block)?;
    } else {
        let allocated = remaining.split_exact(&[(remaining.size() + 1) / 2])[0];
        store.insert(new_block, parent, allocated, parent_height + 1)?;
    };
    Ok(())
}

/// Finds the most recent tree ancestor common to both `block` and the given
/// reindex root. Note that we assume that almost always the chain between
/// the reindex root and the common ancestor is longer than the chain between
/// `block` and the common ancestor.
pub fn find_common_tree_ancestor(store: &dyn ReachabilityStore, block: Hash, reindex_root: Hash) -> Result<Hash> {
    let mut current = block;
    loop {
        if is_chain_ancestor_of(store, current, reindex_root)? {
            return Ok(current);
        }
        current = store.get_parent(current)?;
    }
}
