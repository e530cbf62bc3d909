//! Block-locator construction: a list of selected-chain block hashes with
//! exponentially growing gaps, keeping locators logarithmic in chain length.
//!
//! For a selected chain `genesis -> 1 -> 2 -> ... -> 18` and
//! `high = 18, low = genesis`, the locator is
//! `[17, 16, 14, 10, 2, genesis]` (steps 1, 2, 4, 8, then capped at low).

use crate::errors::{BlockProcessResult, RuleError};
use crate::model::stores::block_window_cache::BlockWindowCacheReader;
use crate::model::stores::ghostdag::GhostdagStoreReader;
use crate::processes::traversal::DagTraversalManager;
use sedra_hashes::Hash;
use std::sync::Arc;

pub type BlockLocator = Vec<Hash>;

#[derive(Clone)]
pub struct BlockLocatorManager<T: GhostdagStoreReader, U: BlockWindowCacheReader> {
    genesis_hash: Hash,
    ghostdag_store: Arc<T>,
    traversal_manager: DagTraversalManager<T, U>,
}

impl<T: GhostdagStoreReader, U: BlockWindowCacheReader> BlockLocatorManager<T, U> {
    pub fn new(genesis_hash: Hash, ghostdag_store: Arc<T>, traversal_manager: DagTraversalManager<T, U>) -> Self {
        Self { genesis_hash, ghostdag_store, traversal_manager }
    }

    /// Builds a locator from `high_hash` (exclusive) down to `low_hash`
    /// (inclusive). Both blocks must lie on a single selected-parent chain,
    /// otherwise `LocatorHashesNotOnSameChain` is returned and the caller is
    /// expected to retry with a different high block.
    pub fn create_block_locator(&self, high_hash: Hash, low_hash: Hash) -> BlockProcessResult<BlockLocator> {
        if !self.ghostdag_store.has(high_hash).unwrap_or(false) {
            return Err(RuleError::UnknownBlock(high_hash));
        }
        if !self.ghostdag_store.has(low_hash).unwrap_or(false) {
            return Err(RuleError::UnknownBlock(low_hash));
        }

        let low_blue_score = self.ghostdag_store.get_blue_score(low_hash).unwrap();

        // The locator starts at the selected parent of the high block, so
        // the high block itself is never included
        let mut current = self.ghostdag_store.get_selected_parent(high_hash).unwrap();
        let mut step = 1u64;
        let mut locator = BlockLocator::new();
        loop {
            locator.push(current);

            let current_blue_score = self.ghostdag_store.get_blue_score(current).unwrap();

            // Nothing more to add once the low block has been added
            if current_blue_score <= low_blue_score {
                if current != low_hash {
                    return Err(RuleError::LocatorHashesNotOnSameChain);
                }
                break;
            }

            // Clamp the next blue score to the low block so the final
            // locator entry is exactly the low block
            let next_blue_score = current_blue_score.saturating_sub(step).max(low_blue_score);

            // Walk backwards through the selected chain to the ancestor at
            // the chosen score, doubling the gap each iteration
            current = self.traversal_manager.selected_ancestor(current, next_blue_score);
            step *= 2;
        }

        Ok(locator)
    }

    /// Returns `(high, low)` boundaries for the next locator zoom-in round:
    /// `high` is the earliest locator entry unknown locally (`None` when the
    /// first entry is known), and `low` is the latest locally-known entry
    /// (the genesis when all entries are unknown).
    pub fn find_next_locator_boundaries(&self, locator: &[Hash]) -> (Option<Hash>, Hash) {
        for (i, &hash) in locator.iter().enumerate() {
            if self.ghostdag_store.has(hash).unwrap_or(false) {
                let high = if i == 0 { None } else { Some(locator[i - 1]) };
                return (high, hash);
            }
        }
        (locator.last().copied(), self.genesis_hash)
    }
}
