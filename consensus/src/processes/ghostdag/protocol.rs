use std::sync::Arc;

use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::{GhostdagData, GhostdagStoreReader};
use crate::model::stores::headers::HeaderStoreReader;
use crate::model::stores::relations::RelationsStoreReader;
use crate::processes::difficulty::calc_work;
use sedra_consensus_core::blockhash::{self, BlockHashes};
use sedra_consensus_core::{BlockHashMap, HashKTypeMap, KType};
use sedra_hashes::Hash;

use super::ordering::SortableBlock;

/// The GHOSTDAG coloring protocol. Assigns each block a selected parent, a
/// blue/red partition of its merge set, a blue score and accumulated blue
/// work, thereby inducing a total order over the DAG.
pub struct GhostdagManager<T: GhostdagStoreReader, S: RelationsStoreReader, U: ReachabilityService, V: HeaderStoreReader> {
    genesis_hash: Hash,
    pub(super) k: KType,
    pub(super) ghostdag_store: Arc<T>,
    pub(super) relations_store: S,
    pub(super) headers_store: Arc<V>,
    pub(super) reachability_service: U,
}

impl<T: GhostdagStoreReader, S: RelationsStoreReader + Clone, U: ReachabilityService + Clone, V: HeaderStoreReader> Clone
    for GhostdagManager<T, S, U, V>
{
    fn clone(&self) -> Self {
        Self {
            genesis_hash: self.genesis_hash,
            k: self.k,
            ghostdag_store: self.ghostdag_store.clone(),
            relations_store: self.relations_store.clone(),
            headers_store: self.headers_store.clone(),
            reachability_service: self.reachability_service.clone(),
        }
    }
}

impl<T: GhostdagStoreReader, S: RelationsStoreReader, U: ReachabilityService, V: HeaderStoreReader> GhostdagManager<T, S, U, V> {
    pub fn new(
        genesis_hash: Hash,
        k: KType,
        ghostdag_store: Arc<T>,
        relations_store: S,
        headers_store: Arc<V>,
        reachability_service: U,
    ) -> Self {
        Self { genesis_hash, k, ghostdag_store, relations_store, headers_store, reachability_service }
    }

    pub fn genesis_ghostdag_data(&self) -> GhostdagData {
        GhostdagData::new(
            0,
            Default::default(),
            blockhash::ORIGIN,
            BlockHashes::new(Vec::new()),
            BlockHashes::new(Vec::new()),
            HashKTypeMap::new(BlockHashMap::new()),
        )
    }

    pub fn find_selected_parent(&self, parents: impl IntoIterator<Item = Hash>) -> Hash {
        parents
            .into_iter()
            .map(|parent| SortableBlock { hash: parent, blue_work: self.ghostdag_store.get_blue_work(parent).unwrap() })
            .max()
            .expect("genesis must be added via a call to init")
            .hash
    }

    /// Runs the GHOSTDAG protocol for a block with the given parents and
    /// returns its consensus data. The caller is responsible for storing the
    /// result; the computation itself is pure with respect to the new block.
    pub fn ghostdag(&self, parents: &[Hash]) -> GhostdagData {
        assert!(!parents.is_empty(), "genesis must be added via a call to init");

        // Run the GHOSTDAG parent selection algorithm
        let selected_parent = self.find_selected_parent(parents.iter().copied());
        // Initialize new block data with the selected parent
        let mut new_block_data = GhostdagData::new_with_selected_parent(selected_parent, self.k);
        // Get the mergeset in consensus-agreed topological order
        let ordered_mergeset = self.ordered_mergeset_without_selected_parent(selected_parent, parents);

        for blue_candidate in ordered_mergeset.iter().copied() {
            let coloring = self.check_blue_candidate(&new_block_data, blue_candidate);

            if let ColoringOutput::Blue(blue_anticone_size, blues_anticone_sizes) = coloring {
                // No k-cluster violation found, we can now set the candidate
                // block as blue
                new_block_data.add_blue(blue_candidate, blue_anticone_size, &blues_anticone_sizes);
            } else {
                new_block_data.add_red(blue_candidate);
            }
        }

        let blue_score = self.ghostdag_store.get_blue_score(selected_parent).unwrap() + new_block_data.mergeset_blues.len() as u64;

        let added_blue_work = new_block_data
            .mergeset_blues
            .iter()
            .copied()
            .map(|hash| calc_work(self.headers_store.get_bits(hash).unwrap()))
            .sum();
        let blue_work = self.ghostdag_store.get_blue_work(selected_parent).unwrap() + added_blue_work;

        new_block_data.finalize_score_and_work(blue_score, blue_work);
        new_block_data
    }

    fn check_blue_candidate_with_chain_block(
        &self,
        new_block_data: &GhostdagData,
        chain_block: &ChainBlock,
        blue_candidate: Hash,
        candidate_blues_anticone_sizes: &mut BlockHashMap<KType>,
        candidate_blue_anticone_size: &mut KType,
    ) -> ColoringState {
        // If blue_candidate is in the future of chain_block, it means
        // that all remaining blues are in the past of chain_block and thus
        // in the past of blue_candidate. In this case we know for sure that
        // the anticone of blue_candidate will not exceed K, and we can mark
        // it as blue.
        //
        // The new block is always in the future of blue_candidate, so there's
        // no point in checking it.

        // We check if chain_block is not the new block by checking if it has a hash.
        if let Some(hash) = chain_block.hash {
            if self.reachability_service.is_dag_ancestor_of(hash, blue_candidate) {
                return ColoringState::Blue;
            }
        }

        for &block in chain_block.data.mergeset_blues.iter() {
            // Skip blocks that exist in the past of blue_candidate.
            if self.reachability_service.is_dag_ancestor_of(block, blue_candidate) {
                continue;
            }

            candidate_blues_anticone_sizes.insert(block, self.blue_anticone_size(block, new_block_data));

            *candidate_blue_anticone_size += 1;
            if *candidate_blue_anticone_size > self.k {
                // k-cluster violation: the candidate's blue anticone exceeded k
                return ColoringState::Red;
            }

            if *candidate_blues_anticone_sizes.get(&block).unwrap() == self.k {
                // k-cluster violation: a block in candidate's blue anticone
                // already has k blue blocks in its own anticone
                return ColoringState::Red;
            }

            // This is a sanity check that validates that a blue
            // block's blue anticone is not already larger than K.
            assert!(
                *candidate_blues_anticone_sizes.get(&block).unwrap() <= self.k,
                "found blue anticone larger than K"
            );
        }

        ColoringState::Pending
    }

    /// Returns the blue anticone size of `block` from the worldview of
    /// `context`. Expects `block` to be in the blue set of `context`.
    fn blue_anticone_size(&self, block: Hash, context: &GhostdagData) -> KType {
        let mut current_blues_anticone_sizes = HashKTypeMap::clone(&context.blues_anticone_sizes);
        let mut current_selected_parent = context.selected_parent;
        loop {
            if let Some(size) = current_blues_anticone_sizes.get(&block) {
                return *size;
            }

            if current_selected_parent == self.genesis_hash || current_selected_parent == blockhash::ORIGIN {
                panic!("block {block} is not in blue set of the given context");
            }

            current_blues_anticone_sizes = self.ghostdag_store.get_blues_anticone_sizes(current_selected_parent).unwrap();
            current_selected_parent = self.ghostdag_store.get_selected_parent(current_selected_parent).unwrap();
        }
    }

    fn check_blue_candidate(&self, new_block_data: &GhostdagData, blue_candidate: Hash) -> ColoringOutput {
        // The maximum length of new_block_data.mergeset_blues can be K+1
        // because it contains the selected parent
        if new_block_data.mergeset_blues.len() as KType == self.k + 1 {
            return ColoringOutput::Red;
        }

        let mut candidate_blues_anticone_sizes: BlockHashMap<KType> = BlockHashMap::with_capacity(self.k as usize);

        // Iterate over all blocks in the blue past of the new block that are
        // not in the past of blue_candidate, and check for each one of them
        // if blue_candidate potentially enlarges their blue anticone to be
        // over K, or that they enlarge the blue anticone of blue_candidate
        // to be over K.
        let mut chain_block = ChainBlock { hash: None, data: new_block_data.clone().into() };
        let mut candidate_blue_anticone_size: KType = 0;

        loop {
            let state = self.check_blue_candidate_with_chain_block(
                new_block_data,
                &chain_block,
                blue_candidate,
                &mut candidate_blues_anticone_sizes,
                &mut candidate_blue_anticone_size,
            );

            match state {
                ColoringState::Blue => return ColoringOutput::Blue(candidate_blue_anticone_size, candidate_blues_anticone_sizes),
                ColoringState::Red => return ColoringOutput::Red,
                ColoringState::Pending => {
                    chain_block = ChainBlock {
                        hash: Some(chain_block.data.selected_parent),
                        data: self.ghostdag_store.get_data(chain_block.data.selected_parent).unwrap(),
                    };
                }
            }
        }
    }
}

/// A chain block with its GHOSTDAG data. `hash` is `None` for the (not yet
/// hashed) new block under processing.
struct ChainBlock {
    hash: Option<Hash>,
    data: Arc<GhostdagData>,
}

/// The intermediate coloring state of a candidate against one chain block
enum ColoringState {
    Blue,
    Red,
    Pending,
}

/// The final verdict of the candidate coloring process
enum ColoringOutput {
    /// The candidate is blue, with its blue anticone size and the updated
    /// sizes of affected blues
    Blue(KType, BlockHashMap<KType>),
    Red,
}
