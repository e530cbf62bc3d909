//!
//! Test utils for reachability
//!
use super::{inquirer::*, interval::Interval, tree::*};
use crate::model::stores::reachability::{ReachabilityStore, ReachabilityStoreReader};
use crate::constants::perf;
use sedra_consensus_core::blockhash::BlockHashExtensions;
use sedra_database::prelude::StoreError;
use sedra_hashes::Hash;
use std::collections::VecDeque;
use thiserror::Error;

/// A struct with fluent API to streamline reachability store building
pub struct StoreBuilder<'a> {
    store: &'a mut dyn ReachabilityStore,
}

impl<'a> StoreBuilder<'a> {
    pub fn new(store: &'a mut dyn ReachabilityStore) -> Self {
        Self { store }
    }

    pub fn add_block(&mut self, hash: Hash, parent: Hash) -> &mut Self {
        let parent_height = if !parent.is_none() { self.store.append_child(parent, hash).unwrap() } else { 0 };
        self.store.insert(hash, parent, Interval::empty(), parent_height + 1).unwrap();
        self
    }
}

/// A struct with fluent API to streamline tree building
pub struct TreeBuilder<'a> {
    store: &'a mut dyn ReachabilityStore,
    reindex_depth: u64,
    reindex_slack: u64,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(store: &'a mut dyn ReachabilityStore) -> Self {
        Self { store, reindex_depth: perf::DEFAULT_REINDEX_DEPTH, reindex_slack: perf::DEFAULT_REINDEX_SLACK }
    }

    pub fn new_with_params(store: &'a mut dyn ReachabilityStore, reindex_depth: u64, reindex_slack: u64) -> Self {
        Self { store, reindex_depth, reindex_slack }
    }

    pub fn init(&mut self) -> &mut Self {
        init(self.store).unwrap();
        self
    }

    pub fn init_with_params(&mut self, origin: Hash, capacity: Interval) -> &mut Self {
        init_with_params(self.store, origin, capacity).unwrap();
        self
    }

    pub fn add_block(&mut self, hash: Hash, parent: Hash) -> &mut Self {
        add_tree_block(self.store, hash, parent, self.reindex_depth, self.reindex_slack).unwrap();
        hint_virtual_selected_parent(self.store, hash).unwrap();
        self
    }
}

pub struct DagBlock {
    pub hash: Hash,
    pub parents: Vec<Hash>,
}

impl DagBlock {
    pub fn new(hash: Hash, parents: Vec<Hash>) -> Self {
        Self { hash, parents }
    }
}

/// A struct with fluent API to streamline DAG building, maintaining both the
/// tree and the future covering sets. The selected parent is chosen as the
/// first listed parent, and the mergeset is approximated as all parents,
/// which is sufficient for structural tests.
pub struct DagBuilder<'a> {
    store: &'a mut dyn ReachabilityStore,
}

impl<'a> DagBuilder<'a> {
    pub fn new(store: &'a mut dyn ReachabilityStore) -> Self {
        Self { store }
    }

    pub fn init(&mut self) -> &mut Self {
        init(self.store).unwrap();
        self
    }

    pub fn add_block(&mut self, block: DagBlock) -> &mut Self {
        let selected_parent = block.parents[0];
        let mergeset = block.parents.iter().copied().filter(|p| *p != selected_parent).collect::<Vec<_>>();
        add_block(self.store, block.hash, selected_parent, &mut mergeset.into_iter()).unwrap();
        self
    }
}

#[derive(Error, Debug)]
pub enum TestError {
    #[error("data store error")]
    StoreError(#[from] StoreError),

    #[error("empty interval")]
    EmptyInterval(Hash, Interval),

    #[error("sibling intervals are expected to be consecutive")]
    NonConsecutiveSiblingIntervals(Interval, Interval),

    #[error("child interval out of parent bounds")]
    IntervalOutOfParentBounds { parent: Hash, child: Hash, parent_interval: Interval, child_interval: Interval },
}

pub fn validate_intervals(store: &(impl ReachabilityStoreReader + ?Sized), root: Hash) -> std::result::Result<(), TestError> {
    let mut queue = VecDeque::<Hash>::from([root]);
    while let Some(parent) = queue.pop_front() {
        let children = store.get_children(parent)?;
        queue.extend(children.iter());

        let parent_interval = store.get_interval(parent)?;
        if parent_interval.is_empty() {
            return Err(TestError::EmptyInterval(parent, parent_interval));
        }

        // Verify parent-child strict relation
        for child in children.iter().cloned() {
            let child_interval = store.get_interval(child)?;
            if !parent_interval.strictly_contains(child_interval) {
                return Err(TestError::IntervalOutOfParentBounds { parent, child, parent_interval, child_interval });
            }
        }

        // Iterate over consecutive siblings
        for siblings in children.windows(2) {
            let sibling_interval = store.get_interval(siblings[0])?;
            let current_interval = store.get_interval(siblings[1])?;
            if sibling_interval.end + 1 != current_interval.start {
                return Err(TestError::NonConsecutiveSiblingIntervals(sibling_interval, current_interval));
            }
        }
    }
    Ok(())
}
