use crate::model::stores::reachability::{DbReachabilityStore, ReachabilityStore, ReachabilityStoreReader};
use crate::processes::reachability::inquirer;
use parking_lot::RwLock;
use sedra_hashes::Hash;
use std::sync::Arc;

/// The narrow reachability capability consumed by consensus algorithms
pub trait ReachabilityService {
    /// Is `this` a selected-parent-chain ancestor of `queried` (inclusive)
    fn is_chain_ancestor_of(&self, this: Hash, queried: Hash) -> bool;

    /// Is `this` a DAG ancestor of `queried` (inclusive)
    fn is_dag_ancestor_of(&self, this: Hash, queried: Hash) -> bool;

    fn is_dag_ancestor_of_any(&self, this: Hash, queried: &mut impl Iterator<Item = Hash>) -> bool;

    /// The child of `ancestor` which is a chain ancestor of `descendant`
    fn get_next_chain_ancestor(&self, descendant: Hash, ancestor: Hash) -> Hash;

    /// The tree (selected) parent of `this`
    fn get_chain_parent(&self, this: Hash) -> Hash;

    /// The lowest common ancestor of `a` and `b` in the selected-parent forest
    fn find_common_chain_ancestor(&self, a: Hash, b: Hash) -> Hash;
}

/// Multi-threaded reachability service over an RwLock-guarded store
#[derive(Clone)]
pub struct MTReachabilityService<T: ReachabilityStore> {
    store: Arc<RwLock<T>>,
}

impl<T: ReachabilityStore> MTReachabilityService<T> {
    pub fn new(store: Arc<RwLock<T>>) -> Self {
        Self { store }
    }

    /// Returns an iterator walking down the selected chain from `from`
    /// towards `to` (inclusive). The caller must assure `to` is a chain
    /// ancestor of `from`.
    pub fn backward_chain_iterator(&self, from: Hash, to: Hash, inclusive: bool) -> impl Iterator<Item = Hash> + '_ {
        BackwardChainIterator { store: self.store.clone(), current: Some(from), ancestor: to, inclusive }
    }

    /// Returns an iterator walking up the selected chain from `from` towards
    /// `to` (inclusive). The caller must assure `from` is a chain ancestor
    /// of `to`.
    pub fn forward_chain_iterator(&self, from: Hash, to: Hash, inclusive: bool) -> impl Iterator<Item = Hash> + '_ {
        ForwardChainIterator { store: self.store.clone(), current: Some(from), descendant: to, inclusive }
    }
}

impl<T: ReachabilityStore> ReachabilityService for MTReachabilityService<T> {
    fn is_chain_ancestor_of(&self, this: Hash, queried: Hash) -> bool {
        let read_guard = self.store.read();
        inquirer::is_chain_ancestor_of(&*read_guard, this, queried).unwrap()
    }

    fn is_dag_ancestor_of(&self, this: Hash, queried: Hash) -> bool {
        let read_guard = self.store.read();
        inquirer::is_dag_ancestor_of(&*read_guard, this, queried).unwrap()
    }

    fn is_dag_ancestor_of_any(&self, this: Hash, queried: &mut impl Iterator<Item = Hash>) -> bool {
        let read_guard = self.store.read();
        queried.any(|q| inquirer::is_dag_ancestor_of(&*read_guard, this, q).unwrap())
    }

    fn get_next_chain_ancestor(&self, descendant: Hash, ancestor: Hash) -> Hash {
        let read_guard = self.store.read();
        inquirer::get_next_chain_ancestor(&*read_guard, descendant, ancestor).unwrap()
    }

    fn get_chain_parent(&self, this: Hash) -> Hash {
        let read_guard = self.store.read();
        read_guard.get_parent(this).unwrap()
    }

    fn find_common_chain_ancestor(&self, a: Hash, b: Hash) -> Hash {
        let read_guard = self.store.read();
        inquirer::find_common_chain_ancestor(&*read_guard, a, b).unwrap()
    }
}

struct BackwardChainIterator<T: ReachabilityStore> {
    store: Arc<RwLock<T>>,
    current: Option<Hash>,
    ancestor: Hash,
    inclusive: bool,
}

impl<T: ReachabilityStore> Iterator for BackwardChainIterator<T> {
    type Item = Hash;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if current == self.ancestor {
            self.current = None;
            if self.inclusive {
                return Some(current);
            }
            return None;
        }
        self.current = Some(self.store.read().get_parent(current).unwrap());
        Some(current)
    }
}

struct ForwardChainIterator<T: ReachabilityStore> {
    store: Arc<RwLock<T>>,
    current: Option<Hash>,
    descendant: Hash,
    inclusive: bool,
}

impl<T: ReachabilityStore> Iterator for ForwardChainIterator<T> {
    type Item = Hash;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if current == self.descendant {
            self.current = None;
            if self.inclusive {
                return Some(current);
            }
            return None;
        }
        let next = {
            let read_guard = self.store.read();
            inquirer::get_next_chain_ancestor(&*read_guard, self.descendant, current).unwrap()
        };
        self.current = Some(next);
        Some(current)
    }
}

pub type DbReachabilityService = MTReachabilityService<DbReachabilityStore>;
