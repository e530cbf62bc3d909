use super::{interval::Interval, Result};
use crate::model::stores::reachability::ReachabilityStoreReader;
use sedra_hashes::Hash;

/// Derived interval queries over any reachability store reader
pub(super) trait ReachabilityStoreIntervalExtensions {
    fn interval_children_capacity(&self, block: Hash) -> Result<Interval>;
    fn interval_remaining_before(&self, block: Hash) -> Result<Interval>;
    fn interval_remaining_after(&self, block: Hash) -> Result<Interval>;
}

impl<T: ReachabilityStoreReader + ?Sized> ReachabilityStoreIntervalExtensions for T {
    /// The capacity from which children are allocated: the block's interval
    /// minus its own allocated point (the interval end)
    fn interval_children_capacity(&self, block: Hash) -> Result<Interval> {
        Ok(self.get_interval(block)?.decrease_end(1))
    }

    /// The unallocated capacity before the first child
    fn interval_remaining_before(&self, block: Hash) -> Result<Interval> {
        let capacity = self.interval_children_capacity(block)?;
        match self.get_children(block)?.first() {
            Some(first_child) => {
                let first_child_interval = self.get_interval(*first_child)?;
                Ok(Interval::new(capacity.start, first_child_interval.start - 1))
            }
            None => Ok(capacity),
        }
    }

    /// The unallocated capacity after the last child
    fn interval_remaining_after(&self, block: Hash) -> Result<Interval> {
        let capacity = self.interval_children_capacity(block)?;
        match self.get_children(block)?.last() {
            Some(last_child) => {
                let last_child_interval = self.get_interval(*last_child)?;
                Ok(Interval::new(last_child_interval.end + 1, capacity.end))
            }
            None => Ok(capacity),
        }
    }
}
