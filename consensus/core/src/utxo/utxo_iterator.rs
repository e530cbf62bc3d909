use super::utxo_collection::UtxoCollectionExtensions;
use super::utxo_diff::UtxoDiff;
use super::utxo_error::UtxoResult;
use crate::tx::{TransactionOutpoint, UtxoEntry};

/// A pull-based iterator over `base ⊕ diff`: yields base entries which the
/// diff does not remove, followed by the diff's added entries.
pub struct UtxoIteratorWithDiff<I: Iterator<Item = (TransactionOutpoint, UtxoEntry)>> {
    base: I,
    diff: UtxoDiff,
    add_items: Option<std::vec::IntoIter<(TransactionOutpoint, UtxoEntry)>>,
}

impl<I: Iterator<Item = (TransactionOutpoint, UtxoEntry)>> UtxoIteratorWithDiff<I> {
    pub fn new(base: I, diff: UtxoDiff) -> Self {
        Self { base, diff, add_items: None }
    }

    /// Flattens a further diff into this iterator, yielding an iterator over
    /// `base ⊕ (diff ∘ other)`. Only valid before iteration has started.
    pub fn compose(self, other: &UtxoDiff) -> UtxoResult<Self> {
        assert!(self.add_items.is_none(), "composing after iteration started loses items");
        let combined = self.diff.with_diff(other)?;
        Ok(Self::new(self.base, combined))
    }
}

impl<I: Iterator<Item = (TransactionOutpoint, UtxoEntry)>> Iterator for UtxoIteratorWithDiff<I> {
    type Item = (TransactionOutpoint, UtxoEntry);

    fn next(&mut self) -> Option<Self::Item> {
        if self.add_items.is_none() {
            // Keep walking the base until an entry survives the diff's removals
            for (outpoint, entry) in self.base.by_ref() {
                if !self.diff.remove.contains_with_blue_score(&outpoint, entry.block_blue_score) {
                    return Some((outpoint, entry));
                }
            }
            self.add_items = Some(self.diff.add.clone().into_iter().collect::<Vec<_>>().into_iter());
        }
        self.add_items.as_mut().unwrap().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;
    use crate::utxo::utxo_collection::UtxoCollection;
    use std::collections::HashSet;

    fn entry(blue_score: u64) -> UtxoEntry {
        UtxoEntry::new(50, ScriptPublicKey::default(), blue_score, false)
    }

    fn outpoint(n: u64) -> TransactionOutpoint {
        TransactionOutpoint::new(n.into(), 0)
    }

    fn collection(pairs: &[(u64, u64)]) -> UtxoCollection {
        pairs.iter().map(|&(n, s)| (outpoint(n), entry(s))).collect()
    }

    #[test]
    fn test_iteration_skips_removed_and_appends_added() {
        let base = collection(&[(1, 1), (2, 2), (3, 3)]);
        let diff = UtxoDiff::new(collection(&[(4, 4)]), collection(&[(2, 2)]));

        let iter = UtxoIteratorWithDiff::new(base.clone().into_iter(), diff);
        let result: HashSet<TransactionOutpoint> = iter.map(|(op, _)| op).collect();
        assert_eq!(result, HashSet::from_iter([outpoint(1), outpoint(3), outpoint(4)]));
    }

    #[test]
    fn test_composition_flattens() {
        let base = collection(&[(1, 1)]);
        let first = UtxoDiff::new(collection(&[(2, 2)]), UtxoCollection::new());
        let second = UtxoDiff::new(collection(&[(3, 3)]), collection(&[(2, 2)]));

        let iter = UtxoIteratorWithDiff::new(base.into_iter(), first).compose(&second).unwrap();
        let result: HashSet<TransactionOutpoint> = iter.map(|(op, _)| op).collect();
        // 2 was added then removed, collapsing away
        assert_eq!(result, HashSet::from_iter([outpoint(1), outpoint(3)]));
    }
}
