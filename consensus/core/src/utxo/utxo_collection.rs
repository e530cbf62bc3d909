use crate::tx::{TransactionOutpoint, UtxoEntry};
use std::collections::HashMap;

pub type UtxoCollection = HashMap<TransactionOutpoint, UtxoEntry>;

pub trait UtxoCollectionExtensions {
    /// Checks if `outpoint` exists with an entry holding `block_blue_score == blue_score`
    fn contains_with_blue_score(&self, outpoint: &TransactionOutpoint, blue_score: u64) -> bool;

    /// Adds all entries from `other` to `self`, overriding existing values
    fn add_many(&mut self, other: &Self);

    /// Removes all keys of `other` from `self`. Equivalent to `self - other` in set theory.
    fn remove_many(&mut self, other: &Self);

    /// Returns whether the key intersection of the two collections is non-empty
    fn intersects(&self, other: &Self) -> bool;

    /// Returns the first outpoint present in both collections for which `rule`
    /// holds over the two entries, if any
    fn intersects_with_rule(
        &self,
        other: &Self,
        rule: impl Fn(&TransactionOutpoint, &UtxoEntry, &UtxoEntry) -> bool,
    ) -> Option<TransactionOutpoint>;
}

impl UtxoCollectionExtensions for UtxoCollection {
    fn contains_with_blue_score(&self, outpoint: &TransactionOutpoint, blue_score: u64) -> bool {
        if let Some(entry) = self.get(outpoint) {
            entry.block_blue_score == blue_score
        } else {
            false
        }
    }

    fn add_many(&mut self, other: &Self) {
        for (k, v) in other.iter() {
            self.insert(*k, v.clone());
        }
    }

    fn remove_many(&mut self, other: &Self) {
        for k in other.keys() {
            self.remove(k);
        }
    }

    fn intersects(&self, other: &Self) -> bool {
        // Prefer iterating over the smaller set
        let (keys, other) = if self.len() <= other.len() { (self.keys(), other) } else { (other.keys(), self) };
        keys.into_iter().any(|k| other.contains_key(k))
    }

    fn intersects_with_rule(
        &self,
        other: &Self,
        rule: impl Fn(&TransactionOutpoint, &UtxoEntry, &UtxoEntry) -> bool,
    ) -> Option<TransactionOutpoint> {
        for (outpoint, entry) in self.iter() {
            if let Some(other_entry) = other.get(outpoint) {
                if rule(outpoint, entry, other_entry) {
                    return Some(*outpoint);
                }
            }
        }
        None
    }
}

/// Inserts into `result` every entry of `a` which has no same-blue-score
/// counterpart in `b`
pub(crate) fn subtraction_having_blue_score_in_place(a: &UtxoCollection, b: &UtxoCollection, result: &mut UtxoCollection) {
    for (outpoint, entry) in a.iter() {
        if !b.contains_with_blue_score(outpoint, entry.block_blue_score) {
            result.insert(*outpoint, entry.clone());
        }
    }
}

/// Same as [`subtraction_having_blue_score_in_place`], also collecting the
/// intersection into `remainder`
pub(crate) fn subtraction_with_remainder_having_blue_score_in_place(
    a: &UtxoCollection,
    b: &UtxoCollection,
    result: &mut UtxoCollection,
    remainder: &mut UtxoCollection,
) {
    for (outpoint, entry) in a.iter() {
        if b.contains_with_blue_score(outpoint, entry.block_blue_score) {
            remainder.insert(*outpoint, entry.clone());
        } else {
            result.insert(*outpoint, entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;

    fn entry(blue_score: u64) -> UtxoEntry {
        UtxoEntry::new(100, ScriptPublicKey::default(), blue_score, false)
    }

    fn outpoint(n: u64) -> TransactionOutpoint {
        TransactionOutpoint::new(n.into(), 0)
    }

    #[test]
    fn test_extensions() {
        let mut a = UtxoCollection::new();
        a.insert(outpoint(1), entry(5));
        assert!(a.contains_with_blue_score(&outpoint(1), 5));
        assert!(!a.contains_with_blue_score(&outpoint(1), 6));
        assert!(!a.contains_with_blue_score(&outpoint(2), 5));

        let mut b = UtxoCollection::new();
        b.insert(outpoint(2), entry(5));
        assert!(!a.intersects(&b));
        b.insert(outpoint(1), entry(9));
        assert!(a.intersects(&b));

        let conflict = a.intersects_with_rule(&b, |_, this, other| this.block_blue_score != other.block_blue_score);
        assert_eq!(conflict, Some(outpoint(1)));

        a.add_many(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[&outpoint(1)].block_blue_score, 9);
        a.remove_many(&b);
        assert!(a.is_empty());
    }
}
