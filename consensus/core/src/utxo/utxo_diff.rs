use super::{
    utxo_collection::{
        subtraction_having_blue_score_in_place, subtraction_with_remainder_having_blue_score_in_place, UtxoCollection,
        UtxoCollectionExtensions,
    },
    utxo_error::{UtxoAlgebraError, UtxoResult},
};
use crate::tx::{TransactionOutpoint, UtxoEntry, VerifiableTransaction};
use serde::{Deserialize, Serialize};

/// A pair of disjoint-by-construction change sets over a base UTXO
/// collection. Applying the diff removes `remove` from the base and inserts
/// `add`; an outpoint present in both represents a replacement (removed with
/// one blue score and re-added with another).
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoDiff {
    pub add: UtxoCollection,
    pub remove: UtxoCollection,
}

impl UtxoDiff {
    pub fn new(add: UtxoCollection, remove: UtxoCollection) -> Self {
        Self { add, remove }
    }

    /// Swaps the roles of `add` and `remove`, producing the inverse diff:
    /// `apply(apply(base, d), d.reversed()) == base`
    pub fn reversed(&self) -> Self {
        Self { add: self.remove.clone(), remove: self.add.clone() }
    }

    /// Composes `other` on top of `self` such that for any base where the
    /// sequential application is defined:
    /// `apply(apply(base, self), other) == apply(base, self.with_diff(other))`
    pub fn with_diff(&self, other: &UtxoDiff) -> UtxoResult<UtxoDiff> {
        let mut clone = self.clone();
        clone.with_diff_in_place(other)?;
        Ok(clone)
    }

    pub fn with_diff_in_place(&mut self, other: &UtxoDiff) -> UtxoResult<()> {
        // Removals of `other` either cancel additions of `self` or accumulate
        for (outpoint, entry) in other.remove.iter() {
            if let Some(existing) = self.add.get(outpoint) {
                if existing.block_blue_score != entry.block_blue_score {
                    return Err(UtxoAlgebraError::DiffIntersectionPoint(
                        *outpoint,
                        "self.add and other.remove with different blue scores",
                    ));
                }
                self.add.remove(outpoint);
                continue;
            }
            if self.remove.contains_key(outpoint) {
                return Err(UtxoAlgebraError::DiffIntersectionPoint(*outpoint, "self.remove and other.remove"));
            }
            self.remove.insert(*outpoint, entry.clone());
        }

        // Additions of `other` either cancel removals of `self` or accumulate
        for (outpoint, entry) in other.add.iter() {
            if self.remove.contains_with_blue_score(outpoint, entry.block_blue_score) {
                self.remove.remove(outpoint);
                continue;
            }
            if self.add.contains_key(outpoint) {
                return Err(UtxoAlgebraError::DiffIntersectionPoint(*outpoint, "self.add and other.add"));
            }
            self.add.insert(*outpoint, entry.clone());
        }
        Ok(())
    }

    /// Computes the diff `d` such that for any base where the application of
    /// `self` is defined: `apply(apply(base, self), d) == apply(base, other)`
    pub fn diff_from(&self, other: &UtxoDiff) -> UtxoResult<UtxoDiff> {
        // Check that NOT (entries with unequal blue scores AND utxo is in self.add and/or other.remove) -> Error
        let rule_not_added_output_removed_with_blue_score =
            |outpoint: &TransactionOutpoint, this_entry: &UtxoEntry, other_entry: &UtxoEntry| {
                !(other_entry.block_blue_score != this_entry.block_blue_score
                    && (self.add.contains_with_blue_score(outpoint, other_entry.block_blue_score)
                        || other.remove.contains_with_blue_score(outpoint, this_entry.block_blue_score)))
            };

        if let Some(offending_outpoint) =
            self.remove.intersects_with_rule(&other.add, rule_not_added_output_removed_with_blue_score)
        {
            return Err(UtxoAlgebraError::DiffIntersectionPoint(offending_outpoint, "self.add and in other.remove"));
        }

        // Check that NOT (entries with unequal blue score AND utxo is in self.remove and/or other.add) -> Error
        let rule_not_removed_output_added_with_blue_score =
            |outpoint: &TransactionOutpoint, this_entry: &UtxoEntry, other_entry: &UtxoEntry| {
                !(other_entry.block_blue_score != this_entry.block_blue_score
                    && (self.remove.contains_with_blue_score(outpoint, other_entry.block_blue_score)
                        || other.add.contains_with_blue_score(outpoint, this_entry.block_blue_score)))
            };

        if let Some(offending_outpoint) =
            self.add.intersects_with_rule(&other.remove, rule_not_removed_output_added_with_blue_score)
        {
            return Err(UtxoAlgebraError::DiffIntersectionPoint(offending_outpoint, "self.remove and in other.add"));
        }

        // An entry in both removes with different blue scores means the diffs
        // are relative to different bases
        if let Some(offending_outpoint) = self.remove.intersects_with_rule(
            &other.remove,
            |_outpoint: &TransactionOutpoint, this_entry: &UtxoEntry, other_entry: &UtxoEntry| {
                other_entry.block_blue_score != this_entry.block_blue_score
            },
        ) {
            return Err(UtxoAlgebraError::DiffIntersectionPoint(
                offending_outpoint,
                "self.remove and other.remove with different blue scores, with no corresponding entry in self.add",
            ));
        }

        let mut result = UtxoDiff::default();

        // All utxos in self.add:
        // If they are not in other.add - should be added to result.remove
        let mut in_both_to_add = UtxoCollection::new();
        subtraction_with_remainder_having_blue_score_in_place(&self.add, &other.add, &mut result.remove, &mut in_both_to_add);
        // If they are in other.remove - base utxo-set is not the same
        if in_both_to_add.intersects(&self.remove) != in_both_to_add.intersects(&other.remove) {
            return Err(UtxoAlgebraError::General(
                "diff_from: outpoint both in self.add, other.add, and only one of self.remove and other.remove",
            ));
        }

        // All utxos in other.remove:
        // If they are not in self.remove - should be added to result.remove
        subtraction_having_blue_score_in_place(&other.remove, &self.remove, &mut result.remove);

        // All utxos in self.remove:
        // If they are not in other.remove - should be added to result.add
        subtraction_having_blue_score_in_place(&self.remove, &other.remove, &mut result.add);

        // All utxos in other.add:
        // If they are not in self.add - should be added to result.add
        subtraction_having_blue_score_in_place(&other.add, &self.add, &mut result.add);

        Ok(result)
    }

    /// Accumulates the full effect of a transaction: spends all populated
    /// inputs and produces all outputs with the provided accepting blue score
    pub fn add_transaction(&mut self, transaction: &impl VerifiableTransaction, block_blue_score: u64) -> UtxoResult<()> {
        for (input, entry) in transaction.populated_inputs() {
            self.remove_entry(&input.previous_outpoint, entry)?;
        }

        let is_coinbase = transaction.is_coinbase();
        let tx_id = transaction.id();

        for (i, output) in transaction.outputs().iter().enumerate() {
            let outpoint = TransactionOutpoint::new(tx_id, i as u32);
            let entry = UtxoEntry::new(output.value, output.script_public_key.clone(), block_blue_score, is_coinbase);
            self.add_entry(outpoint, entry)?;
        }
        Ok(())
    }

    fn remove_entry(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) -> UtxoResult<()> {
        if self.add.contains_with_blue_score(outpoint, entry.block_blue_score) {
            self.add.remove(outpoint);
        } else if self.remove.contains_key(outpoint) {
            return Err(UtxoAlgebraError::DoubleRemoveCall(*outpoint));
        } else {
            self.remove.insert(*outpoint, entry.clone());
        }
        Ok(())
    }

    fn add_entry(&mut self, outpoint: TransactionOutpoint, entry: UtxoEntry) -> UtxoResult<()> {
        if self.remove.contains_with_blue_score(&outpoint, entry.block_blue_score) {
            self.remove.remove(&outpoint);
        } else if self.add.contains_key(&outpoint) {
            return Err(UtxoAlgebraError::DoubleAddCall(outpoint));
        } else {
            self.add.insert(outpoint, entry);
        }
        Ok(())
    }

    /// Applies the diff to `collection` in place: `(collection \ remove) ∪ add`.
    /// Fails if a removed outpoint is absent or an added outpoint collides
    /// with a remaining entry.
    pub fn apply_to(&self, collection: &mut UtxoCollection) -> UtxoResult<()> {
        for (outpoint, entry) in self.remove.iter() {
            if !collection.contains_with_blue_score(outpoint, entry.block_blue_score) {
                return Err(UtxoAlgebraError::MissingOutpoint(*outpoint));
            }
            collection.remove(outpoint);
        }
        for (outpoint, entry) in self.add.iter() {
            if collection.insert(*outpoint, entry.clone()).is_some() {
                return Err(UtxoAlgebraError::DoubleAddCall(*outpoint));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;

    fn entry(blue_score: u64) -> UtxoEntry {
        UtxoEntry::new(1000, ScriptPublicKey::default(), blue_score, false)
    }

    fn outpoint(n: u64) -> TransactionOutpoint {
        TransactionOutpoint::new(n.into(), 0)
    }

    fn collection(pairs: &[(u64, u64)]) -> UtxoCollection {
        pairs.iter().map(|&(n, score)| (outpoint(n), entry(score))).collect()
    }

    #[test]
    fn test_apply_and_reverse_roundtrip() {
        let mut base = collection(&[(1, 1), (2, 2), (3, 3)]);
        let original = base.clone();
        let diff = UtxoDiff::new(collection(&[(4, 4)]), collection(&[(2, 2)]));

        diff.apply_to(&mut base).unwrap();
        assert_eq!(base, collection(&[(1, 1), (3, 3), (4, 4)]));

        diff.reversed().apply_to(&mut base).unwrap();
        assert_eq!(base, original);
    }

    #[test]
    fn test_apply_failures() {
        let mut base = collection(&[(1, 1)]);
        let missing = UtxoDiff::new(UtxoCollection::new(), collection(&[(9, 9)]));
        assert_eq!(missing.apply_to(&mut base.clone()), Err(UtxoAlgebraError::MissingOutpoint(outpoint(9))));

        let colliding = UtxoDiff::new(collection(&[(1, 5)]), UtxoCollection::new());
        assert_eq!(colliding.apply_to(&mut base), Err(UtxoAlgebraError::DoubleAddCall(outpoint(1))));
    }

    #[test]
    fn test_with_diff_sequential_equivalence() {
        let base = collection(&[(1, 1), (2, 2)]);
        let d1 = UtxoDiff::new(collection(&[(3, 3)]), collection(&[(1, 1)]));
        let d2 = UtxoDiff::new(collection(&[(4, 4)]), collection(&[(3, 3)]));

        let mut sequential = base.clone();
        d1.apply_to(&mut sequential).unwrap();
        d2.apply_to(&mut sequential).unwrap();

        let composed = d1.with_diff(&d2).unwrap();
        let mut composed_applied = base;
        composed.apply_to(&mut composed_applied).unwrap();

        assert_eq!(sequential, composed_applied);
        // The add-then-remove of outpoint 3 collapsed away entirely
        assert!(!composed.add.contains_key(&outpoint(3)));
        assert!(!composed.remove.contains_key(&outpoint(3)));
    }

    #[test]
    fn test_with_diff_conflicts() {
        let d1 = UtxoDiff::new(collection(&[(1, 1)]), UtxoCollection::new());
        let d2 = UtxoDiff::new(collection(&[(1, 1)]), UtxoCollection::new());
        assert!(d1.with_diff(&d2).is_err());

        let r1 = UtxoDiff::new(UtxoCollection::new(), collection(&[(1, 1)]));
        let r2 = UtxoDiff::new(UtxoCollection::new(), collection(&[(1, 1)]));
        assert!(r1.with_diff(&r2).is_err());
    }

    #[test]
    fn test_with_diff_commutes_on_disjoint_supports() {
        let d1 = UtxoDiff::new(collection(&[(1, 1)]), collection(&[(2, 2)]));
        let d2 = UtxoDiff::new(collection(&[(3, 3)]), collection(&[(4, 4)]));

        let ab = d1.with_diff(&d2).unwrap();
        let ba = d2.with_diff(&d1).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_diff_from() {
        // self moves base from S to A; other moves base from S to B;
        // diff_from yields the A->B transition
        let this = UtxoDiff::new(collection(&[(10, 5)]), collection(&[(1, 1)]));
        let other = UtxoDiff::new(collection(&[(11, 6)]), collection(&[(1, 1)]));
        let transition = this.diff_from(&other).unwrap();

        let mut state_a = collection(&[(1, 1), (2, 2)]);
        this.apply_to(&mut state_a).unwrap();
        transition.apply_to(&mut state_a).unwrap();

        let mut state_b = collection(&[(1, 1), (2, 2)]);
        other.apply_to(&mut state_b).unwrap();

        assert_eq!(state_a, state_b);
    }

    #[test]
    fn test_diff_from_detects_base_mismatch() {
        let this = UtxoDiff::new(UtxoCollection::new(), collection(&[(1, 1)]));
        let other = UtxoDiff::new(UtxoCollection::new(), collection(&[(1, 7)]));
        assert!(this.diff_from(&other).is_err());
    }
}
