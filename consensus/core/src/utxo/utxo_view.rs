use super::utxo_collection::UtxoCollection;
use super::utxo_diff::UtxoDiff;
use crate::tx::{TransactionOutpoint, UtxoEntry};

/// A read-only view into some state of the UTXO set
pub trait UtxoView {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry>;

    fn contains(&self, outpoint: &TransactionOutpoint) -> bool {
        self.get(outpoint).is_some()
    }
}

impl UtxoView for UtxoCollection {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        UtxoCollection::get(self, outpoint).cloned()
    }
}

impl<V: UtxoView> UtxoView for &V {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        (*self).get(outpoint)
    }
}

/// A view overlaying a diff on top of a base view. Entries removed by the
/// diff disappear, entries added by it shadow the base.
pub struct ComposedUtxoView<V: UtxoView> {
    base: V,
    diff: UtxoDiff,
}

impl<V: UtxoView> UtxoView for ComposedUtxoView<V> {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        if let Some(entry) = self.diff.add.get(outpoint) {
            return Some(entry.clone());
        }
        if self.diff.remove.contains_key(outpoint) {
            return None;
        }
        self.base.get(outpoint)
    }
}

pub trait UtxoViewComposition: UtxoView + Sized {
    /// Returns a view of `self ⊕ diff` without materializing it
    fn compose(self, diff: &UtxoDiff) -> ComposedUtxoView<Self> {
        ComposedUtxoView { base: self, diff: diff.clone() }
    }
}

impl<V: UtxoView + Sized> UtxoViewComposition for V {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;

    fn entry(amount: u64) -> UtxoEntry {
        UtxoEntry::new(amount, ScriptPublicKey::default(), 0, false)
    }

    fn outpoint(n: u64) -> TransactionOutpoint {
        TransactionOutpoint::new(n.into(), 0)
    }

    #[test]
    fn test_composition_shadowing() {
        let mut base = UtxoCollection::new();
        base.insert(outpoint(1), entry(10));
        base.insert(outpoint(2), entry(20));

        let diff = UtxoDiff::new(
            [(outpoint(3), entry(30))].into_iter().collect(),
            [(outpoint(2), entry(20))].into_iter().collect(),
        );
        let view = (&base).compose(&diff);

        assert_eq!(view.get(&outpoint(1)).unwrap().amount, 10);
        assert!(view.get(&outpoint(2)).is_none());
        assert_eq!(view.get(&outpoint(3)).unwrap().amount, 30);

        // Stacking a second diff re-adds outpoint 2 with a new entry
        let second = UtxoDiff::new([(outpoint(2), entry(25))].into_iter().collect(), Default::default());
        let stacked = view.compose(&second);
        assert_eq!(stacked.get(&outpoint(2)).unwrap().amount, 25);
    }
}
