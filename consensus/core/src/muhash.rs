use crate::tx::{TransactionOutpoint, UtxoEntry, VerifiableTransaction};
use crate::wire;
use sedra_muhash::MuHash;

/// Domain-level operations over the generic multiset hash: elements are the
/// wire serialization of `(outpoint, entry)` pairs.
pub trait MuHashExtensions {
    fn add_utxo(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry);
    fn remove_utxo(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry);

    /// Adds the full effect of a populated transaction: removes all spent
    /// entries and adds all created outputs with the accepting blue score
    fn add_transaction(&mut self, tx: &impl VerifiableTransaction, block_blue_score: u64);

    fn from_transaction(tx: &impl VerifiableTransaction, block_blue_score: u64) -> Self;
}

impl MuHashExtensions for MuHash {
    fn add_utxo(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) {
        let mut buf = Vec::with_capacity(128);
        wire::serialize_utxo(&mut buf, entry, outpoint);
        self.add_element(&buf);
    }

    fn remove_utxo(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) {
        let mut buf = Vec::with_capacity(128);
        wire::serialize_utxo(&mut buf, entry, outpoint);
        self.remove_element(&buf);
    }

    fn add_transaction(&mut self, tx: &impl VerifiableTransaction, block_blue_score: u64) {
        for (input, entry) in tx.populated_inputs() {
            self.remove_utxo(&input.previous_outpoint, entry);
        }
        let tx_id = tx.id();
        let is_coinbase = tx.is_coinbase();
        for (i, output) in tx.outputs().iter().enumerate() {
            let outpoint = TransactionOutpoint::new(tx_id, i as u32);
            let entry = UtxoEntry::new(output.value, output.script_public_key.clone(), block_blue_score, is_coinbase);
            self.add_utxo(&outpoint, &entry);
        }
    }

    fn from_transaction(tx: &impl VerifiableTransaction, block_blue_score: u64) -> Self {
        let mut mh = MuHash::new();
        mh.add_transaction(tx, block_blue_score);
        mh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnets::SUBNETWORK_ID_NATIVE;
    use crate::tx::*;

    #[test]
    fn test_transaction_multiset_cancellation() {
        let spk = ScriptPublicKey::from_vec(0, vec![0x51]);
        let producing =
            Transaction::new(0, vec![], vec![TransactionOutput::new(100, spk.clone())], 0, SUBNETWORK_ID_NATIVE, 0, vec![]);
        let produced_entry = UtxoEntry::new(100, spk.clone(), 1, false);
        let spending = Transaction::new(
            0,
            vec![TransactionInput::new(TransactionOutpoint::new(producing.id(), 0), vec![], 0)],
            vec![TransactionOutput::new(100, spk)],
            0,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![],
        );

        let mut mh = MuHash::new();
        mh.add_transaction(&PopulatedTransaction::new(&producing, vec![]), 1);
        mh.add_transaction(&PopulatedTransaction::new(&spending, vec![produced_entry.clone()]), 2);

        // The produced-then-spent entry cancels: the set now holds only the
        // spending tx's output
        let mut expected = MuHash::new();
        expected.add_utxo(
            &TransactionOutpoint::new(spending.id(), 0),
            &UtxoEntry::new(100, produced_entry.script_public_key, 2, false),
        );
        assert_eq!(mh.finalize(), expected.finalize());
    }
}
