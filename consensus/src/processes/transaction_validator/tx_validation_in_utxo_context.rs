use super::{TransactionValidator, TxValidationFlags};
use crate::constants::{LOCK_TIME_THRESHOLD, SEQUENCE_LOCK_TIME_DISABLED};
use crate::errors::{TxResult, TxRuleError};
use sedra_consensus_core::tx::VerifiableTransaction;
use sedra_txscript::ScriptEngine;

impl TransactionValidator {
    /// Validates a fully populated transaction within its UTXO context and
    /// returns the transaction fee: coinbase maturity of spent entries,
    /// funds sufficiency, finalization, and script execution per input.
    pub fn validate_populated_transaction_and_get_fee(
        &self,
        tx: &impl VerifiableTransaction,
        pov_blue_score: u64,
        pov_past_median_time: u64,
        flags: TxValidationFlags,
    ) -> TxResult<u64> {
        self.check_coinbase_maturity(tx, pov_blue_score)?;
        let total_in = self.check_input_amounts(tx)?;
        let total_out = tx.outputs().iter().map(|out| out.value).sum::<u64>();
        let total_due = total_out.checked_add(tx.tx().gas).ok_or(TxRuleError::OutputsValueOverflow)?;
        if total_in < total_due {
            return Err(TxRuleError::InsufficientFunds(total_in, total_due));
        }
        self.check_tx_is_finalized(tx, pov_blue_score, pov_past_median_time)?;
        if flags == TxValidationFlags::Full {
            self.check_scripts(tx)?;
        }
        Ok(total_in - total_due)
    }

    fn check_coinbase_maturity(&self, tx: &impl VerifiableTransaction, pov_blue_score: u64) -> TxResult<()> {
        for (input, entry) in tx.populated_inputs() {
            if entry.is_coinbase && entry.block_blue_score + self.coinbase_maturity > pov_blue_score {
                return Err(TxRuleError::ImmatureCoinbaseSpend(
                    input.previous_outpoint,
                    entry.block_blue_score,
                    pov_blue_score,
                ));
            }
        }
        Ok(())
    }

    fn check_input_amounts(&self, tx: &impl VerifiableTransaction) -> TxResult<u64> {
        let mut total: u64 = 0;
        for (_, entry) in tx.populated_inputs() {
            total = total.checked_add(entry.amount).ok_or(TxRuleError::OutputsValueOverflow)?;
        }
        Ok(total)
    }

    fn check_tx_is_finalized(
        &self,
        tx: &impl VerifiableTransaction,
        pov_blue_score: u64,
        pov_past_median_time: u64,
    ) -> TxResult<()> {
        let lock_time = tx.tx().lock_time;
        if lock_time == 0 {
            return Ok(());
        }
        // Lock times below the threshold are blue scores, above it they are
        // timestamps in milliseconds
        let pov = if lock_time < LOCK_TIME_THRESHOLD { pov_blue_score } else { pov_past_median_time };
        if lock_time < pov {
            return Ok(());
        }
        // A transaction with all input sequences at the maximal value is
        // final regardless of its lock time
        if tx.inputs().iter().all(|input| input.sequence == SEQUENCE_LOCK_TIME_DISABLED) {
            return Ok(());
        }
        Err(TxRuleError::NotFinalized(lock_time))
    }

    fn check_scripts(&self, tx: &impl VerifiableTransaction) -> TxResult<()> {
        for (i, (_, entry)) in tx.populated_inputs().enumerate() {
            ScriptEngine::new(tx.tx(), i)
                .execute(entry)
                .map_err(|err| TxRuleError::ScriptValidation(i, err))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SIMNET_PARAMS;
    use sedra_consensus_core::subnets::SUBNETWORK_ID_NATIVE;
    use sedra_consensus_core::tx::*;
    use sedra_txscript::opcodes::OP_1;

    fn validator() -> TransactionValidator {
        TransactionValidator::new(&SIMNET_PARAMS)
    }

    fn spk() -> ScriptPublicKey {
        ScriptPublicKey::from_vec(0, vec![OP_1])
    }

    fn populated(amount_in: u64, amount_out: u64, is_coinbase_entry: bool, entry_score: u64) -> (Transaction, Vec<UtxoEntry>) {
        let tx = Transaction::new(
            0,
            vec![TransactionInput::new(TransactionOutpoint::new(1.into(), 0), vec![], 0)],
            vec![TransactionOutput::new(amount_out, spk())],
            0,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![],
        );
        let entries = vec![UtxoEntry::new(amount_in, spk(), entry_score, is_coinbase_entry)];
        (tx, entries)
    }

    #[test]
    fn test_fee_calculation_and_insufficient_funds() {
        let (tx, entries) = populated(100, 70, false, 0);
        let populated_tx = PopulatedTransaction::new(&tx, entries);
        let fee = validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full).unwrap();
        assert_eq!(fee, 30);

        let (tx, entries) = populated(50, 70, false, 0);
        let populated_tx = PopulatedTransaction::new(&tx, entries);
        assert!(matches!(
            validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full),
            Err(TxRuleError::InsufficientFunds(50, 70))
        ));
    }

    #[test]
    fn test_coinbase_maturity() {
        // Entry created at blue score 950 with maturity 100 is not spendable
        // at blue score 1000
        let (tx, entries) = populated(100, 70, true, 950);
        let populated_tx = PopulatedTransaction::new(&tx, entries);
        assert!(matches!(
            validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full),
            Err(TxRuleError::ImmatureCoinbaseSpend(_, 950, 1000))
        ));

        let (tx, entries) = populated(100, 70, true, 900);
        let populated_tx = PopulatedTransaction::new(&tx, entries);
        assert!(validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full).is_ok());
    }

    #[test]
    fn test_finalization() {
        let (mut tx, entries) = populated(100, 70, false, 0);
        tx.lock_time = 2000;
        let populated_tx = PopulatedTransaction::new(&tx, entries.clone());
        assert!(matches!(
            validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full),
            Err(TxRuleError::NotFinalized(2000))
        ));

        // Finalized once the blue score passes the lock time
        let populated_tx = PopulatedTransaction::new(&tx, entries.clone());
        assert!(validator().validate_populated_transaction_and_get_fee(&populated_tx, 2001, 0, TxValidationFlags::Full).is_ok());

        // Maximal sequences disable the lock
        let mut disabled = tx.clone();
        disabled.inputs[0].sequence = SEQUENCE_LOCK_TIME_DISABLED;
        let populated_tx = PopulatedTransaction::new(&disabled, entries);
        assert!(validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full).is_ok());
    }

    #[test]
    fn test_script_failure_rejected() {
        let (tx, mut entries) = populated(100, 70, false, 0);
        entries[0].script_public_key = ScriptPublicKey::from_vec(0, vec![sedra_txscript::opcodes::OP_0]);
        let populated_tx = PopulatedTransaction::new(&tx, entries);
        assert!(matches!(
            validator().validate_populated_transaction_and_get_fee(&populated_tx, 1000, 0, TxValidationFlags::Full),
            Err(TxRuleError::ScriptValidation(0, _))
        ));
    }
}
