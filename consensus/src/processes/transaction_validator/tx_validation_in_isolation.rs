use super::TransactionValidator;
use crate::constants::MAX_MONEY;
use crate::errors::{TxResult, TxRuleError};
use sedra_consensus_core::subnets::SUBNETWORK_ID_NATIVE;
use sedra_consensus_core::tx::Transaction;
use std::collections::HashSet;

impl TransactionValidator {
    /// Validates everything about a transaction which requires no state:
    /// structural bounds, duplicate inputs, value sanity, subnetwork rules.
    pub fn validate_tx_in_isolation(&self, tx: &Transaction) -> TxResult<()> {
        if !tx.is_coinbase() {
            if tx.inputs.is_empty() {
                return Err(TxRuleError::NoTxInputs);
            }
            if tx.inputs.len() > self.max_tx_inputs {
                return Err(TxRuleError::TooManyInputs(tx.inputs.len(), self.max_tx_inputs));
            }
        }
        if tx.outputs.len() > self.max_tx_outputs {
            return Err(TxRuleError::TooManyOutputs(tx.outputs.len(), self.max_tx_outputs));
        }

        let mut spent = HashSet::with_capacity(tx.inputs.len());
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.signature_script.len() > self.max_signature_script_len {
                return Err(TxRuleError::SignatureScriptTooBig(i, self.max_signature_script_len));
            }
            if !spent.insert(input.previous_outpoint) {
                return Err(TxRuleError::DuplicateInput(i, input.previous_outpoint));
            }
        }

        let mut total: u64 = 0;
        for (i, output) in tx.outputs.iter().enumerate() {
            if output.value == 0 {
                return Err(TxRuleError::ZeroOutputValue(i));
            }
            if output.script_public_key.script().len() > self.max_script_public_key_len {
                return Err(TxRuleError::ScriptPublicKeyTooBig(i, self.max_script_public_key_len));
            }
            total = total.checked_add(output.value).filter(|&t| t <= MAX_MONEY).ok_or(TxRuleError::OutputsValueOverflow)?;
        }

        if tx.subnetwork_id == SUBNETWORK_ID_NATIVE {
            if tx.gas != 0 {
                return Err(TxRuleError::NonZeroGasInNativeSubnetwork);
            }
            if !tx.payload.is_empty() {
                return Err(TxRuleError::NonEmptyPayloadInNativeSubnetwork);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SIMNET_PARAMS;
    use sedra_consensus_core::tx::{ScriptPublicKey, TransactionInput, TransactionOutpoint, TransactionOutput};

    fn validator() -> TransactionValidator {
        TransactionValidator::new(&SIMNET_PARAMS)
    }

    fn valid_tx() -> Transaction {
        Transaction::new(
            0,
            vec![TransactionInput::new(TransactionOutpoint::new(1.into(), 0), vec![], 0)],
            vec![TransactionOutput::new(100, ScriptPublicKey::from_vec(0, vec![0x51]))],
            0,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![],
        )
    }

    #[test]
    fn test_isolation_rules() {
        assert!(validator().validate_tx_in_isolation(&valid_tx()).is_ok());

        let mut tx = valid_tx();
        tx.inputs.clear();
        assert!(matches!(validator().validate_tx_in_isolation(&tx), Err(TxRuleError::NoTxInputs)));

        let mut tx = valid_tx();
        tx.inputs.push(tx.inputs[0].clone());
        assert!(matches!(validator().validate_tx_in_isolation(&tx), Err(TxRuleError::DuplicateInput(1, _))));

        let mut tx = valid_tx();
        tx.outputs[0].value = 0;
        assert!(matches!(validator().validate_tx_in_isolation(&tx), Err(TxRuleError::ZeroOutputValue(0))));

        let mut tx = valid_tx();
        tx.outputs[0].value = MAX_MONEY;
        tx.outputs.push(TransactionOutput::new(1, ScriptPublicKey::from_vec(0, vec![0x51])));
        assert!(matches!(validator().validate_tx_in_isolation(&tx), Err(TxRuleError::OutputsValueOverflow)));

        let mut tx = valid_tx();
        tx.gas = 5;
        assert!(matches!(validator().validate_tx_in_isolation(&tx), Err(TxRuleError::NonZeroGasInNativeSubnetwork)));

        let mut tx = valid_tx();
        tx.payload = vec![1];
        assert!(matches!(validator().validate_tx_in_isolation(&tx), Err(TxRuleError::NonEmptyPayloadInNativeSubnetwork)));
    }
}
