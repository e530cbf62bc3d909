mod tx_validation_in_isolation;
mod tx_validation_in_utxo_context;

use crate::params::Params;

/// Validates transactions both in isolation and within their UTXO context
#[derive(Clone)]
pub struct TransactionValidator {
    pub(super) max_tx_inputs: usize,
    pub(super) max_tx_outputs: usize,
    pub(super) max_signature_script_len: usize,
    pub(super) max_script_public_key_len: usize,
    pub(super) coinbase_maturity: u64,
}

/// Flags controlling how deep the contextual validation goes
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TxValidationFlags {
    Full,
    /// Skip script execution. Used when the exact transaction was already
    /// verified against the exact same UTXO context (e.g. the selected
    /// parent's own transactions during merge-set processing).
    SkipScriptChecks,
}

impl TransactionValidator {
    pub fn new(params: &Params) -> Self {
        Self {
            max_tx_inputs: params.max_tx_inputs,
            max_tx_outputs: params.max_tx_outputs,
            max_signature_script_len: params.max_signature_script_len,
            max_script_public_key_len: params.max_script_public_key_len,
            coinbase_maturity: params.coinbase_maturity,
        }
    }
}
