pub mod data_stack;
pub mod engine;
pub mod errors;
pub mod opcodes;
pub mod script_builder;
pub mod sighash;
pub mod standard;

pub use crate::engine::ScriptEngine;
pub use crate::errors::{ScriptError, ScriptResult};
pub use crate::opcodes::{parse_script, parse_script_strict, ParsedOpcode};
pub use crate::script_builder::ScriptBuilder;

use crate::opcodes::*;
use crate::standard::is_script_hash;
use sedra_consensus_core::tx::ScriptPublicKey;

/// Maximum number of non-push operations per script
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of public keys a CHECKMULTISIG may carry
pub const MAX_PUB_KEYS_PER_MULTISIG: usize = 20;

/// Maximum number of bytes pushable to the stack
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined depth of the main and alt stacks
pub const MAX_STACK_SIZE: usize = 244;

/// The highest script public key version this engine knows to execute
pub const MAX_SCRIPT_PUBLIC_KEY_VERSION: u16 = 0;

/// Returns true if the script is in the standard pay-to-script-hash form
pub fn is_payto_script_hash(script_public_key: &ScriptPublicKey) -> bool {
    match parse_script_strict(script_public_key.script()) {
        Ok(ops) => is_script_hash(&ops),
        Err(_) => false,
    }
}

pub(crate) fn is_payto_script_hash_parsed(ops: &[ParsedOpcode<'_>]) -> bool {
    is_script_hash(ops)
}

/// Returns true if the script only pushes data
pub fn is_push_only(ops: &[ParsedOpcode<'_>]) -> bool {
    ops.iter().all(|op| op.is_push())
}

/// Returns whether the script public key is provably unspendable: it either
/// leads with `OP_RETURN` or fails to parse. Such outputs may be pruned from
/// the UTXO set immediately.
pub fn is_unspendable(script: &[u8]) -> bool {
    let (ops, result) = parse_script(script);
    if result.is_err() {
        return true;
    }
    !ops.is_empty() && ops[0].value == OP_RETURN
}

fn count_sig_ops(ops: &[ParsedOpcode<'_>], precise: bool) -> usize {
    let mut count = 0usize;
    for (i, op) in ops.iter().enumerate() {
        match op.value {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                // In precise mode recognize the preceding small-int pubkey
                // count, otherwise assume the maximum
                if precise && i > 0 && ops[i - 1].value >= OP_1 && ops[i - 1].value <= OP_16 {
                    count += ops[i - 1].as_small_int() as usize;
                } else {
                    count += MAX_PUB_KEYS_PER_MULTISIG;
                }
            }
            _ => {}
        }
    }
    count
}

/// A quick count of the signature operations in a script: CHECKSIG counts 1,
/// CHECKMULTISIG counts the maximum of 20. Malformed scripts count up to the
/// point of failure.
pub fn get_sig_op_count(script: &[u8]) -> usize {
    let (ops, _) = parse_script(script);
    count_sig_ops(&ops, false)
}

/// A precise count of the signature operations of an input: for P2SH outputs
/// the redeem script (the last push of the signature script) is re-parsed
/// and counted precisely; scripts which fail to parse count as zero.
pub fn get_precise_sig_op_count(signature_script: &[u8], script_public_key: &ScriptPublicKey) -> usize {
    let (pk_ops, _) = parse_script(script_public_key.script());

    if !is_script_hash(&pk_ops) {
        return count_sig_ops(&pk_ops, true);
    }

    // The signature script must be fully parsable and push-only for the
    // P2SH pair to be valid
    let Ok(sig_ops) = parse_script_strict(signature_script) else {
        return 0;
    };
    if sig_ops.is_empty() || !is_push_only(&sig_ops) {
        return 0;
    }

    let redeem_script = sig_ops.last().unwrap().data;
    if redeem_script.is_empty() {
        return 0;
    }

    // Count the parsable prefix of the redeem script
    let (redeem_ops, _) = parse_script(redeem_script);
    count_sig_ops(&redeem_ops, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sig_op_counting() {
        assert_eq!(get_sig_op_count(&[OP_CHECKSIG]), 1);
        assert_eq!(get_sig_op_count(&[OP_CHECKSIG, OP_CHECKSIGVERIFY]), 2);
        // Imprecise multisig counts the maximum
        assert_eq!(get_sig_op_count(&[OP_2, OP_CHECKMULTISIG]), MAX_PUB_KEYS_PER_MULTISIG);
        // Count up to the parse failure
        assert_eq!(get_sig_op_count(&[OP_CHECKSIG, OP_DATA_20, 0x01]), 1);
    }

    const OP_2: u8 = OP_1 + 1;
    const OP_3: u8 = OP_1 + 2;

    #[test]
    fn test_precise_sig_op_counting() {
        // Non-P2SH: precise multisig counting via the small-int prefix
        let spk = sedra_consensus_core::tx::ScriptPublicKey::from_vec(0, vec![OP_3, OP_CHECKMULTISIG]);
        assert_eq!(get_precise_sig_op_count(&[], &spk), 3);

        // P2SH: the redeem script is counted precisely
        let redeem = vec![OP_2, OP_CHECKMULTISIG];
        let p2sh = standard::pay_to_script_hash_script(&redeem);
        let sig_script = ScriptBuilder::new().add_data(&redeem).build();
        assert_eq!(get_precise_sig_op_count(&sig_script, &p2sh), 2);

        // Non-push-only signature script counts zero
        assert_eq!(get_precise_sig_op_count(&[OP_DUP], &p2sh), 0);

        // Malformed signature script counts zero
        assert_eq!(get_precise_sig_op_count(&[OP_DATA_20, 0x01], &p2sh), 0);

        // Empty redeem push counts zero
        let empty_push = ScriptBuilder::new().add_data(&[]).build();
        assert_eq!(get_precise_sig_op_count(&empty_push, &p2sh), 0);
    }
}
