//! Recognition and construction of standard script forms.

use crate::opcodes::*;
use crate::script_builder::ScriptBuilder;
use crate::ParsedOpcode;
use sedra_consensus_core::tx::ScriptPublicKey;
use sedra_hashes::{Hasher, ScriptHash};

/// The length of a script-hash commitment inside a P2SH script public key
pub const SCRIPT_HASH_SIZE: usize = 20;

/// Computes the 20-byte hash committing to a redeem script
pub fn script_hash(script: &[u8]) -> [u8; SCRIPT_HASH_SIZE] {
    ScriptHash::hash(script).as_bytes()[..SCRIPT_HASH_SIZE].try_into().unwrap()
}

/// `<pubkey> OP_CHECKSIG`
pub fn pay_to_pub_key_script(pubkey: &[u8]) -> ScriptPublicKey {
    ScriptPublicKey::from_vec(0, ScriptBuilder::new().add_data(pubkey).add_op(OP_CHECKSIG).build())
}

/// `OP_HASH160 <20-byte script hash> OP_EQUAL`
pub fn pay_to_script_hash_script(redeem_script: &[u8]) -> ScriptPublicKey {
    let hash = script_hash(redeem_script);
    ScriptPublicKey::from_vec(0, ScriptBuilder::new().add_op(OP_HASH160).add_data(&hash).add_op(OP_EQUAL).build())
}

/// A trivially spendable output script, useful for tests and simnet mining
pub fn op_true_script() -> ScriptPublicKey {
    ScriptPublicKey::from_vec(0, vec![OP_1])
}

/// Recognizes the canonical P2SH form over parsed opcodes
pub(crate) fn is_script_hash(ops: &[ParsedOpcode<'_>]) -> bool {
    ops.len() == 3
        && ops[0].value == OP_HASH160
        && ops[1].value == OP_DATA_20
        && ops[2].value == OP_EQUAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{is_payto_script_hash, is_unspendable};

    #[test]
    fn test_p2sh_recognition() {
        let spk = pay_to_script_hash_script(&[OP_1]);
        assert!(is_payto_script_hash(&spk));

        // Same shape but wrong trailing opcode
        let not_p2sh = ScriptPublicKey::from_vec(
            0,
            ScriptBuilder::new().add_op(OP_HASH160).add_data(&[7u8; 20]).add_op(OP_EQUALVERIFY).build(),
        );
        assert!(!is_payto_script_hash(&not_p2sh));

        // A 21-byte push breaks the template
        let not_p2sh = ScriptPublicKey::from_vec(
            0,
            ScriptBuilder::new().add_op(OP_HASH160).add_data(&[7u8; 21]).add_op(OP_EQUAL).build(),
        );
        assert!(!is_payto_script_hash(&not_p2sh));

        assert!(!is_payto_script_hash(&op_true_script()));
    }

    #[test]
    fn test_unspendable() {
        assert!(is_unspendable(&[OP_RETURN]));
        assert!(is_unspendable(&[OP_RETURN, OP_1]));
        // Malformed scripts are unspendable
        assert!(is_unspendable(&[OP_DATA_20, 0x01]));
        assert!(!is_unspendable(&[OP_1]));
        assert!(!is_unspendable(&[]));
    }
}
