//! The script virtual machine. Execution follows the classic two-phase
//! model: the signature script (push-only) seeds the stack, then the script
//! public key runs over it. For P2SH outputs a third phase re-dispatches to
//! the redeem script carried as the last push of the signature script.

use crate::data_stack::{as_bool, DataStack};
use crate::errors::{ScriptError, ScriptResult};
use crate::opcodes::*;
use crate::sighash::{calc_signature_hash, SigHashType};
use crate::{
    is_payto_script_hash_parsed, MAX_OPS_PER_SCRIPT, MAX_PUB_KEYS_PER_MULTISIG, MAX_SCRIPT_ELEMENT_SIZE,
    MAX_SCRIPT_PUBLIC_KEY_VERSION, MAX_STACK_SIZE,
};
use sedra_consensus_core::tx::{ScriptPublicKey, Transaction, UtxoEntry};
use sedra_hashes::{Hasher, ScriptHash};
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, VerifyOnly};

/// Everything needed to validate a single transaction input
pub struct ScriptEngine<'a> {
    tx: &'a Transaction,
    input_index: usize,
    secp: Secp256k1<VerifyOnly>,
    stack: DataStack,
    alt_stack: DataStack,
}

impl<'a> ScriptEngine<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Self {
        assert!(input_index < tx.inputs.len());
        Self { tx, input_index, secp: Secp256k1::verification_only(), stack: DataStack::new(), alt_stack: DataStack::new() }
    }

    /// Executes the spending condition of `utxo_entry` against the input's
    /// signature script. Returns `Ok(())` iff the script evaluates to true.
    pub fn execute(&mut self, utxo_entry: &UtxoEntry) -> ScriptResult<()> {
        let script_public_key = &utxo_entry.script_public_key;
        if script_public_key.version() > MAX_SCRIPT_PUBLIC_KEY_VERSION {
            return Err(ScriptError::UnknownScriptVersion(script_public_key.version()));
        }

        let sig_script = &self.tx.inputs[self.input_index].signature_script;
        let sig_ops = crate::parse_script_strict(sig_script)?;
        if !sig_ops.iter().all(|op| op.is_push()) {
            return Err(ScriptError::SignatureScriptNotPushOnly);
        }

        let pk_ops = crate::parse_script_strict(script_public_key.script())?;
        let is_p2sh = is_payto_script_hash_parsed(&pk_ops);

        // Phase 1: seed the stack from the signature script
        self.execute_ops(&sig_ops, script_public_key)?;
        // The guarding script consumes the stack, so for P2SH a snapshot is
        // kept for the redeem phase
        let saved_stack: Option<Vec<Vec<u8>>> = if is_p2sh { Some(self.stack.items().to_vec()) } else { None };

        // Phase 2: run the output's guarding script
        self.execute_ops(&pk_ops, script_public_key)?;
        if !self.stack.pop_bool()? {
            return Err(ScriptError::EvalFalse);
        }

        // Phase 3: P2SH re-dispatch into the revealed redeem script, over the
        // phase-1 stack with the redeem push removed
        if let Some(mut items) = saved_stack {
            let redeem = items.pop().ok_or(ScriptError::EmptyStack)?;
            self.stack = DataStack::from_items(items);
            let redeem_spk = ScriptPublicKey::from_vec(script_public_key.version(), redeem.clone());
            let redeem_ops = crate::parse_script_strict(&redeem)?;
            self.execute_ops(&redeem_ops, &redeem_spk)?;
            if !self.stack.pop_bool()? {
                return Err(ScriptError::EvalFalse);
            }
        }
        Ok(())
    }

    fn execute_ops(&mut self, ops: &[ParsedOpcode<'_>], script_code: &ScriptPublicKey) -> ScriptResult<()> {
        let mut op_count = 0usize;
        // Each entry records whether its branch is currently executing
        let mut cond_stack: Vec<bool> = Vec::new();

        for op in ops {
            let executing = cond_stack.iter().all(|&c| c);

            if !op.is_push() {
                op_count += 1;
                if op_count > MAX_OPS_PER_SCRIPT {
                    return Err(ScriptError::TooManyOperations(MAX_OPS_PER_SCRIPT));
                }
            }
            if op.data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                return Err(ScriptError::ElementTooBig(op.data.len(), MAX_SCRIPT_ELEMENT_SIZE));
            }

            match op.value {
                // Conditionals are tracked even on non-executing branches
                OP_IF | OP_NOTIF => {
                    let branch = if executing {
                        let cond = self.stack.pop_bool()?;
                        if op.value == OP_IF {
                            cond
                        } else {
                            !cond
                        }
                    } else {
                        false
                    };
                    cond_stack.push(branch);
                    continue;
                }
                OP_ELSE => {
                    let top = cond_stack.last_mut().ok_or(ScriptError::UnbalancedConditional)?;
                    *top = !*top;
                    continue;
                }
                OP_ENDIF => {
                    cond_stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                    continue;
                }
                _ => {}
            }

            if !executing {
                continue;
            }

            self.execute_opcode(op, script_code)?;
            if self.stack.len() + self.alt_stack.len() > MAX_STACK_SIZE {
                return Err(ScriptError::StackOverflow(MAX_STACK_SIZE));
            }
        }

        if !cond_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }

    fn execute_opcode(&mut self, op: &ParsedOpcode<'_>, script_code: &ScriptPublicKey) -> ScriptResult<()> {
        match op.value {
            OP_0 => self.stack.push(Vec::new()),
            OP_DATA_1..=OP_PUSHDATA4 => self.stack.push(op.data.to_vec()),
            OP_1NEGATE => self.stack.push_number(-1),
            OP_1..=OP_16 => self.stack.push_number(op.as_small_int()),

            OP_NOP => {}
            OP_VERIFY => {
                if !self.stack.pop_bool()? {
                    return Err(ScriptError::VerifyFailed);
                }
            }
            OP_RETURN => return Err(ScriptError::EarlyReturn),

            OP_TOALTSTACK => {
                let item = self.stack.pop()?;
                self.alt_stack.push(item);
            }
            OP_FROMALTSTACK => {
                let item = self.alt_stack.pop()?;
                self.stack.push(item);
            }
            OP_2DROP => {
                self.stack.pop()?;
                self.stack.pop()?;
            }
            OP_2DUP => {
                let a = self.stack.peek(1)?.clone();
                let b = self.stack.peek(0)?.clone();
                self.stack.push(a);
                self.stack.push(b);
            }
            OP_IFDUP => {
                let top = self.stack.peek(0)?.clone();
                if as_bool(&top) {
                    self.stack.push(top);
                }
            }
            OP_DEPTH => {
                let depth = self.stack.len() as i64;
                self.stack.push_number(depth);
            }
            OP_DROP => {
                self.stack.pop()?;
            }
            OP_DUP => {
                let top = self.stack.peek(0)?.clone();
                self.stack.push(top);
            }
            OP_NIP => {
                self.stack.remove(1)?;
            }
            OP_OVER => {
                let item = self.stack.peek(1)?.clone();
                self.stack.push(item);
            }
            OP_ROT => {
                let item = self.stack.remove(2)?;
                self.stack.push(item);
            }
            OP_SWAP => {
                let item = self.stack.remove(1)?;
                self.stack.push(item);
            }
            OP_TUCK => {
                let top = self.stack.peek(0)?.clone();
                self.stack.insert(2, top);
            }
            OP_SIZE => {
                let size = self.stack.peek(0)?.len() as i64;
                self.stack.push_number(size);
            }

            OP_EQUAL => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                self.stack.push_bool(a == b);
            }
            OP_EQUALVERIFY => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                if a != b {
                    return Err(ScriptError::VerifyFailed);
                }
            }

            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let v = self.stack.pop_number()?;
                let result = match op.value {
                    OP_1ADD => v + 1,
                    OP_1SUB => v - 1,
                    OP_NEGATE => -v,
                    OP_ABS => v.abs(),
                    OP_NOT => (v == 0) as i64,
                    _ => (v != 0) as i64,
                };
                self.stack.push_number(result);
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN
            | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                let b = self.stack.pop_number()?;
                let a = self.stack.pop_number()?;
                let result = match op.value {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL => (a == b) as i64,
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };
                self.stack.push_number(result);
            }
            OP_NUMEQUALVERIFY => {
                let b = self.stack.pop_number()?;
                let a = self.stack.pop_number()?;
                if a != b {
                    return Err(ScriptError::VerifyFailed);
                }
            }
            OP_WITHIN => {
                let max = self.stack.pop_number()?;
                let min = self.stack.pop_number()?;
                let v = self.stack.pop_number()?;
                self.stack.push_bool(min <= v && v < max);
            }

            OP_HASH160 => {
                let item = self.stack.pop()?;
                self.stack.push(ScriptHash::hash(item).as_bytes()[..20].to_vec());
            }
            OP_BLAKE2B => {
                let item = self.stack.pop()?;
                self.stack.push(ScriptHash::hash(item).as_bytes().to_vec());
            }

            OP_CHECKSIG => {
                let result = self.check_sig(script_code)?;
                self.stack.push_bool(result);
            }
            OP_CHECKSIGVERIFY => {
                if !self.check_sig(script_code)? {
                    return Err(ScriptError::VerifyFailed);
                }
            }
            OP_CHECKMULTISIG => {
                let result = self.check_multisig(script_code)?;
                self.stack.push_bool(result);
            }
            OP_CHECKMULTISIGVERIFY => {
                if !self.check_multisig(script_code)? {
                    return Err(ScriptError::VerifyFailed);
                }
            }

            OP_RESERVED => return Err(ScriptError::ReservedOpcode(op.value)),
            other => return Err(ScriptError::InvalidOpcode(other)),
        }
        Ok(())
    }

    /// Pops `[sig, pubkey]` and verifies the signature over the sighash of
    /// the executing script. An empty or unparsable signature yields `false`
    /// rather than an error, letting scripts branch on the outcome.
    fn check_sig(&mut self, script_code: &ScriptPublicKey) -> ScriptResult<bool> {
        let pubkey_bytes = self.stack.pop()?;
        let mut sig_bytes = self.stack.pop()?;
        if sig_bytes.is_empty() {
            return Ok(false);
        }
        let hash_type = sig_bytes.pop().unwrap() as SigHashType;
        let sighash = calc_signature_hash(script_code, hash_type, self.tx, self.input_index)?;
        Ok(self.verify_signature(&sig_bytes, &pubkey_bytes, &sighash.as_bytes()))
    }

    fn check_multisig(&mut self, script_code: &ScriptPublicKey) -> ScriptResult<bool> {
        let num_keys = self.stack.pop_number()?;
        if num_keys < 0 || num_keys as usize > MAX_PUB_KEYS_PER_MULTISIG {
            return Err(ScriptError::InvalidPubKeyCount(num_keys));
        }
        let mut keys = Vec::with_capacity(num_keys as usize);
        for _ in 0..num_keys {
            keys.push(self.stack.pop()?);
        }

        let num_sigs = self.stack.pop_number()?;
        if num_sigs < 0 || num_sigs > num_keys {
            return Err(ScriptError::InvalidSignatureCount(num_sigs));
        }
        let mut sigs = Vec::with_capacity(num_sigs as usize);
        for _ in 0..num_sigs {
            sigs.push(self.stack.pop()?);
        }

        // Signatures must match pubkeys in order; each pubkey is consumed
        // whether or not it matched
        let mut key_iter = keys.into_iter();
        'outer: for sig in sigs {
            if sig.is_empty() {
                return Ok(false);
            }
            let mut sig = sig;
            let hash_type = sig.pop().unwrap() as SigHashType;
            let sighash = calc_signature_hash(script_code, hash_type, self.tx, self.input_index)?;
            for key in key_iter.by_ref() {
                if self.verify_signature(&sig, &key, &sighash.as_bytes()) {
                    continue 'outer;
                }
            }
            // Ran out of candidate pubkeys for this signature
            return Ok(false);
        }
        Ok(true)
    }

    fn verify_signature(&self, sig: &[u8], pubkey: &[u8], sighash: &[u8]) -> bool {
        let Ok(signature) = ecdsa::Signature::from_der(sig) else {
            return false;
        };
        let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
            return false;
        };
        let message = Message::from_slice(sighash).expect("sighash is exactly 32 bytes");
        self.secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_builder::ScriptBuilder;
    use crate::standard;
    use sedra_consensus_core::subnets::SUBNETWORK_ID_NATIVE;
    use sedra_consensus_core::tx::{TransactionInput, TransactionOutpoint, TransactionOutput};
    use secp256k1::SecretKey;

    fn spending_tx(sig_script: Vec<u8>) -> Transaction {
        Transaction::new(
            0,
            vec![TransactionInput::new(TransactionOutpoint::new(1.into(), 0), sig_script, 0)],
            vec![TransactionOutput::new(100, ScriptPublicKey::from_vec(0, vec![OP_1]))],
            0,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![],
        )
    }

    fn run(sig_script: Vec<u8>, script_public_key: ScriptPublicKey) -> ScriptResult<()> {
        let tx = spending_tx(sig_script);
        let entry = UtxoEntry::new(100, script_public_key, 0, false);
        ScriptEngine::new(&tx, 0).execute(&entry)
    }

    #[test]
    fn test_trivial_true_and_false() {
        assert!(run(vec![], ScriptPublicKey::from_vec(0, vec![OP_1])).is_ok());
        assert_eq!(run(vec![], ScriptPublicKey::from_vec(0, vec![OP_0])), Err(ScriptError::EvalFalse));
        assert_eq!(run(vec![], ScriptPublicKey::from_vec(0, vec![OP_RETURN])), Err(ScriptError::EarlyReturn));
    }

    #[test]
    fn test_arithmetic_and_conditionals() {
        let spk = ScriptPublicKey::from_vec(0, vec![OP_1, OP_1, OP_ADD, OP_1, OP_1, OP_ADD, OP_NUMEQUAL]);
        assert!(run(vec![], spk).is_ok());

        // IF branch selection: sig pushes the condition
        let spk = ScriptPublicKey::from_vec(0, vec![OP_IF, OP_1, OP_ELSE, OP_0, OP_ENDIF]);
        assert!(run(vec![OP_1], spk.clone()).is_ok());
        assert_eq!(run(vec![OP_0], spk), Err(ScriptError::EvalFalse));

        let unbalanced = ScriptPublicKey::from_vec(0, vec![OP_IF, OP_1]);
        assert_eq!(run(vec![OP_1], unbalanced), Err(ScriptError::UnbalancedConditional));
    }

    #[test]
    fn test_sig_script_must_be_push_only() {
        let spk = ScriptPublicKey::from_vec(0, vec![OP_1]);
        assert_eq!(run(vec![OP_1, OP_1, OP_ADD], spk), Err(ScriptError::SignatureScriptNotPushOnly));
    }

    #[test]
    fn test_p2pk_signature_flow() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let pubkey = secret.public_key(&secp);

        let spk = standard::pay_to_pub_key_script(&pubkey.serialize());
        let entry = UtxoEntry::new(100, spk.clone(), 0, false);

        // Sign over the unsigned transaction skeleton
        let unsigned = spending_tx(vec![]);
        let sighash = calc_signature_hash(&spk, crate::sighash::SIG_HASH_ALL, &unsigned, 0).unwrap();
        let message = Message::from_slice(&sighash.as_bytes()).unwrap();
        let mut sig = secp.sign_ecdsa(&message, &secret).serialize_der().to_vec();
        sig.push(crate::sighash::SIG_HASH_ALL as u8);

        let sig_script = ScriptBuilder::new().add_data(&sig).build();
        let tx = spending_tx(sig_script);
        assert!(ScriptEngine::new(&tx, 0).execute(&entry).is_ok());

        // A corrupted signature must fail evaluation
        let mut bad_sig = sig.clone();
        bad_sig[8] ^= 0x01;
        let tx = spending_tx(ScriptBuilder::new().add_data(&bad_sig).build());
        assert_eq!(ScriptEngine::new(&tx, 0).execute(&entry), Err(ScriptError::EvalFalse));
    }

    #[test]
    fn test_p2sh_redeem_flow() {
        // Redeem script: OP_1 (anyone can spend once revealed)
        let redeem = vec![OP_1];
        let spk = standard::pay_to_script_hash_script(&redeem);
        let entry = UtxoEntry::new(100, spk, 0, false);

        let sig_script = ScriptBuilder::new().add_data(&redeem).build();
        let tx = spending_tx(sig_script);
        assert!(ScriptEngine::new(&tx, 0).execute(&entry).is_ok());

        // A wrong redeem script fails the hash equality
        let tx = spending_tx(ScriptBuilder::new().add_data(&[OP_1, OP_NOP]).build());
        let entry2 = UtxoEntry::new(100, standard::pay_to_script_hash_script(&redeem), 0, false);
        assert_eq!(ScriptEngine::new(&tx, 0).execute(&entry2), Err(ScriptError::EvalFalse));
    }

    #[test]
    fn test_multisig_2_of_3() {
        let secp = Secp256k1::new();
        let secrets: Vec<SecretKey> = (1u8..=3).map(|i| SecretKey::from_slice(&[i; 32]).unwrap()).collect();
        let pubkeys: Vec<Vec<u8>> = secrets.iter().map(|s| s.public_key(&secp).serialize().to_vec()).collect();

        let mut builder = ScriptBuilder::new().add_op(OP_1 + 1); // OP_2
        for pk in pubkeys.iter() {
            builder = builder.add_data(pk);
        }
        let script = builder.add_op(OP_1 + 2).add_op(OP_CHECKMULTISIG).build(); // OP_3 <keys> OP_CHECKMULTISIG
        let spk = ScriptPublicKey::from_vec(0, script);
        let entry = UtxoEntry::new(100, spk.clone(), 0, false);

        let unsigned = spending_tx(vec![]);
        let sighash = calc_signature_hash(&spk, crate::sighash::SIG_HASH_ALL, &unsigned, 0).unwrap();
        let message = Message::from_slice(&sighash.as_bytes()).unwrap();
        let mut sign = |i: usize| {
            let mut sig = secp.sign_ecdsa(&message, &secrets[i]).serialize_der().to_vec();
            sig.push(crate::sighash::SIG_HASH_ALL as u8);
            sig
        };

        // Signatures in pubkey order: keys 0 and 2
        let (sig0, sig2) = (sign(0), sign(2));
        let sig_script = ScriptBuilder::new().add_data(&sig0).add_data(&sig2).build();
        let tx = spending_tx(sig_script);
        assert!(ScriptEngine::new(&tx, 0).execute(&entry).is_ok());

        // Out-of-order signatures fail
        let sig_script = ScriptBuilder::new().add_data(&sig2).add_data(&sig0).build();
        let tx = spending_tx(sig_script);
        assert_eq!(ScriptEngine::new(&tx, 0).execute(&entry), Err(ScriptError::EvalFalse));
    }
}
