//! Opcode values and the script parser. Data-carrying opcodes encode their
//! payload either implicitly in the opcode value (`OP_DATA_1..=OP_DATA_75`)
//! or through a little-endian length prefix (`OP_PUSHDATA*`).

use crate::errors::{ScriptError, ScriptResult};

pub const OP_0: u8 = 0x00;
pub const OP_DATA_1: u8 = 0x01;
pub const OP_DATA_20: u8 = 0x14;
pub const OP_DATA_32: u8 = 0x20;
pub const OP_DATA_75: u8 = 0x4b;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;

pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;
pub const OP_SIZE: u8 = 0x82;

pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;

pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

pub const OP_HASH160: u8 = 0xa9;
pub const OP_BLAKE2B: u8 = 0xaa;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// A single parsed opcode with its push payload (empty for non-push opcodes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOpcode<'a> {
    pub value: u8,
    pub data: &'a [u8],
}

impl ParsedOpcode<'_> {
    /// Whether the opcode is `OP_0` or one of `OP_1..=OP_16`
    pub fn is_small_int(&self) -> bool {
        self.value == OP_0 || (OP_1..=OP_16).contains(&self.value)
    }

    /// The integer value of a small-int opcode
    pub fn as_small_int(&self) -> i64 {
        debug_assert!(self.is_small_int());
        if self.value == OP_0 {
            0
        } else {
            (self.value - (OP_1 - 1)) as i64
        }
    }

    /// All opcodes up to `OP_16` only push data to the stack
    pub fn is_push(&self) -> bool {
        self.value <= OP_16
    }
}

/// Parses a script into opcodes, failing on a push which overruns the script
/// end. On failure, the opcodes parsed so far are returned along with the
/// error, since sig-op counting is defined over the parsable prefix.
pub fn parse_script(script: &[u8]) -> (Vec<ParsedOpcode<'_>>, ScriptResult<()>) {
    let mut parsed = Vec::with_capacity(script.len());
    let mut i = 0usize;
    while i < script.len() {
        let value = script[i];
        i += 1;
        let data_len = match value {
            OP_DATA_1..=OP_DATA_75 => value as usize,
            OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
                let prefix_len = match value {
                    OP_PUSHDATA1 => 1,
                    OP_PUSHDATA2 => 2,
                    _ => 4,
                };
                if script.len() - i < prefix_len {
                    return (parsed, Err(ScriptError::MalformedPush(value, prefix_len, script.len() - i)));
                }
                let mut len = 0usize;
                for (j, &b) in script[i..i + prefix_len].iter().enumerate() {
                    len |= (b as usize) << (8 * j);
                }
                i += prefix_len;
                len
            }
            _ => 0,
        };
        if script.len() - i < data_len {
            return (parsed, Err(ScriptError::MalformedPush(value, data_len, script.len() - i)));
        }
        parsed.push(ParsedOpcode { value, data: &script[i..i + data_len] });
        i += data_len;
    }
    (parsed, Ok(()))
}

/// Parses a script, discarding the prefix on malformed pushes
pub fn parse_script_strict(script: &[u8]) -> ScriptResult<Vec<ParsedOpcode<'_>>> {
    let (parsed, result) = parse_script(script);
    result.map(|_| parsed)
}
