use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("opcode {0} requires {1} bytes, but script only has {2} remaining")]
    MalformedPush(u8, usize, usize),

    #[error("invalid sighash-single index: no output corresponds to the signed input")]
    InvalidSigHashSingleIndex,

    #[error("script public key version {0} is above the known maximum")]
    UnknownScriptVersion(u16),

    #[error("push element size {0} exceeds the {1} bytes limit")]
    ElementTooBig(usize, usize),

    #[error("exceeded the limit of {0} operations per script")]
    TooManyOperations(usize),

    #[error("stack size exceeded the limit of {0} items")]
    StackOverflow(usize),

    #[error("attempt to read from an empty stack")]
    EmptyStack,

    #[error("stack ended with a false value on top")]
    EvalFalse,

    #[error("verify-style opcode failed")]
    VerifyFailed,

    #[error("encountered OP_RETURN, the script is provably unspendable")]
    EarlyReturn,

    #[error("opcode 0x{0:02x} is reserved or disabled")]
    ReservedOpcode(u8),

    #[error("opcode 0x{0:02x} is not supported")]
    InvalidOpcode(u8),

    #[error("script number encoding is not minimal or exceeds {0} bytes")]
    InvalidNumber(usize),

    #[error("signature scripts must contain only push operations")]
    SignatureScriptNotPushOnly,

    #[error("conditional block is not balanced")]
    UnbalancedConditional,

    #[error("multisig pubkey count {0} is out of range")]
    InvalidPubKeyCount(i64),

    #[error("multisig signature count {0} is out of range")]
    InvalidSignatureCount(i64),

    #[error("malformed public key")]
    InvalidPubKey,

    #[error("empty or malformed signature")]
    InvalidSignature,
}

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;
