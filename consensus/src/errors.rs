use sedra_consensus_core::tx::TransactionOutpoint;
use sedra_consensus_core::utxo::utxo_error::UtxoAlgebraError;
use sedra_consensus_core::wire::WireError;
use sedra_database::prelude::StoreError;
use sedra_hashes::Hash;
use sedra_txscript::ScriptError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("wrong block version: got {0} but expected {}", crate::constants::BLOCK_VERSION)]
    WrongBlockVersion(u16),

    #[error("the block timestamp is too far into the future: block timestamp is {0} but maximum timestamp allowed is {1}")]
    TimeTooFarIntoTheFuture(u64, u64),

    #[error("block has no parents")]
    NoParents,

    #[error("block has too many parents: got {0} when the limit is {1}")]
    TooManyParents(usize, usize),

    #[error("block has missing parents: {0:?}")]
    MissingParents(Vec<Hash>),

    #[error("parent {0} is invalid")]
    InvalidParent(Hash),

    #[error("parent {0} is an ancestor of parent {1}")]
    InvalidParentsRelation(Hash, Hash),

    #[error("block is known to be invalid")]
    KnownInvalid,

    #[error("pruning point {0} is not in the past of this block")]
    PruningViolation(Hash),

    #[error("block difficulty of {0:#x} is not the expected value of {1:#x}")]
    UnexpectedDifficulty(u32, u32),

    #[error("expected header daa score {0} but got {1}")]
    UnexpectedHeaderDaaScore(u64, u64),

    #[error("block timestamp of {0} is not after the past median time {1}")]
    TimeTooOld(u64, u64),

    #[error("block hash {0} is above the required proof-of-work target")]
    InvalidPoW(Hash),

    #[error("block merges {0} blocks > {1} merge set size limit")]
    MergeSetTooBig(u64, u64),

    #[error("block has no transactions")]
    NoTransactions,

    #[error("block has {0} transactions when the limit is {1}")]
    TooManyTransactions(usize, usize),

    #[error("first block transaction is not coinbase")]
    FirstTxNotCoinbase,

    #[error("block transaction at index {0} is an extra coinbase")]
    MultipleCoinbases(usize),

    #[error("block merkle root {0} does not match the computed value {1}")]
    BadMerkleRoot(Hash, Hash),

    #[error("block contains the transaction {0} twice")]
    DuplicateTransaction(Hash),

    #[error("block exceeds the signature-operation budget: {0} > {1}")]
    ExcessiveSigOps(usize, usize),

    #[error("transaction {0} is invalid: {1}")]
    InvalidTransaction(Hash, TxRuleError),

    #[error("{0} non-coinbase transactions of the block are invalid in its own UTXO context")]
    InvalidTransactionsInUtxoContext(usize),

    #[error("block UTXO commitment {0} does not match the computed multiset hash {1}")]
    BadUTXOCommitment(Hash, Hash),

    #[error("block accepted-id merkle root {0} does not match the computed value {1}")]
    BadAcceptedIDMerkleRoot(Hash, Hash),

    #[error("coinbase transaction does not match the expected reward transaction")]
    BadCoinbaseTransaction,

    #[error("coinbase payload is malformed or oversized")]
    BadCoinbasePayload,

    #[error("block {0} is unknown")]
    UnknownBlock(Hash),

    #[error("block {0} has no body")]
    MissingBlockBody(Hash),

    #[error("the locator high block and low block are not on the same selected parent chain")]
    LocatorHashesNotOnSameChain,

    #[error("pruning point import failed: {0}")]
    ImportedPruningPointMismatch(&'static str),

    #[error("wire format error: {0}")]
    MalformedBlock(#[from] WireError),

    #[error("utxo-diff algebra error: {0}")]
    UtxoDiff(#[from] UtxoAlgebraError),
}

#[derive(Error, Debug, Clone)]
pub enum TxRuleError {
    #[error("transaction has no inputs")]
    NoTxInputs,

    #[error("transaction has {0} inputs when the limit is {1}")]
    TooManyInputs(usize, usize),

    #[error("transaction has {0} outputs when the limit is {1}")]
    TooManyOutputs(usize, usize),

    #[error("transaction input {0} spends outpoint {1} which was already spent in this transaction")]
    DuplicateInput(usize, TransactionOutpoint),

    #[error("signature script of input {0} exceeds {1} bytes")]
    SignatureScriptTooBig(usize, usize),

    #[error("script public key of output {0} exceeds {1} bytes")]
    ScriptPublicKeyTooBig(usize, usize),

    #[error("output {0} value is zero")]
    ZeroOutputValue(usize),

    #[error("total output value overflows the monetary bound")]
    OutputsValueOverflow,

    #[error("non-native transactions must carry zero gas")]
    NonZeroGasInNativeSubnetwork,

    #[error("native transactions must carry an empty payload")]
    NonEmptyPayloadInNativeSubnetwork,

    #[error("transaction is missing outpoint {0} in its UTXO context")]
    MissingTxOutpoints(TransactionOutpoint),

    #[error("outpoint {0} is a coinbase output with blue score {1}, not yet mature at blue score {2}")]
    ImmatureCoinbaseSpend(TransactionOutpoint, u64, u64),

    #[error("total input amount {0} is lower than total output amount plus gas {1}")]
    InsufficientFunds(u64, u64),

    #[error("transaction is not finalized: lock time {0}")]
    NotFinalized(u64),

    #[error("script validation failed for input {0}: {1}")]
    ScriptValidation(usize, ScriptError),
}

pub type BlockProcessResult<T> = std::result::Result<T, RuleError>;
pub type TxResult<T> = std::result::Result<T, TxRuleError>;

/// The error surface of the consensus API, classified for callers: rule
/// violations reject the block and leave state untouched; storage errors put
/// the node in a degraded read-only mode; sync errors drop the peer.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("block rule violation: {0}")]
    Rule(#[from] RuleError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    General(&'static str),
}

/// Coarse classification used when mapping errors to an external surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    RuleViolation,
    Unknown,
    Inconsistent,
    Storage,
    Transient,
    Fatal,
}

impl ConsensusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsensusError::Rule(rule) => match rule {
                RuleError::MalformedBlock(_) => ErrorKind::Malformed,
                RuleError::MissingParents(_) | RuleError::UnknownBlock(_) | RuleError::MissingBlockBody(_) => ErrorKind::Unknown,
                RuleError::LocatorHashesNotOnSameChain | RuleError::UtxoDiff(_) | RuleError::ImportedPruningPointMismatch(_) => {
                    ErrorKind::Inconsistent
                }
                _ => ErrorKind::RuleViolation,
            },
            ConsensusError::Store(_) => ErrorKind::Storage,
            ConsensusError::General(_) => ErrorKind::Fatal,
        }
    }
}

pub type ConsensusResult<T> = std::result::Result<T, ConsensusError>;
