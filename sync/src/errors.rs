use sedra_consensus::errors::RuleError;
use sedra_hashes::Hash;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("consensus rejected synced data: {0}")]
    Rule(#[from] RuleError),

    #[error("peer session timed out")]
    Timeout,

    #[error("peer disconnected")]
    Disconnected,

    #[error("peer responded with block {got} where {expected} was requested")]
    UnexpectedBlock { expected: Hash, got: Hash },

    #[error("peer sent a header-only block where a body was requested: {0}")]
    MissingRequestedBody(Hash),

    #[error("locator negotiation failed to converge")]
    NegotiationFailure,

    #[error("peer protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
