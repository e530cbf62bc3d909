use crate::tx::TransactionOutpoint;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoAlgebraError {
    #[error("outpoint {0} both in {1}")]
    DiffIntersectionPoint(TransactionOutpoint, &'static str),

    #[error("outpoint {0} is removed twice")]
    DoubleRemoveCall(TransactionOutpoint),

    #[error("outpoint {0} is added twice")]
    DoubleAddCall(TransactionOutpoint),

    #[error("outpoint {0} not found in the base collection")]
    MissingOutpoint(TransactionOutpoint),

    #[error("utxo-diff algebra error: {0}")]
    General(&'static str),
}

pub type UtxoResult<T> = std::result::Result<T, UtxoAlgebraError>;
