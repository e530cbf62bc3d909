mod extensions;
pub mod inquirer;
pub mod interval;
mod reindex;
pub mod tests;
mod tree;

use sedra_database::prelude::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReachabilityError {
    #[error("data store error")]
    StoreError(#[from] StoreError),

    #[error("data overflow error: {0}")]
    DataOverflow(String),

    #[error("data inconsistency error")]
    DataInconsistency,

    #[error("query is inconsistent")]
    BadQuery,
}

pub type Result<T> = std::result::Result<T, ReachabilityError>;
