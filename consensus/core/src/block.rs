use crate::{header::Header, tx::Transaction};
use sedra_hashes::Hash;
use std::sync::Arc;

/// A Sedra block: a header embedding the DAG structure, plus a transaction
/// body. During header-first sync a block may temporarily carry an empty
/// body.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: Arc<Header>,
    pub transactions: Arc<Vec<Transaction>>,
}

impl Block {
    pub fn new(header: Header, txs: Vec<Transaction>) -> Self {
        Self { header: Arc::new(header), transactions: Arc::new(txs) }
    }

    pub fn from_arcs(header: Arc<Header>, transactions: Arc<Vec<Transaction>>) -> Self {
        Self { header, transactions }
    }

    pub fn from_header_arc(header: Arc<Header>) -> Self {
        Self { header, transactions: Arc::new(Vec::new()) }
    }

    pub fn from_header(header: Header) -> Self {
        Self { header: Arc::new(header), transactions: Arc::new(Vec::new()) }
    }

    pub fn is_header_only(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Builds a block with a precomputed hash. To be used for tests only.
    pub fn from_precomputed_hash(hash: Hash, parents: Vec<Hash>) -> Self {
        Self::from_header(Header::from_precomputed_hash(hash, parents))
    }
}
