use crate::hashing;
use sedra_hashes::Hash;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// Cached hash. Outside of tests, headers must only be built through
    /// constructors which finalize it.
    pub hash: Hash,
    pub version: u16,
    pub parents: Vec<Hash>,
    pub hash_merkle_root: Hash,
    pub accepted_id_merkle_root: Hash,
    pub utxo_commitment: Hash,
    /// Timestamp in milliseconds
    pub timestamp: u64,
    pub bits: u32,
    pub nonce: u64,
    pub daa_score: u64,
}

impl Header {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u16,
        parents: Vec<Hash>,
        hash_merkle_root: Hash,
        accepted_id_merkle_root: Hash,
        utxo_commitment: Hash,
        timestamp: u64,
        bits: u32,
        nonce: u64,
        daa_score: u64,
    ) -> Self {
        let mut header = Self {
            hash: Default::default(), // Temp init before the finalize below
            version,
            parents,
            hash_merkle_root,
            accepted_id_merkle_root,
            utxo_commitment,
            timestamp,
            bits,
            nonce,
            daa_score,
        };
        header.finalize();
        header
    }

    /// Recomputes and caches the header hash
    pub fn finalize(&mut self) {
        self.hash = hashing::header::hash(self);
    }

    /// Builds a header with a given hash, bypassing hash computation.
    /// To be used for tests only.
    pub fn from_precomputed_hash(hash: Hash, parents: Vec<Hash>) -> Self {
        Self {
            version: crate::wire::BLOCK_VERSION,
            hash,
            parents,
            hash_merkle_root: Default::default(),
            accepted_id_merkle_root: Default::default(),
            utxo_commitment: Default::default(),
            timestamp: 0,
            bits: 0,
            nonce: 0,
            daa_score: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_hash_commits_to_nonce() {
        let mut header =
            Header::new(1, vec![1.into()], Default::default(), Default::default(), Default::default(), 1234, 0x207fffff, 0, 0);
        let original = header.hash;
        header.nonce = 1;
        header.finalize();
        assert_ne!(original, header.hash);
    }
}
