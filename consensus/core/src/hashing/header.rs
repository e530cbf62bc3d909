use crate::header::Header;
use crate::wire;
use sedra_hashes::{BlockHash, Hash, Hasher};

/// The header identity is the hash of its deterministic wire encoding
pub fn hash(header: &Header) -> Hash {
    BlockHash::hash(wire::serialize_header(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_commits_to_all_fields() {
        let base = Header::new(1, vec![1.into(), 2.into()], 3.into(), 4.into(), 5.into(), 6, 7, 8, 9);

        let mutations = [
            |h: &mut Header| h.version += 1,
            |h: &mut Header| h.parents.push(99.into()),
            |h: &mut Header| h.hash_merkle_root = 100.into(),
            |h: &mut Header| h.accepted_id_merkle_root = 100.into(),
            |h: &mut Header| h.utxo_commitment = 100.into(),
            |h: &mut Header| h.timestamp += 1,
            |h: &mut Header| h.bits += 1,
            |h: &mut Header| h.nonce += 1,
            |h: &mut Header| h.daa_score += 1,
        ];
        for mutate in mutations {
            let mut mutated = base.clone();
            mutate(&mut mutated);
            mutated.finalize();
            assert_ne!(base.hash, mutated.hash);
        }
    }
}
