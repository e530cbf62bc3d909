use sedra_hashes::{Hash, Hasher, HasherBase, MerkleBranchHash};

/// Hashes a left/right pair of tree nodes into their parent node.
pub fn merkle_hash(left: Hash, right: Hash) -> Hash {
    let mut hasher = MerkleBranchHash::new();
    hasher.update(left).update(right);
    hasher.finalize()
}

/// Computes the merkle root over the given leaf hashes. An empty list yields
/// the zero hash. Odd levels are padded by pairing the dangling node with the
/// zero hash, keeping the tree position-binding.
pub fn calc_merkle_root(hashes: impl Iterator<Item = Hash>) -> Hash {
    let mut level: Vec<Hash> = hashes.collect();
    if level.is_empty() {
        return Hash::default();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| merkle_hash(pair[0], *pair.get(1).unwrap_or(&Hash::default())))
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_root_basics() {
        assert_eq!(calc_merkle_root(std::iter::empty()), Hash::default());

        let single = Hash::from_u64(7);
        assert_eq!(calc_merkle_root(std::iter::once(single)), single);

        let leaves = [Hash::from_u64(1), Hash::from_u64(2), Hash::from_u64(3)];
        let left = merkle_hash(leaves[0], leaves[1]);
        let right = merkle_hash(leaves[2], Hash::default());
        assert_eq!(calc_merkle_root(leaves.iter().copied()), merkle_hash(left, right));

        // Swapping leaves must change the root
        let swapped = [leaves[1], leaves[0], leaves[2]];
        assert_ne!(calc_merkle_root(leaves.iter().copied()), calc_merkle_root(swapped.iter().copied()));
    }
}
