use crate::Hash;

pub trait HasherBase {
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self;
}

pub trait Hasher: HasherBase + Clone + Default {
    fn finalize(self) -> Hash;

    #[inline]
    fn hash<A: AsRef<[u8]>>(data: A) -> Hash {
        let mut hasher = Self::default();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Declares a blake2b-256 hasher keyed with a fixed domain-separation key.
/// Distinct keys guarantee that equal payloads hashed under different domains
/// never collide.
macro_rules! blake2b_hasher {
    ($(#[$meta:meta])* $name:ident, $domain_key:literal) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(blake2b_simd::State);

        impl $name {
            #[inline]
            pub fn new() -> Self {
                Self(
                    blake2b_simd::Params::new()
                        .hash_length(crate::HASH_SIZE)
                        .key($domain_key)
                        .to_state(),
                )
            }
        }

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl HasherBase for $name {
            #[inline]
            fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
                self.0.update(data.as_ref());
                self
            }
        }

        impl Hasher for $name {
            #[inline]
            fn finalize(self) -> Hash {
                let mut out = [0u8; crate::HASH_SIZE];
                out.copy_from_slice(self.0.finalize().as_bytes());
                Hash(out)
            }
        }
    };
}

blake2b_hasher!(
    /// Hashes the full transaction body
    TransactionHash,
    b"TransactionHash"
);
blake2b_hasher!(
    /// Hashes the transaction with cleared signature scripts, yielding the transaction ID
    TransactionId,
    b"TransactionID"
);
blake2b_hasher!(
    /// Hashes the signature-hash preimage of a transaction
    TransactionSigningHash,
    b"TransactionSigningHash"
);
blake2b_hasher!(BlockHash, b"BlockHash");
blake2b_hasher!(MerkleBranchHash, b"MerkleBranchHash");
blake2b_hasher!(MuHashElementHash, b"MuHashElement");
blake2b_hasher!(MuHashFinalizeHash, b"MuHashFinalize");
blake2b_hasher!(
    /// Hashes payload bytes for the payload commitment inside a transaction ID
    PayloadHash,
    b"TransactionPayload"
);
blake2b_hasher!(
    /// Hashes script data for in-script hash opcodes and script-hash commitments
    ScriptHash,
    b"ScriptHash"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut hasher = BlockHash::new();
        hasher.update(b"abc").update(b"def");
        assert_eq!(hasher.finalize(), BlockHash::hash(b"abcdef"));
    }
}
