mod u3072;

use crate::u3072::U3072;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sedra_hashes::{Hash, Hasher, MuHashElementHash, MuHashFinalizeHash};
use thiserror::Error;

pub const SERIALIZED_MUHASH_SIZE: usize = ELEMENT_BYTE_SIZE;

pub(crate) const ELEMENT_BIT_SIZE: usize = 3072;
pub(crate) const ELEMENT_BYTE_SIZE: usize = ELEMENT_BIT_SIZE / 8;

/// MuHash is a rolling (homomorphic) hash of a multiset: elements can be added
/// and removed in any order, and two sets with equal content always finalize
/// to the same hash. Addition multiplies into the numerator, removal into the
/// denominator; both sides are only reconciled on serialization.
#[derive(Clone, Debug)]
pub struct MuHash {
    numerator: U3072,
    denominator: U3072,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("serialized multiset value overflows the field")]
pub struct OverflowError;

impl MuHash {
    /// An empty multiset. Finalizes equal to any set with all elements removed.
    pub fn new() -> Self {
        Self { numerator: U3072::one(), denominator: U3072::one() }
    }

    /// Hashes the data and adds it to the multiset.
    pub fn add_element(&mut self, data: &[u8]) {
        let element = data_to_element(data);
        self.numerator *= &element;
    }

    /// Hashes the data and removes it from the multiset.
    pub fn remove_element(&mut self, data: &[u8]) {
        let element = data_to_element(data);
        self.denominator *= &element;
    }

    /// Merges `other` into `self`. Equivalent to adding and removing all of
    /// `other`'s elements one by one.
    pub fn combine(&mut self, other: &Self) {
        self.numerator *= &other.numerator;
        self.denominator *= &other.denominator;
    }

    pub fn finalize(&self) -> Hash {
        MuHashFinalizeHash::hash(self.clone().serialize())
    }

    fn normalize(&mut self) {
        self.numerator /= &self.denominator;
        self.denominator = U3072::one();
    }

    pub fn serialize(mut self) -> [u8; SERIALIZED_MUHASH_SIZE] {
        self.normalize();
        self.numerator.to_le_bytes()
    }

    pub fn deserialize(data: [u8; SERIALIZED_MUHASH_SIZE]) -> Result<Self, OverflowError> {
        let numerator = U3072::from_le_bytes(data);
        if numerator.is_overflow() {
            Err(OverflowError)
        } else {
            Ok(Self { numerator, denominator: U3072::one() })
        }
    }
}

fn data_to_element(data: &[u8]) -> U3072 {
    let hash = MuHashElementHash::hash(data);
    let mut stream = ChaCha20Rng::from_seed(hash.as_bytes());
    let mut bytes = [0u8; ELEMENT_BYTE_SIZE];
    stream.fill_bytes(&mut bytes);
    U3072::from_le_bytes(bytes)
}

impl Default for MuHash {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MuHash {
    fn eq(&self, other: &Self) -> bool {
        self.clone().serialize() == other.clone().serialize()
    }
}

impl Eq for MuHash {}

impl serde::Serialize for MuHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.clone().serialize())
    }
}

impl<'de> serde::Deserialize<'de> for MuHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let bytes = <&[u8] as serde::Deserialize>::deserialize(deserializer)?;
        let arr: [u8; SERIALIZED_MUHASH_SIZE] =
            bytes.try_into().map_err(|_| D::Error::custom("unexpected multiset width"))?;
        MuHash::deserialize(arr).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independence() {
        let elements: Vec<Vec<u8>> = (0u8..8).map(|i| vec![i; 32]).collect();

        let mut forward = MuHash::new();
        for e in elements.iter() {
            forward.add_element(e);
        }

        let mut backward = MuHash::new();
        for e in elements.iter().rev() {
            backward.add_element(e);
        }

        assert_eq!(forward.finalize(), backward.finalize());
    }

    #[test]
    fn test_add_remove_cancels() {
        let empty = MuHash::new().finalize();

        let mut set = MuHash::new();
        set.add_element(b"first");
        set.add_element(b"second");
        set.remove_element(b"first");
        set.remove_element(b"second");
        assert_eq!(set.finalize(), empty);

        // Removal before addition also cancels
        let mut set = MuHash::new();
        set.remove_element(b"ghost");
        set.add_element(b"ghost");
        assert_eq!(set.finalize(), empty);
    }

    #[test]
    fn test_combine_matches_elementwise() {
        let mut left = MuHash::new();
        left.add_element(b"a");
        left.remove_element(b"b");

        let mut right = MuHash::new();
        right.add_element(b"c");

        let mut combined = left.clone();
        combined.combine(&right);

        let mut expected = MuHash::new();
        expected.add_element(b"a");
        expected.remove_element(b"b");
        expected.add_element(b"c");

        assert_eq!(combined.finalize(), expected.finalize());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut set = MuHash::new();
        set.add_element(b"payload");
        let finalized = set.finalize();
        let restored = MuHash::deserialize(set.serialize()).unwrap();
        assert_eq!(restored.finalize(), finalized);

        assert_eq!(MuHash::deserialize([0xff; SERIALIZED_MUHASH_SIZE]), Err(OverflowError));
    }

    #[test]
    fn test_distinct_sets_differ() {
        let mut a = MuHash::new();
        a.add_element(b"x");
        let mut b = MuHash::new();
        b.add_element(b"y");
        assert_ne!(a.finalize(), b.finalize());
        assert_ne!(a.finalize(), MuHash::new().finalize());
    }
}
