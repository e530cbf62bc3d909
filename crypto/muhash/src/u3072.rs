//! Arithmetic over GF(2^3072 - 1103717), the prime field underlying the
//! multiplicative multiset hash.

use crate::ELEMENT_BYTE_SIZE;
use std::ops::{DivAssign, MulAssign};

pub(crate) const LIMBS: usize = ELEMENT_BYTE_SIZE / 8;

/// `2^3072 - PRIME_DIFF` is prime.
pub(crate) const PRIME_DIFF: u64 = 1103717;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct U3072 {
    limbs: [u64; LIMBS],
}

impl U3072 {
    pub(crate) const MAX: Self = U3072 { limbs: [u64::MAX; LIMBS] };

    #[inline]
    pub(crate) const fn zero() -> Self {
        Self { limbs: [0; LIMBS] }
    }

    #[inline]
    pub(crate) const fn one() -> Self {
        let mut s = Self::zero();
        s.limbs[0] = 1;
        s
    }

    /// Whether the value is in `[2^3072 - PRIME_DIFF, 2^3072)`, i.e. has wrapped
    /// past the modulus.
    #[inline]
    #[must_use]
    pub(crate) fn is_overflow(&self) -> bool {
        if self.limbs[0] <= u64::MAX - PRIME_DIFF {
            return false;
        }
        self.limbs[1..].iter().all(|&limb| limb == u64::MAX)
    }

    #[inline]
    pub(crate) fn from_le_bytes(bytes: [u8; ELEMENT_BYTE_SIZE]) -> Self {
        let mut res = Self::zero();
        bytes
            .chunks_exact(8)
            .zip(res.limbs.iter_mut())
            .for_each(|(chunk, limb)| *limb = u64::from_le_bytes(chunk.try_into().unwrap()));
        res
    }

    #[inline]
    #[must_use]
    pub(crate) fn to_le_bytes(self) -> [u8; ELEMENT_BYTE_SIZE] {
        let mut res = [0u8; ELEMENT_BYTE_SIZE];
        self.limbs
            .iter()
            .zip(res.chunks_exact_mut(8))
            .for_each(|(limb, chunk)| chunk.copy_from_slice(&limb.to_le_bytes()));
        res
    }

    /// Subtracts the modulus once. Callers must ensure the value indeed wrapped.
    fn full_reduce(&mut self) {
        let mut carry = PRIME_DIFF;
        for limb in &mut self.limbs {
            let (sum, overflow) = limb.overflowing_add(carry);
            *limb = sum;
            carry = overflow as u64;
            if carry == 0 {
                break;
            }
        }
    }

    /// Adds `value` into `acc` starting at limb `at`, propagating carries.
    fn add_at(acc: &mut [u64], at: usize, value: u64) {
        let mut carry = value;
        let mut i = at;
        while carry != 0 {
            let (sum, overflow) = acc[i].overflowing_add(carry);
            acc[i] = sum;
            carry = overflow as u64;
            i += 1;
        }
    }

    fn mul(&mut self, other: &Self) {
        // Schoolbook product into a double-width accumulator
        let mut product = [0u64; 2 * LIMBS + 1];
        for i in 0..LIMBS {
            if self.limbs[i] == 0 {
                continue;
            }
            let mut carry = 0u64;
            for j in 0..LIMBS {
                let t = self.limbs[i] as u128 * other.limbs[j] as u128 + product[i + j] as u128 + carry as u128;
                product[i + j] = t as u64;
                carry = (t >> 64) as u64;
            }
            Self::add_at(&mut product, i + LIMBS, carry);
        }

        // Fold the high half down: 2^3072 ≡ PRIME_DIFF (mod p), so
        // low + high * PRIME_DIFF is congruent to the product.
        let mut acc = [0u64; LIMBS + 2];
        acc[..LIMBS].copy_from_slice(&product[..LIMBS]);
        for j in 0..=LIMBS {
            let high_limb = product[LIMBS + j];
            if high_limb == 0 {
                continue;
            }
            let t = high_limb as u128 * PRIME_DIFF as u128;
            Self::add_at(&mut acc, j, t as u64);
            Self::add_at(&mut acc, j + 1, (t >> 64) as u64);
        }

        // A second fold handles the (at most two-limb) spill of the first
        let spill = acc[LIMBS] as u128 + ((acc[LIMBS + 1] as u128) << 64);
        self.limbs.copy_from_slice(&acc[..LIMBS]);
        if spill != 0 {
            let t = spill * PRIME_DIFF as u128;
            let mut wide = [0u64; LIMBS + 1];
            wide[..LIMBS].copy_from_slice(&self.limbs);
            Self::add_at(&mut wide, 0, t as u64);
            Self::add_at(&mut wide, 1, (t >> 64) as u64);
            self.limbs.copy_from_slice(&wide[..LIMBS]);
            if wide[LIMBS] != 0 {
                // The third spill is at most 1
                debug_assert_eq!(wide[LIMBS], 1);
                self.full_reduce();
            }
        }
        if self.is_overflow() {
            self.full_reduce();
        }
    }

    fn square(&mut self) {
        let other = *self;
        self.mul(&other);
    }

    /// Fermat inversion: `a^(p-2) mod p`.
    #[must_use]
    fn inverse(&self) -> Self {
        // p - 2 in little-endian limbs: 2^3072 - (PRIME_DIFF + 2)
        let mut exponent = [u64::MAX; LIMBS];
        exponent[0] = u64::MAX - (PRIME_DIFF + 1);

        let mut out = Self::one();
        for &limb in exponent.iter().rev() {
            for bit in (0..64).rev() {
                out.square();
                if (limb >> bit) & 1 == 1 {
                    out.mul(self);
                }
            }
        }
        out
    }

    fn div(&mut self, other: &Self) {
        let inv = if other.is_overflow() {
            let mut reduced = *other;
            reduced.full_reduce();
            reduced.inverse()
        } else {
            other.inverse()
        };
        if self.is_overflow() {
            self.full_reduce();
        }
        self.mul(&inv);
        if self.is_overflow() {
            self.full_reduce();
        }
    }
}

impl MulAssign<&U3072> for U3072 {
    fn mul_assign(&mut self, rhs: &Self) {
        self.mul(rhs);
    }
}

impl DivAssign<&U3072> for U3072 {
    fn div_assign(&mut self, rhs: &Self) {
        self.div(rhs);
    }
}

impl Default for U3072 {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_u64(word: u64) -> U3072 {
        let mut v = U3072::zero();
        v.limbs[0] = word;
        v
    }

    #[test]
    fn test_mul_small() {
        let mut a = from_u64(7);
        a *= &from_u64(6);
        assert_eq!(a, from_u64(42));
    }

    #[test]
    fn test_mul_carry_propagation() {
        // (2^64 - 1)^2 = 2^128 - 2^65 + 1
        let mut a = from_u64(u64::MAX);
        a *= &from_u64(u64::MAX);
        let mut expected = U3072::zero();
        expected.limbs[0] = 1;
        expected.limbs[1] = u64::MAX - 1;
        assert_eq!(a, expected);
    }

    #[test]
    fn test_wraparound_reduction() {
        // MAX ≡ PRIME_DIFF - 1 (mod p), so MAX * 1 normalizes below the modulus
        let mut a = U3072::MAX;
        a *= &U3072::one();
        assert_eq!(a, from_u64(PRIME_DIFF - 1));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let mut a = from_u64(0xdeadbeefcafebabe);
        a.limbs[17] = 0x0123456789abcdef;
        let original = a;
        let inv = a.inverse();
        a *= &inv;
        assert_eq!(a, U3072::one());

        let mut b = original;
        b /= &original;
        assert_eq!(b, U3072::one());
    }

    #[test]
    fn test_div_cancels_mul() {
        let mut x = from_u64(123456789);
        x.limbs[40] = 77;
        let y = {
            let mut v = from_u64(987654321);
            v.limbs[3] = 0xabcdef;
            v
        };
        let original = x;
        x *= &y;
        x /= &y;
        assert_eq!(x, original);
    }
}
