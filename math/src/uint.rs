/// A macro constructing a little-endian-limbed fixed-width unsigned integer.
/// Only the operations required by consensus are implemented: additive
/// arithmetic for cumulative work, comparisons for tip selection, shifts and
/// byte conversions for target/hash handling, and serde for store encoding.
#[macro_export]
macro_rules! construct_uint {
    ($name:ident, $n_words:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub [u64; $n_words]);

        impl $name {
            pub const ZERO: Self = Self([0u64; $n_words]);
            pub const MAX: Self = Self([u64::MAX; $n_words]);
            pub const BITS: u32 = $n_words * 64;
            pub const BYTES: usize = $n_words * 8;

            #[inline]
            pub const fn from_u64(word: u64) -> Self {
                let mut limbs = [0u64; $n_words];
                limbs[0] = word;
                Self(limbs)
            }

            #[inline]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&limb| limb == 0)
            }

            /// The minimal number of bits required to represent the value.
            #[inline]
            pub fn bits(&self) -> u32 {
                for (i, &limb) in self.0.iter().enumerate().rev() {
                    if limb != 0 {
                        return (i as u32) * 64 + (64 - limb.leading_zeros());
                    }
                }
                0
            }

            #[inline]
            pub fn overflowing_add(self, other: Self) -> (Self, bool) {
                let mut result = Self::ZERO;
                let mut carry = false;
                for i in 0..$n_words {
                    let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
                    let (sum, c2) = sum.overflowing_add(carry as u64);
                    result.0[i] = sum;
                    carry = c1 | c2;
                }
                (result, carry)
            }

            #[inline]
            pub fn overflowing_sub(self, other: Self) -> (Self, bool) {
                let mut result = Self::ZERO;
                let mut borrow = false;
                for i in 0..$n_words {
                    let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
                    let (diff, b2) = diff.overflowing_sub(borrow as u64);
                    result.0[i] = diff;
                    borrow = b1 | b2;
                }
                (result, borrow)
            }

            #[inline]
            pub fn checked_add(self, other: Self) -> Option<Self> {
                match self.overflowing_add(other) {
                    (v, false) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            pub fn saturating_add(self, other: Self) -> Self {
                self.checked_add(other).unwrap_or(Self::MAX)
            }

            #[inline]
            pub fn overflowing_shl(self, shift: u32) -> (Self, bool) {
                let overflows = shift >= Self::BITS;
                let shift = shift & (Self::BITS - 1);
                let word_shift = (shift / 64) as usize;
                let bit_shift = shift % 64;
                let mut result = Self::ZERO;
                for i in word_shift..$n_words {
                    result.0[i] = self.0[i - word_shift] << bit_shift;
                    if bit_shift > 0 && i > word_shift {
                        result.0[i] |= self.0[i - word_shift - 1] >> (64 - bit_shift);
                    }
                }
                (result, overflows)
            }

            #[inline]
            pub fn overflowing_shr(self, shift: u32) -> (Self, bool) {
                let overflows = shift >= Self::BITS;
                let shift = shift & (Self::BITS - 1);
                let word_shift = (shift / 64) as usize;
                let bit_shift = shift % 64;
                let mut result = Self::ZERO;
                for i in word_shift..$n_words {
                    result.0[i - word_shift] = self.0[i] >> bit_shift;
                    if bit_shift > 0 && i < $n_words - 1 {
                        result.0[i - word_shift] |= self.0[i + 1] << (64 - bit_shift);
                    }
                }
                (result, overflows)
            }

            #[inline]
            pub fn from_le_bytes(bytes: [u8; Self::BYTES]) -> Self {
                let mut out = Self::ZERO;
                bytes
                    .chunks_exact(8)
                    .zip(out.0.iter_mut())
                    .for_each(|(chunk, limb)| *limb = u64::from_le_bytes(chunk.try_into().unwrap()));
                out
            }

            #[inline]
            pub fn to_le_bytes(self) -> [u8; Self::BYTES] {
                let mut out = [0u8; Self::BYTES];
                self.0
                    .iter()
                    .zip(out.chunks_exact_mut(8))
                    .for_each(|(limb, chunk)| chunk.copy_from_slice(&limb.to_le_bytes()));
                out
            }

            #[inline]
            pub fn from_be_bytes(bytes: [u8; Self::BYTES]) -> Self {
                let mut le = bytes;
                le.reverse();
                Self::from_le_bytes(le)
            }

            #[inline]
            pub fn to_be_bytes(self) -> [u8; Self::BYTES] {
                let mut out = self.to_le_bytes();
                out.reverse();
                out
            }

            /// Builds the value from a little-endian slice of arbitrary length.
            /// Returns `None` if the slice holds a value wider than the type.
            pub fn try_from_le_slice(slice: &[u8]) -> Option<Self> {
                if slice.len() > Self::BYTES && slice[Self::BYTES..].iter().any(|&b| b != 0) {
                    return None;
                }
                let mut bytes = [0u8; Self::BYTES];
                let len = slice.len().min(Self::BYTES);
                bytes[..len].copy_from_slice(&slice[..len]);
                Some(Self::from_le_bytes(bytes))
            }
        }

        impl PartialOrd for $name {
            #[inline]
            fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            #[inline]
            fn cmp(&self, other: &Self) -> core::cmp::Ordering {
                // Compare limbs from the most significant downwards
                self.0.iter().rev().cmp(other.0.iter().rev())
            }
        }

        impl core::ops::Add for $name {
            type Output = Self;
            #[inline]
            fn add(self, other: Self) -> Self {
                let (sum, overflow) = self.overflowing_add(other);
                debug_assert!(!overflow, concat!(stringify!($name), " addition overflow"));
                sum
            }
        }

        impl core::ops::AddAssign for $name {
            #[inline]
            fn add_assign(&mut self, other: Self) {
                *self = *self + other;
            }
        }

        impl core::ops::Sub for $name {
            type Output = Self;
            #[inline]
            fn sub(self, other: Self) -> Self {
                let (diff, underflow) = self.overflowing_sub(other);
                debug_assert!(!underflow, concat!(stringify!($name), " subtraction underflow"));
                diff
            }
        }

        impl core::ops::Shl<u32> for $name {
            type Output = Self;
            #[inline]
            fn shl(self, shift: u32) -> Self {
                self.overflowing_shl(shift).0
            }
        }

        impl core::ops::Shr<u32> for $name {
            type Output = Self;
            #[inline]
            fn shr(self, shift: u32) -> Self {
                self.overflowing_shr(shift).0
            }
        }

        impl core::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, |acc, v| acc + v)
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(word: u64) -> Self {
                Self::from_u64(word)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(self, f)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut hex = [0u8; Self::BYTES * 2];
                faster_hex::hex_encode(&self.to_be_bytes(), &mut hex).expect("The output is exactly twice the size of the input");
                f.write_str(core::str::from_utf8(&hex).expect("hex is always valid UTF-8"))
            }
        }

        impl core::str::FromStr for $name {
            type Err = faster_hex::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; Self::BYTES];
                faster_hex::hex_decode(s.as_bytes(), &mut bytes)?;
                Ok(Self::from_be_bytes(bytes))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_string())
                } else {
                    serializer.serialize_bytes(&self.to_le_bytes())
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                use serde::de::Error;
                if deserializer.is_human_readable() {
                    let s = <&str as serde::Deserialize>::deserialize(deserializer)?;
                    s.parse().map_err(D::Error::custom)
                } else {
                    let bytes = <&[u8] as serde::Deserialize>::deserialize(deserializer)?;
                    let arr: [u8; Self::BYTES] =
                        bytes.try_into().map_err(|_| D::Error::custom("unexpected integer width"))?;
                    Ok(Self::from_le_bytes(arr))
                }
            }
        }
    };
}

construct_uint!(Uint256, 4);
construct_uint!(Uint192, 3);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_basic_arithmetic() {
        let a = Uint256::from_u64(u64::MAX);
        let b = Uint256::from_u64(1);
        let sum = a + b;
        assert_eq!(sum.0, [0, 1, 0, 0]);
        assert_eq!(sum - b, a);
        assert_eq!(sum.bits(), 65);
        assert!(sum > a);

        let (_, overflow) = Uint256::MAX.overflowing_add(b);
        assert!(overflow);
        assert_eq!(Uint256::MAX.saturating_add(b), Uint256::MAX);
    }

    #[test]
    fn test_shifts() {
        let one = Uint256::from_u64(1);
        assert_eq!((one << 255) >> 255, one);
        assert_eq!((one << 64).0, [0, 1, 0, 0]);
        assert_eq!((one << 200) >> 136, one << 64);
    }

    #[test]
    fn test_byte_roundtrip_and_ordering() {
        let v = Uint256([0x0123456789abcdef, 0xfedcba9876543210, 7, 0]);
        assert_eq!(Uint256::from_le_bytes(v.to_le_bytes()), v);
        assert_eq!(Uint256::from_be_bytes(v.to_be_bytes()), v);
        assert!(Uint256([0, 0, 0, 1]) > Uint256([u64::MAX, u64::MAX, u64::MAX, 0]));
    }

    #[test]
    fn test_hex_and_serde() {
        let v = Uint256::from_u64(0xdeadbeef);
        let s = v.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.ends_with("deadbeef"));
        assert_eq!(Uint256::from_str(&s).unwrap(), v);

        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(serde_json::from_str::<Uint256>(&json).unwrap(), v);
    }

    #[test]
    fn test_try_from_le_slice() {
        let v = Uint256::from_u64(42);
        assert_eq!(Uint256::try_from_le_slice(&[42]), Some(v));
        assert_eq!(Uint256::try_from_le_slice(&v.to_le_bytes()), Some(v));
        let mut wide = [0u8; 33];
        wide[32] = 1;
        assert_eq!(Uint256::try_from_le_slice(&wide), None);
    }
}
