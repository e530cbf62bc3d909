//! Modified base58 encoding as used for address boundaries: the standard
//! 62-character alphanumeric alphabet with `0`, `O`, `I` and `l` omitted to
//! avoid visually ambiguous strings. Leading zero bytes map to leading `1`s.

use sedra_hashes::Hasher;
use thiserror::Error;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const CHECKSUM_LENGTH: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("character {0:?} is not part of the base58 alphabet")]
    InvalidCharacter(char),

    #[error("decoded payload is too short to carry a checksum")]
    TooShort,

    #[error("checksum mismatch")]
    BadChecksum,
}

fn digit_value(c: u8) -> Option<u64> {
    ALPHABET.iter().position(|&a| a == c).map(|p| p as u64)
}

pub fn encode(input: &[u8]) -> String {
    let zeros = input.iter().take_while(|&&b| b == 0).count();

    // Repeated division of the big-endian number by 58
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 138 / 100 + 1);
    let mut num: Vec<u8> = input[zeros..].to_vec();
    while !num.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(num.len());
        for &byte in num.iter() {
            let acc = (remainder << 8) | byte as u32;
            let q = (acc / 58) as u8;
            remainder = acc % 58;
            if !quotient.is_empty() || q != 0 {
                quotient.push(q);
            }
        }
        digits.push(remainder as u8);
        num = quotient;
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}

pub fn decode(input: &str) -> Result<Vec<u8>, Base58Error> {
    let ones = input.bytes().take_while(|&b| b == b'1').count();

    let mut num: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.bytes().skip(ones) {
        let digit = digit_value(c).ok_or(Base58Error::InvalidCharacter(c as char))?;
        // num = num * 58 + digit
        let mut carry = digit;
        for byte in num.iter_mut().rev() {
            let acc = *byte as u64 * 58 + carry;
            *byte = acc as u8;
            carry = acc >> 8;
        }
        while carry > 0 {
            num.insert(0, carry as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; ones];
    out.extend_from_slice(&num);
    Ok(out)
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let first = sedra_hashes::BlockHash::hash(data);
    let second = sedra_hashes::BlockHash::hash(first);
    second.as_bytes()[..CHECKSUM_LENGTH].try_into().unwrap()
}

/// Prepends a version byte and appends a 4-byte checksum before encoding
pub fn check_encode(payload: &[u8], version: u8) -> String {
    let mut data = Vec::with_capacity(payload.len() + 1 + CHECKSUM_LENGTH);
    data.push(version);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum(&data));
    encode(&data)
}

/// Decodes a check-encoded string, returning the payload and version byte
pub fn check_decode(input: &str) -> Result<(Vec<u8>, u8), Base58Error> {
    let decoded = decode(input)?;
    if decoded.len() < 1 + CHECKSUM_LENGTH {
        return Err(Base58Error::TooShort);
    }
    let (data, check) = decoded.split_at(decoded.len() - CHECKSUM_LENGTH);
    if checksum(data) != check {
        return Err(Base58Error::BadChecksum);
    }
    Ok((data[1..].to_vec(), data[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        let vectors: &[(&[u8], &str)] = &[
            (b"", ""),
            (b"1234598760", "3mJr7AoUXx2Wqd"),
            (b"abcdefghijklmnopqrstuvwxyz", "3yxU3u1igY8WkgtjK92fbJQCd4BZiiT1v25f"),
            (&[0x00, 0x00, b'a', b'b', b'c'], "11ZiCa"),
        ];
        for (input, expected) in vectors {
            assert_eq!(encode(input), *expected);
            assert_eq!(decode(expected).unwrap(), input.to_vec());
        }
    }

    #[test]
    fn test_decode_rejects_ambiguous_characters() {
        for c in ['0', 'O', 'I', 'l'] {
            assert_eq!(decode(&c.to_string()), Err(Base58Error::InvalidCharacter(c)));
        }
    }

    #[test]
    fn test_check_roundtrip_and_corruption() {
        let payload = b"example payload";
        let encoded = check_encode(payload, 7);
        let (decoded, version) = check_decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(version, 7);

        // Flip one character
        let mut corrupted: Vec<char> = encoded.chars().collect();
        let i = corrupted.len() / 2;
        corrupted[i] = if corrupted[i] == '2' { '3' } else { '2' };
        let corrupted: String = corrupted.into_iter().collect();
        assert_eq!(check_decode(&corrupted), Err(Base58Error::BadChecksum));

        assert_eq!(check_decode("2g"), Err(Base58Error::TooShort));
    }
}
