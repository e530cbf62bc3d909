//! Deterministic binary codec for consensus entities. This is the canonical
//! byte representation: block and transaction identities hash these bytes,
//! and peers exchange them during sync.
//!
//! All integers are little-endian. Collection counts use the compact varint
//! form: values below 0xfd inline, then 0xfd+u16, 0xfe+u32, 0xff+u64.

use crate::block::Block;
use crate::header::Header;
use crate::subnets::{SubnetworkId, SUBNETWORK_ID_SIZE};
use crate::tx::{ScriptPublicKey, Transaction, TransactionInput, TransactionOutpoint, TransactionOutput, UtxoEntry};
use sedra_hashes::{Hash, Hasher, PayloadHash, HASH_SIZE};
use thiserror::Error;

pub const BLOCK_VERSION: u16 = 1;
pub const TX_VERSION: u16 = 0;

/// An upper bound applied to decoded collection counts before allocation,
/// so a malicious length prefix cannot trigger an oversized reservation
const MAX_DECODE_ITEMS: u64 = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("varint is not canonically encoded")]
    NonCanonicalVarint,

    #[error("collection count {0} exceeds the decode limit")]
    CountTooLarge(u64),

    #[error("payload hash does not commit to the payload")]
    PayloadHashMismatch,

    #[error("{0} trailing bytes after the encoded entity")]
    TrailingBytes(usize),
}

pub type WireResult<T> = std::result::Result<T, WireError>;

pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.data.len() < n {
            return Err(WireError::UnexpectedEof);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> WireResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> WireResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_hash(&mut self) -> WireResult<Hash> {
        Ok(Hash::from_slice(self.take(HASH_SIZE)?))
    }

    pub fn read_varint(&mut self) -> WireResult<u64> {
        let discriminant = self.read_u8()?;
        let value = match discriminant {
            0xff => self.read_u64()?,
            0xfe => self.read_u32()? as u64,
            0xfd => self.read_u16()? as u64,
            _ => return Ok(discriminant as u64),
        };
        // Reject paddings that would make equal values encode differently
        let min = match discriminant {
            0xff => 0x1_0000_0000,
            0xfe => 0x1_0000,
            _ => 0xfd,
        };
        if value < min {
            return Err(WireError::NonCanonicalVarint);
        }
        Ok(value)
    }

    pub fn read_count(&mut self) -> WireResult<usize> {
        let count = self.read_varint()?;
        if count > MAX_DECODE_ITEMS {
            return Err(WireError::CountTooLarge(count));
        }
        Ok(count as usize)
    }

    pub fn read_var_bytes(&mut self) -> WireResult<Vec<u8>> {
        let len = self.read_count()?;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self) -> WireResult<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(WireError::TrailingBytes(self.data.len()))
        }
    }
}

fn write_outpoint(buf: &mut Vec<u8>, outpoint: &TransactionOutpoint) {
    buf.extend_from_slice(&outpoint.transaction_id.as_bytes());
    buf.extend_from_slice(&outpoint.index.to_le_bytes());
}

fn read_outpoint(reader: &mut Reader) -> WireResult<TransactionOutpoint> {
    Ok(TransactionOutpoint::new(reader.read_hash()?, reader.read_u32()?))
}

fn write_script_public_key(buf: &mut Vec<u8>, spk: &ScriptPublicKey) {
    buf.extend_from_slice(&spk.version().to_le_bytes());
    write_varint(buf, spk.script().len() as u64);
    buf.extend_from_slice(spk.script());
}

fn read_script_public_key(reader: &mut Reader) -> WireResult<ScriptPublicKey> {
    let version = reader.read_u16()?;
    let script = reader.read_var_bytes()?;
    Ok(ScriptPublicKey::from_vec(version, script))
}

pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&tx.version.to_le_bytes());
    write_varint(&mut buf, tx.inputs.len() as u64);
    for input in tx.inputs.iter() {
        write_outpoint(&mut buf, &input.previous_outpoint);
        write_varint(&mut buf, input.signature_script.len() as u64);
        buf.extend_from_slice(&input.signature_script);
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_varint(&mut buf, tx.outputs.len() as u64);
    for output in tx.outputs.iter() {
        buf.extend_from_slice(&output.value.to_le_bytes());
        write_script_public_key(&mut buf, &output.script_public_key);
    }
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(tx.subnetwork_id.as_ref());
    buf.extend_from_slice(&tx.gas.to_le_bytes());
    buf.extend_from_slice(&PayloadHash::hash(&tx.payload).as_bytes());
    write_varint(&mut buf, tx.payload.len() as u64);
    buf.extend_from_slice(&tx.payload);
    buf
}

fn read_transaction(reader: &mut Reader) -> WireResult<Transaction> {
    let version = reader.read_u16()?;
    let num_inputs = reader.read_count()?;
    let mut inputs = Vec::with_capacity(num_inputs);
    for _ in 0..num_inputs {
        let previous_outpoint = read_outpoint(reader)?;
        let signature_script = reader.read_var_bytes()?;
        let sequence = reader.read_u64()?;
        inputs.push(TransactionInput::new(previous_outpoint, signature_script, sequence));
    }
    let num_outputs = reader.read_count()?;
    let mut outputs = Vec::with_capacity(num_outputs);
    for _ in 0..num_outputs {
        let value = reader.read_u64()?;
        let script_public_key = read_script_public_key(reader)?;
        outputs.push(TransactionOutput::new(value, script_public_key));
    }
    let lock_time = reader.read_u64()?;
    let subnetwork_id =
        SubnetworkId::from_bytes(reader.take(SUBNETWORK_ID_SIZE)?.try_into().expect("take returns the exact length"));
    let gas = reader.read_u64()?;
    let payload_hash = reader.read_hash()?;
    let payload = reader.read_var_bytes()?;
    if PayloadHash::hash(&payload) != payload_hash {
        return Err(WireError::PayloadHashMismatch);
    }
    Ok(Transaction::new(version, inputs, outputs, lock_time, subnetwork_id, gas, payload))
}

pub fn deserialize_transaction(data: &[u8]) -> WireResult<Transaction> {
    let mut reader = Reader::new(data);
    let tx = read_transaction(&mut reader)?;
    reader.finish()?;
    Ok(tx)
}

pub fn serialize_header(header: &Header) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 * (3 + header.parents.len()) + 64);
    buf.extend_from_slice(&header.version.to_le_bytes());
    write_varint(&mut buf, header.parents.len() as u64);
    for parent in header.parents.iter() {
        buf.extend_from_slice(&parent.as_bytes());
    }
    buf.extend_from_slice(&header.hash_merkle_root.as_bytes());
    buf.extend_from_slice(&header.accepted_id_merkle_root.as_bytes());
    buf.extend_from_slice(&header.utxo_commitment.as_bytes());
    buf.extend_from_slice(&(header.timestamp as i64).to_le_bytes());
    buf.extend_from_slice(&header.bits.to_le_bytes());
    buf.extend_from_slice(&header.nonce.to_le_bytes());
    buf.extend_from_slice(&header.daa_score.to_le_bytes());
    buf
}

fn read_header(reader: &mut Reader) -> WireResult<Header> {
    let version = reader.read_u16()?;
    let num_parents = reader.read_count()?;
    let mut parents = Vec::with_capacity(num_parents);
    for _ in 0..num_parents {
        parents.push(reader.read_hash()?);
    }
    let hash_merkle_root = reader.read_hash()?;
    let accepted_id_merkle_root = reader.read_hash()?;
    let utxo_commitment = reader.read_hash()?;
    let timestamp = reader.read_i64()? as u64;
    let bits = reader.read_u32()?;
    let nonce = reader.read_u64()?;
    let daa_score = reader.read_u64()?;
    Ok(Header::new(version, parents, hash_merkle_root, accepted_id_merkle_root, utxo_commitment, timestamp, bits, nonce, daa_score))
}

pub fn deserialize_header(data: &[u8]) -> WireResult<Header> {
    let mut reader = Reader::new(data);
    let header = read_header(&mut reader)?;
    reader.finish()?;
    Ok(header)
}

pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut buf = serialize_header(&block.header);
    write_varint(&mut buf, block.transactions.len() as u64);
    for tx in block.transactions.iter() {
        buf.extend_from_slice(&serialize_transaction(tx));
    }
    buf
}

pub fn deserialize_block(data: &[u8]) -> WireResult<Block> {
    let mut reader = Reader::new(data);
    let header = read_header(&mut reader)?;
    let num_txs = reader.read_count()?;
    let mut transactions = Vec::with_capacity(num_txs);
    for _ in 0..num_txs {
        transactions.push(read_transaction(&mut reader)?);
    }
    reader.finish()?;
    Ok(Block::new(header, transactions))
}

/// Serializes a UTXO set entry along with its outpoint, the format used for
/// pruning-point UTXO chunk transfer and for multiset element hashing
pub fn serialize_utxo(buf: &mut Vec<u8>, entry: &UtxoEntry, outpoint: &TransactionOutpoint) {
    write_outpoint(buf, outpoint);
    buf.extend_from_slice(&entry.amount.to_le_bytes());
    buf.extend_from_slice(&entry.block_blue_score.to_le_bytes());
    buf.push(entry.is_coinbase as u8);
    write_script_public_key(buf, &entry.script_public_key);
}

pub fn deserialize_utxo(reader: &mut Reader) -> WireResult<(TransactionOutpoint, UtxoEntry)> {
    let outpoint = read_outpoint(reader)?;
    let amount = reader.read_u64()?;
    let block_blue_score = reader.read_u64()?;
    let is_coinbase = reader.read_u8()? != 0;
    let script_public_key = read_script_public_key(reader)?;
    Ok((outpoint, UtxoEntry::new(amount, script_public_key, block_blue_score, is_coinbase)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnets::SUBNETWORK_ID_NATIVE;

    fn sample_tx() -> Transaction {
        Transaction::new(
            TX_VERSION,
            vec![
                TransactionInput::new(TransactionOutpoint::new(5.into(), 1), vec![0xab, 0xcd], 0xffff_ffff_ffff_ffff),
                TransactionInput::new(TransactionOutpoint::new(6.into(), 0), vec![], 0),
            ],
            vec![TransactionOutput::new(12345, ScriptPublicKey::from_vec(0, vec![0x51]))],
            100,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![9, 8, 7],
        )
    }

    #[test]
    fn test_varint_boundaries() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut reader = Reader::new(&buf);
            assert_eq!(reader.read_varint().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
        // Non-canonical: 0xfc padded into the u16 form
        let mut reader = Reader::new(&[0xfd, 0xfc, 0x00]);
        assert_eq!(reader.read_varint(), Err(WireError::NonCanonicalVarint));
    }

    #[test]
    fn test_block_codec_identity() {
        let header = Header::new(BLOCK_VERSION, vec![1.into(), 2.into()], 3.into(), 4.into(), 5.into(), 1234567, 0x207fffff, 42, 7);
        let block = Block::new(header, vec![sample_tx()]);
        let bytes = serialize_block(&block);
        let decoded = deserialize_block(&bytes).unwrap();
        assert_eq!(decoded.hash(), block.hash());
        assert_eq!(decoded.transactions, block.transactions);
        // The decoded identity must be byte-stable
        assert_eq!(serialize_block(&decoded), bytes);
    }

    #[test]
    fn test_malformed_rejection() {
        let bytes = serialize_transaction(&sample_tx());
        assert_eq!(deserialize_transaction(&bytes[..bytes.len() - 1]), Err(WireError::UnexpectedEof));

        let mut extended = bytes.clone();
        extended.push(0);
        assert_eq!(deserialize_transaction(&extended), Err(WireError::TrailingBytes(1)));

        // Corrupting the payload must break the payload-hash commitment
        let mut corrupted = bytes;
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        assert_eq!(deserialize_transaction(&corrupted), Err(WireError::PayloadHashMismatch));
    }
}
