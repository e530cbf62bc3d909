use crate::model::stores::block_window_cache::BlockWindowHeap;
use crate::model::stores::ghostdag::GhostdagData;
use crate::model::stores::headers::HeaderStoreReader;
use itertools::{Itertools, MinMaxResult::MinMax};
use num_bigint::BigUint;
use sedra_consensus_core::BlueWorkType;
use sedra_hashes::Hash;
use std::{
    cmp::{max, Ordering},
    collections::HashSet,
    sync::Arc,
};

use super::traversal::WindowBlock;

/// The difficulty adjustment algorithm: recomputes the required target from
/// the timestamps and targets of the block window.
#[derive(Clone)]
pub struct DifficultyManager<T: HeaderStoreReader> {
    headers_store: Arc<T>,
    genesis_bits: u32,
    difficulty_adjustment_window_size: usize,
    target_time_per_block: u64,
}

impl<T: HeaderStoreReader> DifficultyManager<T> {
    pub fn new(headers_store: Arc<T>, genesis_bits: u32, difficulty_adjustment_window_size: usize, target_time_per_block: u64) -> Self {
        Self { headers_store, difficulty_adjustment_window_size, genesis_bits, target_time_per_block }
    }

    /// A block's DAA score is its selected parent's score plus the number of
    /// its merge-set blocks which made it into the difficulty window
    pub fn calc_daa_score_and_added_blocks(
        &self,
        window_hashes: &mut impl ExactSizeIterator<Item = Hash>,
        ghostdag_data: &GhostdagData,
    ) -> (u64, Vec<Hash>) {
        if window_hashes.len() == 0 {
            return (0, Vec::new());
        }

        let mergeset_len = ghostdag_data.mergeset_size();
        let mergeset: HashSet<Hash> = ghostdag_data.unordered_mergeset().collect();

        let mut daa_added_blocks = Vec::with_capacity(mergeset_len);
        for hash in window_hashes {
            if mergeset.contains(&hash) {
                daa_added_blocks.push(hash);
                if daa_added_blocks.len() == mergeset_len {
                    break;
                }
            }
        }

        let sp_daa_score = self.headers_store.get_daa_score(ghostdag_data.selected_parent).unwrap();
        (sp_daa_score + daa_added_blocks.len() as u64, daa_added_blocks)
    }

    pub fn calculate_difficulty_bits(&self, window: &BlockWindowHeap) -> u32 {
        let mut difficulty_blocks: Vec<DifficultyBlock> = window
            .iter()
            .map(|item| {
                let data = self.headers_store.get_compact_header_data(item.0.hash).unwrap();
                DifficultyBlock { timestamp: data.timestamp, bits: data.bits, sortable_block: item.0 }
            })
            .collect();

        // Until there are enough blocks for a full block window the
        // difficulty remains constant
        if difficulty_blocks.len() < self.difficulty_adjustment_window_size {
            return self.genesis_bits;
        }

        let (min_ts_index, max_ts_index) = match difficulty_blocks.iter().position_minmax() {
            MinMax(min, max) => (min, max),
            _ => return self.genesis_bits,
        };

        let min_ts = difficulty_blocks[min_ts_index].timestamp;
        let max_ts = difficulty_blocks[max_ts_index].timestamp;

        // The minimal-timestamp block is removed so the average covers the
        // internal window
        difficulty_blocks.swap_remove(min_ts_index);

        let difficulty_blocks_len = difficulty_blocks.len();
        let targets_sum: BigUint = difficulty_blocks.into_iter().map(|diff_block| big_from_compact_target(diff_block.bits)).sum();
        let average_target = targets_sum / (difficulty_blocks_len as u64);
        let new_target = average_target * max(max_ts - min_ts, 1) / self.target_time_per_block / difficulty_blocks_len as u64;
        compact_target_from_big(&new_target)
    }
}

/// Decodes the floating-point "compact" target representation
pub fn big_from_compact_target(bits: u32) -> BigUint {
    let (mantissa, exponent) = {
        let unshifted_exponent = bits >> 24;
        if unshifted_exponent <= 3 {
            ((bits & 0xFFFFFF) >> (8 * (3 - unshifted_exponent as usize)), 0)
        } else {
            (bits & 0xFFFFFF, 8 * ((bits >> 24) - 3))
        }
    };

    // The mantissa is signed but may not be negative
    if mantissa > 0x7FFFFF {
        Default::default()
    } else {
        BigUint::from(mantissa) << (exponent as usize)
    }
}

/// Encodes a target value into the compact representation
pub fn compact_target_from_big(value: &BigUint) -> u32 {
    if value.bits() == 0 {
        return 0;
    }
    let mut size = (value.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        let digits = value.to_u64_digits();
        (digits[0] << (8 * (3 - size))) as u32
    } else {
        let bn = value >> (8 * (size - 3)) as usize;
        bn.to_u32_digits()[0]
    };

    if (compact & 0x00800000) != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | (size << 24) as u32
}

/// The work contributed by a block: `2^256 / (target + 1)`
pub fn calc_work(bits: u32) -> BlueWorkType {
    let target = big_from_compact_target(bits);
    let numerator = BigUint::from(1u8) << 256usize;
    let work = numerator / (target + 1u8);
    BlueWorkType::try_from_le_slice(&work.to_bytes_le()).expect("work is bounded by 2^256 / 1")
}

/// The PoW target as a 256-bit integer, or `None` when the compact form
/// encodes zero or overflows 256 bits
pub fn target_from_bits(bits: u32) -> Option<sedra_math::Uint256> {
    let target = big_from_compact_target(bits);
    if target.bits() == 0 || target.bits() > 256 {
        return None;
    }
    sedra_math::Uint256::try_from_le_slice(&target.to_bytes_le())
}

#[derive(Eq, PartialEq)]
struct DifficultyBlock {
    timestamp: u64,
    bits: u32,
    sortable_block: WindowBlock,
}

impl PartialOrd for DifficultyBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DifficultyBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp).then_with(|| self.sortable_block.cmp(&other.sortable_block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_roundtrip() {
        for bits in [0x1d00ffffu32, 0x207fffff, 0x1e21bc1c, 0x1b04864c] {
            let big = big_from_compact_target(bits);
            assert_eq!(compact_target_from_big(&big), bits, "bits {bits:#x}");
        }
    }

    #[test]
    fn test_work_monotonicity() {
        // A lower target means more work
        let easy = calc_work(0x207fffff);
        let hard = calc_work(0x1d00ffff);
        assert!(hard > easy);
        assert!(easy > BlueWorkType::ZERO);
    }

    #[test]
    fn test_target_from_bits() {
        let target = target_from_bits(0x207fffff).unwrap();
        // Maximal target: the top byte is 0x7f
        assert_eq!(target.to_be_bytes()[0], 0x7f);
        assert_eq!(target_from_bits(0), None);
    }
}
